//! A1-notation cell and range addresses.

use std::fmt;
use std::str::FromStr;

use crate::domain::SpillDirection;

/// Largest column index a worksheet accepts (`XFD`).
pub const MAX_COLUMN: u32 = 16_384;
/// Largest row index a worksheet accepts.
pub const MAX_ROW: u32 = 1_048_576;

/// A single cell, 1-based column and row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellRef {
    pub col: u32,
    pub row: u32,
}

/// Why an address failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressError(pub String);

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for AddressError {}

impl CellRef {
    pub fn new(col: u32, row: u32) -> Self {
        Self { col, row }
    }

    /// The cell `steps` positions away from this one along `direction`.
    pub fn offset(&self, steps: u32, direction: SpillDirection) -> Option<CellRef> {
        let next = match direction {
            SpillDirection::Row => CellRef::new(self.col.checked_add(steps)?, self.row),
            SpillDirection::Column => CellRef::new(self.col, self.row.checked_add(steps)?),
        };
        (next.col <= MAX_COLUMN && next.row <= MAX_ROW).then_some(next)
    }

    /// `(col, row)` as spreadsheet engines take coordinates.
    pub fn coordinates(&self) -> (u32, u32) {
        (self.col, self.row)
    }
}

/// Column index → letters: 1 → A, 27 → AA.
pub fn column_letters(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        letters.push(b'A' + rem as u8);
        col = (col - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Letters → column index: A → 1, AA → 27. Case-insensitive.
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut col: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    (col <= MAX_COLUMN).then_some(col)
}

impl FromStr for CellRef {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || AddressError(format!("invalid cell address '{s}'"));
        let trimmed = s.trim();
        let split = trimmed
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit())
            .map(|(i, _)| i)
            .ok_or_else(bad)?;
        let (col_part, row_part) = trimmed.split_at(split);

        let col_part = col_part.strip_prefix('$').unwrap_or(col_part);
        let col_part = col_part.strip_suffix('$').unwrap_or(col_part);
        let col = column_index(col_part).ok_or_else(bad)?;

        if !row_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(bad());
        }
        let row: u32 = row_part.parse().map_err(|_| bad())?;
        if row == 0 || row > MAX_ROW {
            return Err(bad());
        }
        Ok(CellRef { col, row })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letters(self.col), self.row)
    }
}

/// Rectangular block between two corners, normalized top-left to bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRef {
    pub start: CellRef,
    pub end: CellRef,
}

impl RangeRef {
    pub fn width(&self) -> u32 {
        self.end.col - self.start.col + 1
    }

    pub fn height(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    pub fn contains(&self, cell: CellRef) -> bool {
        (self.start.col..=self.end.col).contains(&cell.col)
            && (self.start.row..=self.end.row).contains(&cell.row)
    }
}

impl FromStr for RangeRef {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = match s.split_once(':') {
            Some((a, b)) => (a.parse::<CellRef>()?, b.parse::<CellRef>()?),
            None => {
                let cell = s.parse::<CellRef>()?;
                (cell, cell)
            }
        };
        Ok(RangeRef {
            start: CellRef::new(a.col.min(b.col), a.row.min(b.row)),
            end: CellRef::new(a.col.max(b.col), a.row.max(b.row)),
        })
    }
}

impl fmt::Display for RangeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_plain_and_absolute_cells() {
        assert_eq!("B2".parse::<CellRef>().unwrap(), CellRef::new(2, 2));
        assert_eq!("$AA$10".parse::<CellRef>().unwrap(), CellRef::new(27, 10));
        assert_eq!("xfd1".parse::<CellRef>().unwrap(), CellRef::new(MAX_COLUMN, 1));
    }

    #[test]
    fn rejects_malformed_cells() {
        for bad in ["", "B", "2", "B0", "B2C", "XFE1", "B-1", "1B"] {
            assert!(bad.parse::<CellRef>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn range_is_normalized() {
        let range: RangeRef = "F20:A1".parse().unwrap();
        assert_eq!(range.to_string(), "A1:F20");
        assert_eq!(range.width(), 6);
        assert_eq!(range.height(), 20);
        assert!(range.contains(CellRef::new(3, 7)));
        assert!(!range.contains(CellRef::new(7, 1)));
    }

    #[test]
    fn offset_follows_direction() {
        let anchor = CellRef::new(2, 2);
        assert_eq!(anchor.offset(2, SpillDirection::Row).unwrap().to_string(), "D2");
        assert_eq!(anchor.offset(2, SpillDirection::Column).unwrap().to_string(), "B4");
        assert!(CellRef::new(MAX_COLUMN, 1).offset(1, SpillDirection::Row).is_none());
    }

    proptest! {
        #[test]
        fn column_letters_invert_column_index(col in 1u32..=MAX_COLUMN) {
            prop_assert_eq!(column_index(&column_letters(col)), Some(col));
        }

        #[test]
        fn displayed_cells_parse_back(col in 1u32..=MAX_COLUMN, row in 1u32..=MAX_ROW) {
            let cell = CellRef::new(col, row);
            prop_assert_eq!(cell.to_string().parse::<CellRef>().unwrap(), cell);
        }
    }
}
