//! Write fetched series into workbook cells.
//!
//! Population is a two-step join: [`plan_writes`] intersects the requested
//! cells with the fields actually present in the payload, then
//! [`SheetWriter::populate`] executes the plan and saves the file in place.
//! A multi-value series spills from its anchor cell along the mapping's
//! [`SpillDirection`]; a single value lands on the anchor only.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use umya_spreadsheet::{Spreadsheet, Worksheet};

use super::address::CellRef;
use crate::domain::{CellMapping, CellValue, FetchResult, SpillDirection};

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("failed to open workbook {}: {reason}", .path.display())]
    Open { path: PathBuf, reason: String },

    #[error("sheet '{sheet}' not found in {}", .path.display())]
    SheetNotFound { sheet: String, path: PathBuf },

    #[error("invalid cell address for '{field}': {reason}")]
    InvalidAddress { field: String, reason: String },

    #[error("series for '{field}' runs off the sheet from {anchor}")]
    OutOfBounds { field: String, anchor: String },

    #[error("failed to save workbook {}: {reason}", .path.display())]
    Save { path: PathBuf, reason: String },
}

/// One field's series and where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedWrite {
    pub field: String,
    pub anchor: CellRef,
    pub values: Vec<CellValue>,
}

/// Result of joining a mapping against a payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WritePlan {
    pub writes: Vec<PlannedWrite>,
    /// Mapped fields the payload does not contain, in mapping order.
    pub skipped: Vec<String>,
}

/// What a populate call did.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulateOutcome {
    pub workbook_path: PathBuf,
    pub cells_written: usize,
    pub skipped: Vec<String>,
}

/// Join `mapping` against `result`. Fields absent from the result are skipped
/// without looking at their address; every other address is validated before
/// anything is written.
pub fn plan_writes(mapping: &CellMapping, result: &FetchResult) -> Result<WritePlan, SheetError> {
    let mut plan = WritePlan::default();

    for (field, address) in &mapping.mapping {
        let Some(values) = result.series(field) else {
            plan.skipped.push(field.clone());
            continue;
        };

        let anchor: CellRef = address.parse().map_err(|e: super::address::AddressError| {
            SheetError::InvalidAddress {
                field: field.clone(),
                reason: e.to_string(),
            }
        })?;

        if let Some(last) = values.len().checked_sub(1) {
            let fits = u32::try_from(last)
                .ok()
                .and_then(|steps| anchor.offset(steps, mapping.spill))
                .is_some();
            if !fits {
                return Err(SheetError::OutOfBounds {
                    field: field.clone(),
                    anchor: anchor.to_string(),
                });
            }
        }

        plan.writes.push(PlannedWrite {
            field: field.clone(),
            anchor,
            values,
        });
    }

    Ok(plan)
}

/// Writes payload values into an existing workbook.
#[derive(Debug, Default, Clone, Copy)]
pub struct SheetWriter;

impl SheetWriter {
    pub fn new() -> Self {
        Self
    }

    /// Populate the mapped cells and save in place. Returns the workbook path.
    pub fn populate(&self, mapping: &CellMapping, result: &FetchResult) -> Result<PathBuf, SheetError> {
        self.apply(mapping, result).map(|o| o.workbook_path)
    }

    /// Like [`populate`](Self::populate), reporting counts and skipped fields.
    pub fn apply(&self, mapping: &CellMapping, result: &FetchResult) -> Result<PopulateOutcome, SheetError> {
        let path = &mapping.workbook_path;
        info!(workbook = %path.display(), sheet = %mapping.sheet_name, "populating workbook");

        let plan = plan_writes(mapping, result)?;
        for field in &plan.skipped {
            warn!(field = %field, "payload does not include mapped field, skipping");
        }

        let mut book = open(path)?;
        let sheet = sheet_mut(&mut book, &mapping.sheet_name, path)?;

        let mut cells_written = 0;
        for write in &plan.writes {
            debug!(field = %write.field, anchor = %write.anchor, len = write.values.len(), "writing series");
            cells_written += write_series(sheet, write.anchor, &write.values, mapping.spill);
        }

        umya_spreadsheet::writer::xlsx::write(&book, path).map_err(|e| SheetError::Save {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        Ok(PopulateOutcome {
            workbook_path: path.clone(),
            cells_written,
            skipped: plan.skipped,
        })
    }
}

fn open(path: &Path) -> Result<Spreadsheet, SheetError> {
    umya_spreadsheet::reader::xlsx::read(path).map_err(|e| SheetError::Open {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn sheet_mut<'a>(book: &'a mut Spreadsheet, name: &str, path: &Path) -> Result<&'a mut Worksheet, SheetError> {
    book.get_sheet_by_name_mut(name)
        .ok_or_else(|| SheetError::SheetNotFound {
            sheet: name.to_string(),
            path: path.to_path_buf(),
        })
}

fn write_series(sheet: &mut Worksheet, anchor: CellRef, values: &[CellValue], spill: SpillDirection) -> usize {
    let mut written = 0;
    for (step, value) in values.iter().enumerate() {
        // Bounds were checked while planning.
        let Some(cell) = u32::try_from(step).ok().and_then(|s| anchor.offset(s, spill)) else {
            break;
        };
        write_cell(sheet, cell, value);
        written += 1;
    }
    written
}

fn write_cell(sheet: &mut Worksheet, cell: CellRef, value: &CellValue) {
    let target = sheet.get_cell_mut(cell.coordinates());
    match value {
        CellValue::Number(n) if n.is_finite() => {
            target.set_value_number(*n);
        }
        CellValue::Number(_) | CellValue::Empty => {
            target.set_blank();
        }
        CellValue::Text(s) => {
            target.set_value_string(s.as_str());
        }
    }
}

/// Create a fresh workbook at `path` holding the given `(sheet, cell, value)`
/// entries. Sheets are created in first-mention order.
pub fn create_workbook(path: &Path, cells: &[(&str, &str, CellValue)]) -> Result<PathBuf, SheetError> {
    let mut book = umya_spreadsheet::new_file_empty_worksheet();

    for (sheet_name, address, value) in cells {
        let cell: CellRef = address.parse().map_err(|e: super::address::AddressError| {
            SheetError::InvalidAddress {
                field: format!("{sheet_name}!{address}"),
                reason: e.to_string(),
            }
        })?;
        if book.get_sheet_by_name(sheet_name).is_none() {
            book.new_sheet(*sheet_name).map_err(|e| SheetError::Save {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
        let sheet = sheet_mut(&mut book, sheet_name, path)?;
        write_cell(sheet, cell, value);
    }

    if cells.is_empty() {
        book.new_sheet("Sheet1").map_err(|e| SheetError::Save {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| SheetError::Save {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    }
    umya_spreadsheet::writer::xlsx::write(&book, path).map_err(|e| SheetError::Save {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(path.to_path_buf())
}

/// Read one cell's displayed value. Blank cells read as an empty string.
pub fn read_cell(path: &Path, sheet: &str, address: &str) -> Result<String, SheetError> {
    let cell: CellRef = address.parse().map_err(|e: super::address::AddressError| {
        SheetError::InvalidAddress {
            field: address.to_string(),
            reason: e.to_string(),
        }
    })?;
    let book = open(path)?;
    let ws = book
        .get_sheet_by_name(sheet)
        .ok_or_else(|| SheetError::SheetNotFound {
            sheet: sheet.to_string(),
            path: path.to_path_buf(),
        })?;
    Ok(ws.get_value(cell.coordinates()))
}
