//! Configuration records for one report run.
//!
//! Every record is built by the caller before a run and handed to exactly one
//! component call. Nothing here is persisted.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Pseudo-field under which a [`FetchResult`]'s timestamps are exposed.
pub const TIMES_KEY: &str = "times";

/// Default sampling frequency code (daily).
pub const DEFAULT_FREQUENCY: &str = "D";

/// One time-series request against the terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Instrument identifier, e.g. `000001.SZ`.
    pub instrument: String,
    /// Requested fields, in order. Must be non-empty and unique.
    pub fields: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Sampling frequency code (`D`, `W`, `M`, ...).
    #[serde(default = "default_frequency")]
    pub frequency: String,
    /// Extra terminal options appended after the period, e.g. `PriceAdj=B`.
    #[serde(default)]
    pub options: Option<String>,
}

fn default_frequency() -> String {
    DEFAULT_FREQUENCY.to_string()
}

impl FetchRequest {
    pub fn new(
        instrument: impl Into<String>,
        fields: &[&str],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            start,
            end,
            frequency: default_frequency(),
            options: None,
        }
    }

    pub fn with_frequency(mut self, frequency: impl Into<String>) -> Self {
        self.frequency = frequency.into();
        self
    }

    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }

    /// Comma-joined field list as the terminal expects it.
    pub fn joined_fields(&self) -> String {
        self.fields.join(",")
    }

    /// Single options string: `Period=<freq>` followed by the extra options.
    pub fn options_string(&self) -> String {
        match self.options.as_deref().map(str::trim) {
            Some(extra) if !extra.is_empty() => format!("Period={};{extra}", self.frequency),
            _ => format!("Period={}", self.frequency),
        }
    }

    /// Check the request invariants. Returns a description of the first violation.
    pub fn check(&self) -> Result<(), String> {
        if self.instrument.trim().is_empty() {
            return Err("instrument identifier is empty".into());
        }
        if self.fields.is_empty() {
            return Err("field list is empty".into());
        }
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if field.trim().is_empty() {
                return Err("field list contains an empty name".into());
            }
            if !seen.insert(field.to_ascii_lowercase()) {
                return Err(format!("field '{field}' is requested twice"));
            }
        }
        if self.start > self.end {
            return Err(format!(
                "start date {} is after end date {}",
                self.start, self.end
            ));
        }
        Ok(())
    }
}

/// A single value destined for a spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Empty,
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Empty => Ok(()),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Text(value.format("%Y-%m-%d").to_string())
    }
}

/// Payload returned by one terminal fetch.
///
/// Fields the terminal did not return are absent keys. All present series have
/// the same length as `times` when timestamps are available.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    pub fields: BTreeMap<String, Vec<CellValue>>,
    pub times: Option<Vec<NaiveDate>>,
}

impl FetchResult {
    /// All lookup keys, including [`TIMES_KEY`] when timestamps are present.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        if self.times.is_some() && !self.fields.contains_key(TIMES_KEY) {
            keys.push(TIMES_KEY);
        }
        keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key) || (key == TIMES_KEY && self.times.is_some())
    }

    /// The value sequence for `key`; timestamps are rendered as ISO dates.
    pub fn series(&self, key: &str) -> Option<Vec<CellValue>> {
        if let Some(values) = self.fields.get(key) {
            return Some(values.clone());
        }
        if key == TIMES_KEY {
            return self
                .times
                .as_ref()
                .map(|t| t.iter().copied().map(CellValue::from).collect());
        }
        None
    }

    /// Number of observations (timestamps if present, else the longest series).
    pub fn len(&self) -> usize {
        match &self.times {
            Some(times) => times.len(),
            None => self.fields.values().map(Vec::len).max().unwrap_or(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Direction a multi-value series spills away from its anchor cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpillDirection {
    /// Across the anchor's row: B2, C2, D2, ...
    #[default]
    Row,
    /// Down the anchor's column: B2, B3, B4, ...
    Column,
}

/// Where each fetched field lands in the workbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellMapping {
    pub workbook_path: PathBuf,
    pub sheet_name: String,
    /// Field name → anchor cell address (A1 notation).
    pub mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub spill: SpillDirection,
}

impl CellMapping {
    pub fn new(
        workbook_path: impl Into<PathBuf>,
        sheet_name: impl Into<String>,
        pairs: &[(&str, &str)],
    ) -> Self {
        Self {
            workbook_path: workbook_path.into(),
            sheet_name: sheet_name.into(),
            mapping: pairs
                .iter()
                .map(|(field, cell)| (field.to_string(), cell.to_string()))
                .collect(),
            spill: SpillDirection::default(),
        }
    }

    pub fn with_spill(mut self, spill: SpillDirection) -> Self {
        self.spill = spill;
        self
    }
}

/// Fixed canvas dimensions in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

/// Screenshot of one workbook range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub workbook_path: PathBuf,
    pub sheet_name: String,
    /// Rectangular range, e.g. `A1:F20`.
    pub range: String,
    pub output_path: PathBuf,
    /// Canvas size; `None` sizes the canvas to the copied range.
    #[serde(default)]
    pub canvas: Option<CanvasSize>,
}

impl CaptureRequest {
    pub fn new(
        workbook_path: impl Into<PathBuf>,
        sheet_name: impl Into<String>,
        range: impl Into<String>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            workbook_path: workbook_path.into(),
            sheet_name: sheet_name.into(),
            range: range.into(),
            output_path: output_path.into(),
            canvas: None,
        }
    }
}

/// An email with attachments, plus the SMTP account used to send it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Login name; also used as the From address.
    pub username: String,
    pub password: String,
    pub recipients: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<PathBuf>,
}

impl fmt::Debug for OutboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundMessage")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("recipients", &self.recipients)
            .field("cc", &self.cc)
            .field("bcc", &self.bcc)
            .field("subject", &self.subject)
            .field("attachments", &self.attachments)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn options_string_combines_period_and_extras() {
        let req = FetchRequest::new("000001.SZ", &["close"], date(2024, 1, 1), date(2024, 1, 10));
        assert_eq!(req.options_string(), "Period=D");

        let req = req.with_frequency("W").with_options("PriceAdj=B");
        assert_eq!(req.options_string(), "Period=W;PriceAdj=B");
    }

    #[test]
    fn check_rejects_bad_requests() {
        let ok = FetchRequest::new("000001.SZ", &["open", "close"], date(2024, 1, 1), date(2024, 1, 10));
        assert!(ok.check().is_ok());

        let empty = FetchRequest::new("000001.SZ", &[], date(2024, 1, 1), date(2024, 1, 10));
        assert!(empty.check().is_err());

        let dup = FetchRequest::new("000001.SZ", &["close", "CLOSE"], date(2024, 1, 1), date(2024, 1, 10));
        assert!(dup.check().unwrap_err().contains("twice"));

        let reversed = FetchRequest::new("000001.SZ", &["close"], date(2024, 2, 1), date(2024, 1, 1));
        assert!(reversed.check().unwrap_err().contains("after"));
    }

    #[test]
    fn times_key_exposes_timestamps() {
        let mut result = FetchResult::default();
        result
            .fields
            .insert("close".into(), vec![CellValue::Number(10.0), CellValue::Number(10.5)]);
        result.times = Some(vec![date(2024, 1, 2), date(2024, 1, 3)]);

        assert_eq!(result.keys(), vec!["close", "times"]);
        assert!(result.contains("times"));
        assert_eq!(
            result.series("times").unwrap(),
            vec![CellValue::from("2024-01-02"), CellValue::from("2024-01-03")]
        );
        assert_eq!(result.len(), 2);
        assert!(result.series("open").is_none());
    }

    #[test]
    fn debug_redacts_password() {
        let msg = OutboundMessage {
            smtp_host: "smtp.example.com".into(),
            smtp_port: 587,
            username: "bot@example.com".into(),
            password: "hunter2".into(),
            recipients: vec!["a@example.com".into()],
            cc: vec![],
            bcc: vec![],
            subject: "s".into(),
            body: "b".into(),
            attachments: vec![],
        };
        let rendered = format!("{msg:?}");
        assert!(!rendered.contains("hunter2"));
    }
}
