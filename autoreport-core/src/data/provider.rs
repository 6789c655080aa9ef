//! Terminal boundary trait and structured error types.
//!
//! The Terminal trait abstracts over the market-data terminal client so the
//! session logic can be exercised against a mock.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::CellValue;

/// Structured error types for terminal operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("terminal unavailable: {0}")]
    Connection(String),

    #[error("terminal request failed with error code {code}")]
    DataRequest { code: i64 },

    #[error("invalid fetch request: {0}")]
    InvalidRequest(String),

    #[error("malformed terminal response: {0}")]
    MalformedResponse(String),
}

/// Request exactly as it crosses the terminal boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalRequest {
    pub codes: String,
    /// Comma-joined field list.
    pub fields: String,
    pub begin: NaiveDate,
    pub end: NaiveDate,
    /// `Period=<freq>;<extra options>`.
    pub options: String,
}

/// Raw terminal response: one data column per requested field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerminalResponse {
    pub error_code: i64,
    /// Field names as echoed by the terminal, if it echoes them.
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub data: Vec<Vec<CellValue>>,
    #[serde(default)]
    pub times: Vec<NaiveDate>,
}

/// Trait for market-data terminal clients.
///
/// `start`/`stop` bracket a session; callers go through
/// [`DataSource`](super::DataSource) which guarantees `stop` runs.
pub trait Terminal: Send + Sync {
    /// Human-readable name of this terminal.
    fn name(&self) -> &str;

    /// Log in / establish the session.
    fn start(&self) -> Result<(), DataError>;

    /// One synchronous time-series request.
    fn wsd(&self, request: &TerminalRequest) -> Result<TerminalResponse, DataError>;

    /// Tear down the session.
    fn stop(&self) -> Result<(), DataError>;
}
