//! Workflow failure taxonomy.

use std::fmt;
use std::path::PathBuf;

use autoreport_core::{CaptureError, DataError, MailError, SheetError};
use thiserror::Error;

use crate::workflow::Stage;

/// Error from one of the four components.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Sheet(#[from] SheetError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Mail(#[from] MailError),
}

/// Coarse failure class callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Connection,
    DataRequest,
    SheetNotFound,
    AttachmentRead,
    Authentication,
    DeliverySend,
    CaptureExport,
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Connection => "connection",
            FailureKind::DataRequest => "data_request",
            FailureKind::SheetNotFound => "sheet_not_found",
            FailureKind::AttachmentRead => "attachment_read",
            FailureKind::Authentication => "authentication",
            FailureKind::DeliverySend => "delivery_send",
            FailureKind::CaptureExport => "capture_export",
            FailureKind::Other => "other",
        };
        f.write_str(name)
    }
}

impl StageError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StageError::Data(DataError::Connection(_)) => FailureKind::Connection,
            StageError::Data(DataError::DataRequest { .. }) => FailureKind::DataRequest,
            StageError::Sheet(SheetError::SheetNotFound { .. })
            | StageError::Capture(CaptureError::SheetNotFound { .. }) => FailureKind::SheetNotFound,
            StageError::Capture(CaptureError::CaptureExport { .. }) => FailureKind::CaptureExport,
            StageError::Mail(MailError::AttachmentRead { .. }) => FailureKind::AttachmentRead,
            StageError::Mail(MailError::Authentication(_)) => FailureKind::Authentication,
            StageError::Mail(
                MailError::DeliverySend(_) | MailError::Connection(_) | MailError::Tls(_),
            ) => FailureKind::DeliverySend,
            _ => FailureKind::Other,
        }
    }
}

/// A run aborted at `stage`. Files produced by earlier stages are not rolled
/// back and are listed in `left_on_disk`.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct WorkflowError {
    pub stage: Stage,
    #[source]
    pub source: StageError,
    pub left_on_disk: Vec<PathBuf>,
}

impl WorkflowError {
    pub fn kind(&self) -> FailureKind {
        self.source.kind()
    }
}
