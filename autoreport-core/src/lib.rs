//! AutoReport Core: the four leaf components of the reporting pipeline.
//!
//! Each component is a thin adapter over one external capability:
//! - [`data`]: terminal session and time-series fetch
//! - [`sheet`]: write fetched series into workbook cells
//! - [`capture`]: screenshot a workbook range through an automation host
//! - [`mail`]: compose and send the report over authenticated SMTP
//!
//! The external systems sit behind traits (`Terminal`, `AutomationHost`,
//! `MailTransport`) so they can be swapped and mocked. The orchestrator that
//! chains the components lives in `autoreport-runner`.

pub mod capture;
pub mod data;
pub mod domain;
pub mod mail;
pub mod sheet;

pub use capture::{CaptureError, RangeCapture};
pub use data::{DataError, DataSource};
pub use domain::{
    CanvasSize, CaptureRequest, CellMapping, CellValue, FetchRequest, FetchResult, OutboundMessage,
    SpillDirection,
};
pub use mail::{MailError, Mailer};
pub use sheet::{SheetError, SheetWriter};
