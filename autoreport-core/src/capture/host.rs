//! Automation-host boundary.
//!
//! An automation host is an out-of-process spreadsheet application driven
//! step by step. [`RangeCapture`](super::RangeCapture) only ever talks to it
//! through these traits.

use std::path::Path;

use super::CaptureError;
use crate::domain::CanvasSize;
use crate::sheet::RangeRef;

/// Operations a spreadsheet automation host must provide.
///
/// Each call blocks until the host answers. Implementations hold at most one
/// open workbook and one transient canvas at a time.
pub trait AutomationHost {
    fn open_workbook(&mut self, path: &Path) -> Result<(), CaptureError>;

    /// Select a sheet by exact name. Fails with [`CaptureError::SheetNotFound`].
    fn select_sheet(&mut self, name: &str) -> Result<(), CaptureError>;

    /// Copy the range to the host clipboard as a picture.
    fn copy_range_as_picture(&mut self, range: &RangeRef) -> Result<(), CaptureError>;

    /// Create the transient canvas and paste the copied picture into it.
    /// `None` sizes the canvas to the copied range.
    fn paste_into_canvas(&mut self, size: Option<CanvasSize>) -> Result<(), CaptureError>;

    /// Export the canvas as an image. `Ok(false)` means the host refused.
    fn export_canvas(&mut self, destination: &Path) -> Result<bool, CaptureError>;

    fn delete_canvas(&mut self) -> Result<(), CaptureError>;

    /// Close the open workbook, discarding changes.
    fn close_workbook(&mut self) -> Result<(), CaptureError>;

    /// Quit the host application and end its process.
    fn quit(&mut self) -> Result<(), CaptureError>;
}

/// Starts automation hosts in invisible mode.
pub trait HostLauncher {
    type Host: AutomationHost;

    fn launch(&self) -> Result<Self::Host, CaptureError>;
}
