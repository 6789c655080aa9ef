//! Range screenshots through a spreadsheet automation host.
//!
//! A capture launches the host, opens the workbook, copies the range as a
//! picture, pastes it into a transient canvas and exports that canvas. Every
//! resource acquired along the way is tracked by a [`CaptureScope`], which
//! releases them in a fixed order (canvas, workbook, host) on every exit path.

pub mod excel;
pub mod host;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::domain::CaptureRequest;
use crate::sheet::RangeRef;

pub use excel::{ExcelHost, ExcelLauncher};
pub use host::{AutomationHost, HostLauncher};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to launch automation host: {0}")]
    HostLaunch(String),

    #[error("sheet '{sheet}' not found in {}", .path.display())]
    SheetNotFound { sheet: String, path: PathBuf },

    #[error("invalid range '{range}': {reason}")]
    InvalidRange { range: String, reason: String },

    #[error("image export failed: {}", .path.display())]
    CaptureExport { path: PathBuf },

    #[error("automation host error: {0}")]
    Host(String),

    #[error("I/O error for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Owns a running host and the resources opened inside it.
///
/// [`release`](Self::release) deletes the canvas, closes the workbook without
/// saving, then quits the host. Dropping an unreleased scope does the same.
pub struct CaptureScope<H: AutomationHost> {
    host: H,
    workbook_open: bool,
    canvas_live: bool,
    running: bool,
}

impl<H: AutomationHost> CaptureScope<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            workbook_open: false,
            canvas_live: false,
            running: true,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn open_workbook(&mut self, path: &Path) -> Result<(), CaptureError> {
        self.host.open_workbook(path)?;
        self.workbook_open = true;
        Ok(())
    }

    pub fn select_sheet(&mut self, name: &str) -> Result<(), CaptureError> {
        self.host.select_sheet(name)
    }

    pub fn copy_range(&mut self, range: &RangeRef) -> Result<(), CaptureError> {
        self.host.copy_range_as_picture(range)
    }

    pub fn paste_into_canvas(&mut self, size: Option<crate::domain::CanvasSize>) -> Result<(), CaptureError> {
        // The host may have created the canvas before failing the paste.
        self.canvas_live = true;
        self.host.paste_into_canvas(size)
    }

    pub fn export(&mut self, destination: &Path) -> Result<bool, CaptureError> {
        self.host.export_canvas(destination)
    }

    /// Release everything in order. Each step runs even if an earlier one
    /// failed; the first error is returned.
    pub fn release(&mut self) -> Result<(), CaptureError> {
        let mut first_err = None;

        if std::mem::take(&mut self.canvas_live) {
            if let Err(e) = self.host.delete_canvas() {
                first_err.get_or_insert(e);
            }
        }
        if std::mem::take(&mut self.workbook_open) {
            if let Err(e) = self.host.close_workbook() {
                first_err.get_or_insert(e);
            }
        }
        if std::mem::take(&mut self.running) {
            if let Err(e) = self.host.quit() {
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<H: AutomationHost> Drop for CaptureScope<H> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(error = %err, "automation host cleanup failed");
        }
    }
}

/// Screenshots workbook ranges through hosts started by `L`.
pub struct RangeCapture<L: HostLauncher> {
    launcher: L,
}

impl<L: HostLauncher> RangeCapture<L> {
    pub fn new(launcher: L) -> Self {
        Self { launcher }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Capture `request.range` to `request.output_path`. Returns the image path.
    pub fn capture(&self, request: &CaptureRequest) -> Result<PathBuf, CaptureError> {
        let range: RangeRef = request.range.parse().map_err(|e: crate::sheet::AddressError| {
            CaptureError::InvalidRange {
                range: request.range.clone(),
                reason: e.to_string(),
            }
        })?;
        let workbook_path = absolutize(&request.workbook_path)?;
        let output_path = absolutize(&request.output_path)?;
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| CaptureError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        remove_stale(&output_path)?;

        info!(
            sheet = %request.sheet_name,
            range = %range,
            workbook = %workbook_path.display(),
            "capturing workbook range"
        );

        let mut scope = CaptureScope::new(self.launcher.launch()?);
        let exported = run_capture(&mut scope, request, &range, &workbook_path, &output_path);
        let released = scope.release();
        exported?;
        released?;

        let written = std::fs::metadata(&output_path).map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            return Err(CaptureError::CaptureExport { path: output_path });
        }
        info!(image = %output_path.display(), bytes = written, "range captured");
        Ok(output_path)
    }
}

fn run_capture<H: AutomationHost>(
    scope: &mut CaptureScope<H>,
    request: &CaptureRequest,
    range: &RangeRef,
    workbook_path: &Path,
    output_path: &Path,
) -> Result<(), CaptureError> {
    scope.open_workbook(workbook_path)?;
    scope.select_sheet(&request.sheet_name)?;
    scope.copy_range(range)?;
    scope.paste_into_canvas(request.canvas)?;
    if !scope.export(output_path)? {
        return Err(CaptureError::CaptureExport {
            path: output_path.to_path_buf(),
        });
    }
    Ok(())
}

/// Delete an image left by an earlier run so only this export can pass the
/// non-empty check.
fn remove_stale(path: &Path) -> Result<(), CaptureError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CaptureError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn absolutize(path: &Path) -> Result<PathBuf, CaptureError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|source| CaptureError::Io {
            path: path.to_path_buf(),
            source,
        })
}
