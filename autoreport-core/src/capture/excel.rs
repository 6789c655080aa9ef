//! Excel driven over COM from a child PowerShell process.
//!
//! The child runs `powershell -Command -`, reading one statement per line from
//! stdin. Every statement is wrapped so that it prints exactly one status line:
//! `__AR_OK__`, `__AR_TRUE__`/`__AR_FALSE__` for boolean probes, or
//! `__AR_ERR__ <message>`. Anything else the child prints is ignored.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::host::{AutomationHost, HostLauncher};
use super::CaptureError;
use crate::domain::CanvasSize;
use crate::sheet::RangeRef;

const OK: &str = "__AR_OK__";
const TRUE: &str = "__AR_TRUE__";
const FALSE: &str = "__AR_FALSE__";
const ERR: &str = "__AR_ERR__";

/// How long `quit` waits for the child to exit before killing it.
const EXIT_GRACE: Duration = Duration::from_secs(10);

/// Launches [`ExcelHost`]s.
#[derive(Debug, Clone)]
pub struct ExcelLauncher {
    /// PowerShell executable, `powershell` by default.
    pub program: PathBuf,
}

impl Default for ExcelLauncher {
    fn default() -> Self {
        Self {
            program: PathBuf::from("powershell"),
        }
    }
}

impl ExcelLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl HostLauncher for ExcelLauncher {
    type Host = ExcelHost;

    fn launch(&self) -> Result<ExcelHost, CaptureError> {
        info!(program = %self.program.display(), "launching Excel automation host");
        let mut child = Command::new(&self.program)
            .args(["-NoLogo", "-NoProfile", "-NonInteractive", "-Command", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CaptureError::HostLaunch(format!("{}: {e}", self.program.display())))?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CaptureError::HostLaunch("child pipes unavailable".into()));
        };

        let mut host = ExcelHost {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            workbook: None,
        };
        // On failure `host` is dropped, which kills the child.
        host.exec(
            "$excel = New-Object -ComObject Excel.Application; \
             $excel.Visible = $false; $excel.DisplayAlerts = $false",
        )
        .map_err(|e| CaptureError::HostLaunch(e.to_string()))?;
        Ok(host)
    }
}

/// One Excel instance behind a PowerShell child process.
pub struct ExcelHost {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    workbook: Option<PathBuf>,
}

enum Reply {
    Ok,
    Bool(bool),
}

impl ExcelHost {
    /// Whether the child process is still running.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn send(&mut self, line: &str) -> Result<Reply, CaptureError> {
        debug!(statement = line, "automation host call");
        writeln!(self.stdin, "{line}")
            .and_then(|_| self.stdin.flush())
            .map_err(|e| CaptureError::Host(format!("host stdin closed: {e}")))?;

        let mut buf = String::new();
        loop {
            buf.clear();
            let n = self
                .stdout
                .read_line(&mut buf)
                .map_err(|e| CaptureError::Host(format!("host stdout: {e}")))?;
            if n == 0 {
                return Err(CaptureError::Host("automation host exited unexpectedly".into()));
            }
            let reply = buf.trim();
            if reply == OK {
                return Ok(Reply::Ok);
            }
            if reply == TRUE {
                return Ok(Reply::Bool(true));
            }
            if reply == FALSE {
                return Ok(Reply::Bool(false));
            }
            if let Some(msg) = reply.strip_prefix(ERR) {
                return Err(CaptureError::Host(msg.trim().to_string()));
            }
        }
    }

    fn exec(&mut self, statement: &str) -> Result<(), CaptureError> {
        self.send(&format!(
            "try {{ {statement}; '{OK}' }} catch {{ '{ERR} ' + ($_.Exception.Message -replace '\\r?\\n', ' ') }}"
        ))
        .map(|_| ())
    }

    fn probe(&mut self, condition: &str) -> Result<bool, CaptureError> {
        let reply = self.send(&format!(
            "try {{ if ({condition}) {{ '{TRUE}' }} else {{ '{FALSE}' }} }} catch {{ '{ERR} ' + ($_.Exception.Message -replace '\\r?\\n', ' ') }}"
        ))?;
        match reply {
            Reply::Bool(b) => Ok(b),
            Reply::Ok => Err(CaptureError::Host("expected a boolean reply".into())),
        }
    }

    fn kill(&mut self) {
        if self.is_running() {
            warn!("killing automation host process");
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

/// Quote `s` as a PowerShell single-quoted literal.
fn ps_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// An exception raised by `Chart.Export` is an export failure, not a generic
/// host error.
fn export_failure(destination: &Path, err: CaptureError) -> CaptureError {
    match err {
        CaptureError::Host(reason) => {
            warn!(%reason, "chart export raised");
            CaptureError::CaptureExport {
                path: destination.to_path_buf(),
            }
        }
        other => other,
    }
}

impl AutomationHost for ExcelHost {
    fn open_workbook(&mut self, path: &Path) -> Result<(), CaptureError> {
        self.exec(&format!(
            "$wb = $excel.Workbooks.Open({})",
            ps_quote(&path.to_string_lossy())
        ))?;
        self.workbook = Some(path.to_path_buf());
        Ok(())
    }

    fn select_sheet(&mut self, name: &str) -> Result<(), CaptureError> {
        let exists = self.probe(&format!(
            "$null -ne ($wb.Worksheets | Where-Object {{ $_.Name -ceq {} }})",
            ps_quote(name)
        ))?;
        if !exists {
            return Err(CaptureError::SheetNotFound {
                sheet: name.to_string(),
                path: self.workbook.clone().unwrap_or_default(),
            });
        }
        self.exec(&format!("$ws = $wb.Worksheets.Item({})", ps_quote(name)))
    }

    fn copy_range_as_picture(&mut self, range: &RangeRef) -> Result<(), CaptureError> {
        self.exec(&format!(
            "$rng = $ws.Range({}); [void]$rng.CopyPicture()",
            ps_quote(&range.to_string())
        ))
    }

    fn paste_into_canvas(&mut self, size: Option<CanvasSize>) -> Result<(), CaptureError> {
        let add = match size {
            Some(CanvasSize { width, height }) => format!("$ws.ChartObjects().Add(0, 0, {width}, {height})"),
            None => "$ws.ChartObjects().Add(0, 0, $rng.Width, $rng.Height)".to_string(),
        };
        self.exec(&format!("$canvas = {add}; [void]$canvas.Chart.Paste()"))
    }

    fn export_canvas(&mut self, destination: &Path) -> Result<bool, CaptureError> {
        let quoted = ps_quote(&destination.to_string_lossy());
        self.probe(&format!("$canvas.Chart.Export({quoted})"))
            .map_err(|err| export_failure(destination, err))
    }

    fn delete_canvas(&mut self) -> Result<(), CaptureError> {
        self.exec("if ($canvas) { [void]$canvas.Delete() }; $canvas = $null")
    }

    fn close_workbook(&mut self) -> Result<(), CaptureError> {
        self.workbook = None;
        self.exec("if ($wb) { [void]$wb.Close($false) }; $wb = $null; $ws = $null; $rng = $null")
    }

    fn quit(&mut self) -> Result<(), CaptureError> {
        let quit = self.exec(
            "$excel.Quit(); \
             [void][System.Runtime.InteropServices.Marshal]::ReleaseComObject($excel); \
             $excel = $null",
        );
        let _ = writeln!(self.stdin, "exit").and_then(|_| self.stdin.flush());

        let deadline = Instant::now() + EXIT_GRACE;
        while self.is_running() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(100));
        }
        self.kill();
        info!("automation host stopped");
        quit
    }
}

impl Drop for ExcelHost {
    fn drop(&mut self) {
        self.kill();
    }
}
