//! End-to-end workflow runs against a real workbook with scripted
//! terminal, automation host and SMTP server.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use autoreport_core::capture::{AutomationHost, CaptureError, HostLauncher};
use autoreport_core::data::{DataError, Terminal, TerminalRequest, TerminalResponse};
use autoreport_core::domain::{CanvasSize, CaptureRequest, CellMapping, CellValue, FetchRequest, OutboundMessage};
use autoreport_core::mail::{MailError, MailSession, MailTransport};
use autoreport_core::sheet::{create_workbook, read_cell, RangeRef};
use autoreport_runner::{FailureKind, Stage, Workflow, WorkflowRun};
use chrono::NaiveDate;
use lettre::address::Envelope;

type Log = Arc<Mutex<Vec<String>>>;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ── Terminal ──────────────────────────────────────────────────────────

struct StubTerminal {
    log: Log,
    error_code: i64,
}

impl Terminal for StubTerminal {
    fn name(&self) -> &str {
        "stub"
    }

    fn start(&self) -> Result<(), DataError> {
        self.log.lock().unwrap().push("terminal start".into());
        Ok(())
    }

    fn wsd(&self, request: &TerminalRequest) -> Result<TerminalResponse, DataError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("terminal wsd {} {}", request.codes, request.fields));
        if self.error_code != 0 {
            return Ok(TerminalResponse {
                error_code: self.error_code,
                ..TerminalResponse::default()
            });
        }
        // Trading days between 2024-01-01 and 2024-01-10.
        let times = vec![
            date(2024, 1, 2),
            date(2024, 1, 3),
            date(2024, 1, 4),
            date(2024, 1, 5),
            date(2024, 1, 8),
            date(2024, 1, 9),
            date(2024, 1, 10),
        ];
        let open = [9.39, 9.19, 9.19, 9.11, 9.10, 9.02, 9.00];
        let close = [9.21, 9.20, 9.11, 9.10, 9.02, 9.04, 8.99];
        Ok(TerminalResponse {
            error_code: 0,
            fields: vec!["OPEN".into(), "CLOSE".into()],
            data: vec![
                open.iter().copied().map(CellValue::Number).collect(),
                close.iter().copied().map(CellValue::Number).collect(),
            ],
            times,
        })
    }

    fn stop(&self) -> Result<(), DataError> {
        self.log.lock().unwrap().push("terminal stop".into());
        Ok(())
    }
}

// ── Automation host ───────────────────────────────────────────────────

struct StubHost {
    log: Log,
    sheets: Vec<&'static str>,
}

impl AutomationHost for StubHost {
    fn open_workbook(&mut self, path: &Path) -> Result<(), CaptureError> {
        if !path.exists() {
            return Err(CaptureError::Host(format!("cannot open {}", path.display())));
        }
        self.log.lock().unwrap().push("host open".into());
        Ok(())
    }

    fn select_sheet(&mut self, name: &str) -> Result<(), CaptureError> {
        if !self.sheets.contains(&name) {
            return Err(CaptureError::SheetNotFound {
                sheet: name.to_string(),
                path: PathBuf::from("workbook"),
            });
        }
        self.log.lock().unwrap().push(format!("host select {name}"));
        Ok(())
    }

    fn copy_range_as_picture(&mut self, range: &RangeRef) -> Result<(), CaptureError> {
        self.log.lock().unwrap().push(format!("host copy {range}"));
        Ok(())
    }

    fn paste_into_canvas(&mut self, _size: Option<CanvasSize>) -> Result<(), CaptureError> {
        self.log.lock().unwrap().push("host paste".into());
        Ok(())
    }

    fn export_canvas(&mut self, destination: &Path) -> Result<bool, CaptureError> {
        std::fs::write(destination, b"\x89PNG\r\n\x1a\nstub").map_err(|source| CaptureError::Io {
            path: destination.to_path_buf(),
            source,
        })?;
        self.log.lock().unwrap().push("host export".into());
        Ok(true)
    }

    fn delete_canvas(&mut self) -> Result<(), CaptureError> {
        self.log.lock().unwrap().push("host delete canvas".into());
        Ok(())
    }

    fn close_workbook(&mut self) -> Result<(), CaptureError> {
        self.log.lock().unwrap().push("host close".into());
        Ok(())
    }

    fn quit(&mut self) -> Result<(), CaptureError> {
        self.log.lock().unwrap().push("host quit".into());
        Ok(())
    }
}

struct StubLauncher {
    log: Log,
}

impl HostLauncher for StubLauncher {
    type Host = StubHost;

    fn launch(&self) -> Result<StubHost, CaptureError> {
        self.log.lock().unwrap().push("host launch".into());
        Ok(StubHost {
            log: Arc::clone(&self.log),
            sheets: vec!["Sheet1", "Sheet2"],
        })
    }
}

// ── SMTP ──────────────────────────────────────────────────────────────

struct StubSmtp {
    log: Log,
    sent: Arc<Mutex<Vec<String>>>,
    password: &'static str,
}

struct StubSession {
    log: Log,
    sent: Arc<Mutex<Vec<String>>>,
    password: &'static str,
}

impl MailTransport for StubSmtp {
    type Session = StubSession;

    fn connect(&self, host: &str, port: u16) -> Result<StubSession, MailError> {
        self.log.lock().unwrap().push(format!("smtp connect {host}:{port}"));
        Ok(StubSession {
            log: Arc::clone(&self.log),
            sent: Arc::clone(&self.sent),
            password: self.password,
        })
    }
}

impl MailSession for StubSession {
    fn starttls(&mut self) -> Result<(), MailError> {
        self.log.lock().unwrap().push("smtp starttls".into());
        Ok(())
    }

    fn login(&mut self, _username: &str, password: &str) -> Result<(), MailError> {
        self.log.lock().unwrap().push("smtp login".into());
        if password != self.password {
            return Err(MailError::Authentication("535 authentication failed".into()));
        }
        Ok(())
    }

    fn send(&mut self, _envelope: &Envelope, raw: &[u8]) -> Result<(), MailError> {
        self.log.lock().unwrap().push("smtp send".into());
        self.sent.lock().unwrap().push(String::from_utf8_lossy(raw).into_owned());
        Ok(())
    }

    fn quit(&mut self) -> Result<(), MailError> {
        self.log.lock().unwrap().push("smtp quit".into());
        Ok(())
    }
}

// ── Fixture ───────────────────────────────────────────────────────────

struct Fixture {
    _dir: tempfile::TempDir,
    log: Log,
    sent: Arc<Mutex<Vec<String>>>,
    workbook: PathBuf,
    screenshot: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let workbook = create_workbook(
            &dir.path().join("report.xlsx"),
            &[
                ("Sheet1", "A1", CellValue::from("000001.SZ")),
                ("Sheet1", "A2", CellValue::from("close")),
                ("Sheet1", "A3", CellValue::from("open")),
            ],
        )
        .unwrap();
        let screenshot = dir.path().join("shots").join("report.png");
        Self {
            _dir: dir,
            log: Log::default(),
            sent: Arc::default(),
            workbook,
            screenshot,
        }
    }

    fn workflow(&self, error_code: i64, smtp_password: &'static str) -> Workflow<StubTerminal, StubLauncher, StubSmtp> {
        Workflow::new(
            StubTerminal {
                log: Arc::clone(&self.log),
                error_code,
            },
            StubLauncher {
                log: Arc::clone(&self.log),
            },
            StubSmtp {
                log: Arc::clone(&self.log),
                sent: Arc::clone(&self.sent),
                password: smtp_password,
            },
        )
    }

    fn run(&self, capture_sheet: &str) -> WorkflowRun {
        WorkflowRun {
            fetch: FetchRequest::new("000001.SZ", &["open", "close"], date(2024, 1, 1), date(2024, 1, 10)),
            cells: CellMapping::new(&self.workbook, "Sheet1", &[("close", "B2"), ("open", "B3")]),
            capture: CaptureRequest::new(&self.workbook, capture_sheet, "A1:F20", &self.screenshot),
            message: OutboundMessage {
                smtp_host: "smtp.example.com".into(),
                smtp_port: 587,
                username: "bot@example.com".into(),
                password: "app-password".into(),
                recipients: vec!["desk@example.com".into()],
                cc: vec![],
                bcc: vec![],
                subject: "Daily Report".into(),
                body: "Attached: workbook and screenshot.".into(),
                attachments: vec![],
            },
        }
    }

    fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn calls_starting(&self, prefix: &str) -> Vec<String> {
        self.calls().into_iter().filter(|c| c.starts_with(prefix)).collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[test]
fn full_run_populates_captures_and_mails() {
    let fx = Fixture::new();
    let report = fx.workflow(0, "app-password").run(fx.run("Sheet1")).unwrap();

    assert_eq!(report.completed, Stage::ALL.to_vec());
    assert_eq!(report.observations, 7);
    assert!(report.skipped_fields.is_empty());
    assert_eq!(report.workbook.as_deref(), Some(fx.workbook.as_path()));
    assert_eq!(report.screenshot.as_deref(), Some(fx.screenshot.as_path()));
    assert_eq!(report.run_id.len(), 64);

    // Close spills across row 2, open across row 3.
    assert_eq!(read_cell(&fx.workbook, "Sheet1", "B2").unwrap(), "9.21");
    assert_eq!(read_cell(&fx.workbook, "Sheet1", "H2").unwrap(), "8.99");
    assert_eq!(read_cell(&fx.workbook, "Sheet1", "B3").unwrap(), "9.39");
    assert_eq!(read_cell(&fx.workbook, "Sheet1", "H3").unwrap(), "9");
    assert_eq!(read_cell(&fx.workbook, "Sheet1", "A1").unwrap(), "000001.SZ");

    assert!(std::fs::metadata(&fx.screenshot).unwrap().len() > 0);

    assert_eq!(fx.calls_starting("smtp connect").len(), 1);
    let sent = fx.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].matches("Content-Disposition: attachment").count(), 2);
    assert!(sent[0].contains("filename=\"report.xlsx\""));
    assert!(sent[0].contains("filename=\"report.png\""));
}

#[test]
fn components_run_in_stage_order_with_cleanup() {
    let fx = Fixture::new();
    fx.workflow(0, "app-password").run(fx.run("Sheet1")).unwrap();

    assert_eq!(
        fx.calls(),
        vec![
            "terminal start",
            "terminal wsd 000001.SZ open,close",
            "terminal stop",
            "host launch",
            "host open",
            "host select Sheet1",
            "host copy A1:F20",
            "host paste",
            "host export",
            "host delete canvas",
            "host close",
            "host quit",
            "smtp connect smtp.example.com:587",
            "smtp starttls",
            "smtp login",
            "smtp send",
            "smtp quit",
        ]
    );
}

#[test]
fn fetch_failure_aborts_before_any_later_stage() {
    let fx = Fixture::new();
    let err = fx.workflow(-40520007, "app-password").run(fx.run("Sheet1")).unwrap_err();

    assert_eq!(err.stage, Stage::Fetch);
    assert_eq!(err.kind(), FailureKind::DataRequest);
    assert!(err.left_on_disk.is_empty());

    assert!(fx.calls_starting("host").is_empty());
    assert!(fx.calls_starting("smtp").is_empty());
    assert_eq!(fx.calls().last().unwrap(), "terminal stop");
    assert_eq!(read_cell(&fx.workbook, "Sheet1", "B2").unwrap(), "");
    assert!(!fx.screenshot.exists());
}

#[test]
fn capture_of_unknown_sheet_still_releases_host() {
    let fx = Fixture::new();
    let err = fx.workflow(0, "app-password").run(fx.run("Summary")).unwrap_err();

    assert_eq!(err.stage, Stage::Capture);
    assert_eq!(err.kind(), FailureKind::SheetNotFound);
    assert_eq!(err.left_on_disk, vec![fx.workbook.clone()]);

    let host_calls = fx.calls_starting("host");
    assert_eq!(&host_calls[host_calls.len() - 2..], ["host close", "host quit"]);
    assert!(!host_calls.contains(&"host delete canvas".to_string()));
    assert!(fx.calls_starting("smtp").is_empty());
}

#[test]
fn mail_failure_leaves_artifacts_in_place() {
    let fx = Fixture::new();
    let err = fx.workflow(0, "different-password").run(fx.run("Sheet1")).unwrap_err();

    assert_eq!(err.stage, Stage::Email);
    assert_eq!(err.kind(), FailureKind::Authentication);
    assert_eq!(err.left_on_disk, vec![fx.workbook.clone(), fx.screenshot.clone()]);
    assert!(err.to_string().starts_with("email stage failed"));

    // No rollback: the populated workbook and the image remain.
    assert_eq!(read_cell(&fx.workbook, "Sheet1", "B2").unwrap(), "9.21");
    assert!(fx.screenshot.exists());
    assert_eq!(fx.calls().last().unwrap(), "smtp quit");
    assert!(fx.sent.lock().unwrap().is_empty());
}

#[test]
fn run_id_ignores_password() {
    let fx = Fixture::new();
    let a = fx.run("Sheet1");
    let mut b = fx.run("Sheet1");
    b.message.password = "rotated".into();
    assert_eq!(a.run_id(), b.run_id());

    b.fetch.end = date(2024, 1, 31);
    assert_ne!(a.run_id(), b.run_id());
}
