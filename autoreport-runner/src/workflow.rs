//! The fetch → populate → capture → email orchestrator.
//!
//! Stages run strictly in [`Stage::ALL`] order. The first failure ends the
//! run; nothing is retried and nothing already written is undone, so an
//! email-stage failure leaves the populated workbook and the screenshot on
//! disk.

use std::fmt;
use std::path::PathBuf;

use autoreport_core::capture::HostLauncher;
use autoreport_core::data::Terminal;
use autoreport_core::mail::MailTransport;
use autoreport_core::{
    CaptureRequest, CellMapping, DataSource, FetchRequest, Mailer, OutboundMessage, RangeCapture,
    SheetWriter,
};
use serde::Serialize;
use tracing::{error, info, info_span};

use crate::error::{StageError, WorkflowError};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetch,
    Populate,
    Capture,
    Email,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Fetch, Stage::Populate, Stage::Capture, Stage::Email];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Fetch => "fetch",
            Stage::Populate => "populate",
            Stage::Capture => "capture",
            Stage::Email => "email",
        })
    }
}

/// Everything one run needs. Consumed by [`Workflow::run`].
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub fetch: FetchRequest,
    pub cells: CellMapping,
    pub capture: CaptureRequest,
    pub message: OutboundMessage,
}

#[derive(Serialize)]
struct Fingerprint<'a> {
    fetch: &'a FetchRequest,
    cells: &'a CellMapping,
    capture: &'a CaptureRequest,
    smtp_host: &'a str,
    recipients: &'a [String],
    subject: &'a str,
}

impl WorkflowRun {
    /// Deterministic id over the run's inputs (credentials excluded).
    pub fn run_id(&self) -> String {
        let fingerprint = Fingerprint {
            fetch: &self.fetch,
            cells: &self.cells,
            capture: &self.capture,
            smtp_host: &self.message.smtp_host,
            recipients: &self.message.recipients,
            subject: &self.message.subject,
        };
        let json = serde_json::to_string(&fingerprint).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

/// What a successful run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub run_id: String,
    pub completed: Vec<Stage>,
    pub observations: usize,
    pub skipped_fields: Vec<String>,
    pub workbook: Option<PathBuf>,
    pub screenshot: Option<PathBuf>,
}

impl RunReport {
    /// Files this run has produced or modified so far.
    pub fn artifacts(&self) -> Vec<PathBuf> {
        self.workbook.iter().chain(self.screenshot.iter()).cloned().collect()
    }
}

/// The four components wired together.
pub struct Workflow<T: Terminal, L: HostLauncher, M: MailTransport> {
    data: DataSource<T>,
    writer: SheetWriter,
    capture: RangeCapture<L>,
    mailer: Mailer<M>,
}

impl<T: Terminal, L: HostLauncher, M: MailTransport> Workflow<T, L, M> {
    pub fn new(terminal: T, launcher: L, transport: M) -> Self {
        Self {
            data: DataSource::new(terminal),
            writer: SheetWriter::new(),
            capture: RangeCapture::new(launcher),
            mailer: Mailer::new(transport),
        }
    }

    pub fn data_source(&self) -> &DataSource<T> {
        &self.data
    }

    pub fn range_capture(&self) -> &RangeCapture<L> {
        &self.capture
    }

    pub fn mailer(&self) -> &Mailer<M> {
        &self.mailer
    }

    /// Run all four stages. Returns at the first failure.
    pub fn run(&self, run: WorkflowRun) -> Result<RunReport, WorkflowError> {
        let run_id = run.run_id();
        let WorkflowRun {
            fetch,
            cells,
            capture,
            mut message,
        } = run;

        let span = info_span!("workflow", run_id = %&run_id[..12]);
        let _enter = span.enter();

        let mut report = RunReport {
            run_id,
            ..RunReport::default()
        };

        let payload = step(&mut report, Stage::Fetch, || self.data.fetch_once(&fetch))?;
        report.observations = payload.len();

        let populated = step(&mut report, Stage::Populate, || self.writer.apply(&cells, &payload))?;
        report.skipped_fields = populated.skipped;
        report.workbook = Some(populated.workbook_path.clone());

        let screenshot = step(&mut report, Stage::Capture, || self.capture.capture(&capture))?;
        report.screenshot = Some(screenshot.clone());

        message.attachments.push(populated.workbook_path);
        message.attachments.push(screenshot);

        step(&mut report, Stage::Email, || self.mailer.send(&message))?;

        info!(stages = report.completed.len(), "workflow complete");
        Ok(report)
    }
}

/// Run one stage: log it, tag a failure with the stage, record success.
fn step<T, E, F>(report: &mut RunReport, stage: Stage, f: F) -> Result<T, WorkflowError>
where
    E: Into<StageError>,
    F: FnOnce() -> Result<T, E>,
{
    info!(%stage, "stage started");
    match f() {
        Ok(value) => {
            report.completed.push(stage);
            info!(%stage, "stage completed");
            Ok(value)
        }
        Err(e) => {
            let source: StageError = e.into();
            error!(%stage, error = %source, "stage failed, aborting run");
            Err(WorkflowError {
                stage,
                source,
                left_on_disk: report.artifacts(),
            })
        }
    }
}
