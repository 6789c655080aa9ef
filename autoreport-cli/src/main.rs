//! AutoReport CLI: run, fetch, demo and check commands.
//!
//! Commands:
//! - `run`: fetch, populate, capture and email, driven by a TOML config
//! - `fetch`: terminal pull only; prints the first rows, optionally writes CSV
//! - `demo`: build a two-sheet workbook, screenshot it and email both files
//! - `check`: validate a config without touching any external system

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use autoreport_core::capture::ExcelLauncher;
use autoreport_core::data::HttpTerminal;
use autoreport_core::domain::TIMES_KEY;
use autoreport_core::mail::SmtpTransport;
use autoreport_core::sheet::create_workbook;
use autoreport_core::{
    CaptureRequest, CellValue, DataSource, FetchRequest, FetchResult, Mailer, RangeCapture,
};
use autoreport_runner::{DeliveryConfig, Stage, Workflow, WorkflowConfig};

#[derive(Parser)]
#[command(
    name = "autoreport",
    about = "AutoReport: terminal data to workbook, screenshot and email"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full workflow from a TOML config file.
    Run {
        /// Path to the workflow config.
        #[arg(long)]
        config: PathBuf,
    },
    /// Pull one time series from the terminal and print it.
    Fetch {
        /// Take terminal and request from this config instead of flags.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Terminal gateway URL.
        #[arg(long)]
        url: Option<String>,

        /// Instrument code (e.g., 000001.SZ).
        #[arg(long)]
        instrument: Option<String>,

        /// Comma-separated field names (e.g., open,close,volume).
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD).
        #[arg(long)]
        end: Option<String>,

        /// Sampling frequency code.
        #[arg(long, default_value = "D")]
        frequency: String,

        /// Extra terminal options, appended after the period.
        #[arg(long)]
        options: Option<String>,

        /// Number of rows to print.
        #[arg(long, default_value_t = 5)]
        rows: usize,

        /// Also write every row to this CSV file.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Build a demo workbook, capture Sheet1!A1:B5 and email both files.
    Demo {
        /// Config with [email] and optionally [host]; other sections are ignored.
        #[arg(long)]
        config: PathBuf,

        /// Directory for the demo workbook and screenshot.
        #[arg(long, default_value = "demo-output")]
        out_dir: PathBuf,
    },
    /// Validate a config file and print what a run would do.
    Check {
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Run { config } => run_workflow_cmd(&config),
        Commands::Fetch {
            config,
            url,
            instrument,
            fields,
            start,
            end,
            frequency,
            options,
            rows,
            csv,
        } => {
            let flags = FetchFlags {
                url,
                instrument,
                fields,
                start,
                end,
                frequency,
                options,
            };
            run_fetch_cmd(config.as_deref(), flags, rows, csv.as_deref())
        }
        Commands::Demo { config, out_dir } => run_demo_cmd(&config, &out_dir),
        Commands::Check { config } => run_check_cmd(&config),
    };

    if let Err(err) = outcome {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

/// `LOG_FORMAT=json` for machine-readable output; `RUST_LOG` sets the filter.
fn init_logging() {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run_workflow_cmd(config_path: &Path) -> Result<()> {
    let config = WorkflowConfig::from_file(config_path)?;
    let run = config.to_run()?;

    let terminal = HttpTerminal::new(&config.terminal.url, config.terminal.timeout())?;
    let launcher = ExcelLauncher::new(&config.host.powershell);
    let workflow = Workflow::new(terminal, launcher, SmtpTransport::default());

    match workflow.run(run) {
        Ok(report) => {
            println!("Run {} complete", &report.run_id[..12]);
            println!("  observations: {}", report.observations);
            if !report.skipped_fields.is_empty() {
                println!("  skipped fields: {}", report.skipped_fields.join(", "));
            }
            for artifact in report.artifacts() {
                println!("  sent: {}", artifact.display());
            }
            Ok(())
        }
        Err(err) => {
            for path in &err.left_on_disk {
                eprintln!("left on disk: {}", path.display());
            }
            let kind = err.kind();
            Err(anyhow::Error::new(err).context(format!("workflow aborted ({kind})")))
        }
    }
}

struct FetchFlags {
    url: Option<String>,
    instrument: Option<String>,
    fields: Vec<String>,
    start: Option<String>,
    end: Option<String>,
    frequency: String,
    options: Option<String>,
}

impl FetchFlags {
    fn into_request(self) -> Result<(String, FetchRequest)> {
        let Some(url) = self.url else {
            bail!("--url is required without --config");
        };
        let Some(instrument) = self.instrument else {
            bail!("--instrument is required without --config");
        };
        if self.fields.is_empty() {
            bail!("--fields is required without --config");
        }
        let start = parse_date(self.start.as_deref(), "--start")?;
        let end = parse_date(self.end.as_deref(), "--end")?;

        let fields: Vec<&str> = self.fields.iter().map(String::as_str).collect();
        let mut request = FetchRequest::new(instrument, &fields, start, end).with_frequency(self.frequency);
        if let Some(options) = self.options {
            request = request.with_options(options);
        }
        Ok((url, request))
    }
}

fn parse_date(value: Option<&str>, flag: &str) -> Result<NaiveDate> {
    let Some(value) = value else {
        bail!("{flag} is required without --config");
    };
    NaiveDate::parse_from_str(value, "%Y-%m-%d").with_context(|| format!("{flag} '{value}' is not YYYY-MM-DD"))
}

fn run_fetch_cmd(config_path: Option<&Path>, flags: FetchFlags, rows: usize, csv_path: Option<&Path>) -> Result<()> {
    let (terminal, request) = match config_path {
        Some(path) => {
            let config = WorkflowConfig::from_file(path)?;
            let terminal = HttpTerminal::new(&config.terminal.url, config.terminal.timeout())?;
            (terminal, config.fetch)
        }
        None => {
            let (url, request) = flags.into_request()?;
            (HttpTerminal::new(url, autoreport_core::data::http::DEFAULT_TIMEOUT)?, request)
        }
    };

    let result = DataSource::new(terminal).fetch_once(&request)?;

    println!("Fields returned: {}", result.keys().join(", "));
    print_rows(&request, &result, rows);

    if let Some(path) = csv_path {
        write_csv(path, &request, &result)?;
        println!("CSV written to: {}", path.display());
    }
    Ok(())
}

/// Row labels are the timestamps when present, else the row index.
fn row_label(result: &FetchResult, idx: usize) -> String {
    match result.times.as_ref().and_then(|t| t.get(idx)) {
        Some(date) => date.to_string(),
        None => format!("row {idx}"),
    }
}

fn value_at(result: &FetchResult, field: &str, idx: usize) -> String {
    result
        .fields
        .get(field)
        .and_then(|series| series.get(idx))
        .map(CellValue::to_string)
        .unwrap_or_default()
}

fn print_rows(request: &FetchRequest, result: &FetchResult, rows: usize) {
    let shown = rows.min(result.len());
    println!("First {shown} rows:");
    print!("{:<12}", TIMES_KEY);
    for field in &request.fields {
        print!(" {:>12}", field);
    }
    println!();
    for idx in 0..shown {
        print!("{:<12}", row_label(result, idx));
        for field in &request.fields {
            print!(" {:>12}", value_at(result, field, idx));
        }
        println!();
    }
}

fn write_csv(path: &Path, request: &FetchRequest, result: &FetchResult) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;

    let mut header = vec![TIMES_KEY.to_string()];
    header.extend(request.fields.iter().cloned());
    writer.write_record(&header)?;

    for idx in 0..result.len() {
        let mut record = vec![row_label(result, idx)];
        record.extend(request.fields.iter().map(|f| value_at(result, f, idx)));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn run_demo_cmd(config_path: &Path, out_dir: &Path) -> Result<()> {
    let config = DeliveryConfig::from_file(config_path)?;

    let workbook = create_workbook(
        &out_dir.join("demo_report.xlsx"),
        &[
            ("Sheet1", "A1", CellValue::Number(100.0)),
            ("Sheet2", "A2", CellValue::Number(300.0)),
        ],
    )?;
    info!(workbook = %workbook.display(), "demo workbook created");

    let capture = RangeCapture::new(ExcelLauncher::new(&config.host.powershell));
    let request = CaptureRequest::new(&workbook, "Sheet1", "A1:B5", out_dir.join("demo_report.png"));
    let screenshot = capture.capture(&request)?;

    let mut message = config.outbound_message()?;
    message.subject = "Demo Excel report".to_string();
    message.body = "Attached: demo workbook and screenshot. Sheet1!A1=100, Sheet2!A2=300.".to_string();
    message.attachments = vec![workbook.clone(), screenshot.clone()];
    Mailer::new(SmtpTransport::default()).send(&message)?;

    println!(
        "Demo complete: {} and {} sent to {}",
        workbook.display(),
        screenshot.display(),
        message.recipients.join(", ")
    );
    Ok(())
}

fn run_check_cmd(config_path: &Path) -> Result<()> {
    let config = WorkflowConfig::from_file(config_path)?;
    let run = config.to_run()?;

    println!("Config OK: {}", config_path.display());
    println!("Run id: {}", &run.run_id()[..12]);
    println!(
        "  {}: {} [{}] {} to {} ({})",
        Stage::Fetch,
        run.fetch.instrument,
        run.fetch.joined_fields(),
        run.fetch.start,
        run.fetch.end,
        run.fetch.options_string()
    );
    println!(
        "  {}: {} sheet '{}', {} field(s), spill {:?}",
        Stage::Populate,
        run.cells.workbook_path.display(),
        run.cells.sheet_name,
        run.cells.mapping.len(),
        run.cells.spill
    );
    println!(
        "  {}: {}!{} -> {}",
        Stage::Capture,
        run.capture.sheet_name,
        run.capture.range,
        run.capture.output_path.display()
    );
    println!(
        "  {}: {}:{} to {}",
        Stage::Email,
        run.message.smtp_host,
        run.message.smtp_port,
        run.message.recipients.join(", ")
    );
    if !run.cells.workbook_path.exists() {
        println!("  warning: workbook does not exist yet");
    }
    Ok(())
}
