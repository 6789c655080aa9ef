//! TOML workflow configuration.
//!
//! One file describes a complete run: where the terminal gateway is, what to
//! fetch, where it lands in the workbook, which range to screenshot and who
//! gets the email. Relative paths resolve against the config file's directory.
//! [`DeliveryConfig`] reads only the `[host]` and `[email]` sections.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use autoreport_core::domain::{CanvasSize, SpillDirection};
use autoreport_core::sheet::{CellRef, RangeRef};
use autoreport_core::{CaptureRequest, CellMapping, FetchRequest, OutboundMessage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workflow::WorkflowRun;

/// Environment variable consulted when `[email]` has no password.
pub const DEFAULT_PASSWORD_ENV: &str = "AUTOREPORT_SMTP_PASSWORD";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("no SMTP password: set [email].password or the {var} environment variable")]
    MissingPassword { var: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalSection {
    /// Base URL of the terminal gateway.
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl TerminalSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSection {
    #[serde(default = "default_powershell")]
    pub powershell: PathBuf,
}

fn default_powershell() -> PathBuf {
    PathBuf::from("powershell")
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            powershell: default_powershell(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellsSection {
    pub workbook: PathBuf,
    pub sheet: String,
    #[serde(default)]
    pub spill: SpillDirection,
    pub mapping: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSection {
    /// Defaults to `[cells].workbook`.
    #[serde(default)]
    pub workbook: Option<PathBuf>,
    pub sheet: String,
    pub range: String,
    pub output: PathBuf,
    #[serde(default)]
    pub canvas: Option<CanvasSize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailSection {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_env: Option<String>,
    pub recipients: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default = "default_body")]
    pub body: String,
    /// Extra files attached ahead of the workbook and screenshot.
    #[serde(default)]
    pub attachments: Vec<PathBuf>,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_subject() -> String {
    "AutoReport".to_string()
}

fn default_body() -> String {
    "Please find the requested data attached.".to_string()
}

impl EmailSection {
    /// Inline password, else the configured (or default) environment variable.
    pub fn resolve_password(&self) -> Result<String, ConfigError> {
        if let Some(password) = &self.password {
            return Ok(password.clone());
        }
        let var = self
            .password_env
            .clone()
            .unwrap_or_else(|| DEFAULT_PASSWORD_ENV.to_string());
        std::env::var(&var).map_err(|_| ConfigError::MissingPassword { var })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.recipients.is_empty() {
            return Err(ConfigError::Invalid("[email] recipients is empty".into()));
        }
        if self.smtp_port == 0 {
            return Err(ConfigError::Invalid("[email] smtp_port must be non-zero".into()));
        }
        Ok(())
    }

    /// The message this section describes; attachment paths resolve against `base_dir`.
    pub fn to_message(&self, base_dir: &Path) -> Result<OutboundMessage, ConfigError> {
        Ok(OutboundMessage {
            smtp_host: self.smtp_host.clone(),
            smtp_port: self.smtp_port,
            username: self.username.clone(),
            password: self.resolve_password()?,
            recipients: self.recipients.clone(),
            cc: self.cc.clone(),
            bcc: self.bcc.clone(),
            subject: self.subject.clone(),
            body: self.body.clone(),
            attachments: self.attachments.iter().map(|p| resolve_path(base_dir, p)).collect(),
        })
    }
}

fn resolve_path(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn read_config(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Just the `[host]` and `[email]` sections, for sending without a fetch.
///
/// Any other section in the file is ignored, so a full workflow config
/// loads as a delivery config too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub host: HostSection,
    pub email: EmailSection,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl DeliveryConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_toml(&read_config(path)?)?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: DeliveryConfig = toml::from_str(content)?;
        config.email.validate()?;
        Ok(config)
    }

    pub fn outbound_message(&self) -> Result<OutboundMessage, ConfigError> {
        self.email.to_message(&self.base_dir)
    }
}

/// A complete workflow configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub terminal: TerminalSection,
    #[serde(default)]
    pub host: HostSection,
    pub fetch: FetchRequest,
    pub cells: CellsSection,
    pub capture: CaptureSection,
    pub email: EmailSection,
    /// Directory relative paths resolve against. Not part of the file.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl WorkflowConfig {
    /// Load a config from a TOML file; relative paths resolve next to it.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_toml(&read_config(path)?)?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: WorkflowConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that can be checked without touching an external system.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fetch
            .check()
            .map_err(|e| ConfigError::Invalid(format!("[fetch] {e}")))?;

        if self.cells.mapping.is_empty() {
            return Err(ConfigError::Invalid("[cells.mapping] is empty".into()));
        }
        for (field, cell) in &self.cells.mapping {
            cell.parse::<CellRef>()
                .map_err(|e| ConfigError::Invalid(format!("[cells.mapping] {field}: {e}")))?;
        }

        self.capture
            .range
            .parse::<RangeRef>()
            .map_err(|e| ConfigError::Invalid(format!("[capture] range: {e}")))?;
        if let Some(canvas) = self.capture.canvas {
            if canvas.width <= 0.0 || canvas.height <= 0.0 {
                return Err(ConfigError::Invalid("[capture] canvas must be positive".into()));
            }
        }

        self.email.validate()?;
        if self.terminal.url.trim().is_empty() {
            return Err(ConfigError::Invalid("[terminal] url is empty".into()));
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        resolve_path(&self.base_dir, path)
    }

    pub fn cell_mapping(&self) -> CellMapping {
        CellMapping {
            workbook_path: self.resolve(&self.cells.workbook),
            sheet_name: self.cells.sheet.clone(),
            mapping: self.cells.mapping.clone(),
            spill: self.cells.spill,
        }
    }

    pub fn capture_request(&self) -> CaptureRequest {
        let workbook = self.capture.workbook.as_ref().unwrap_or(&self.cells.workbook);
        CaptureRequest {
            workbook_path: self.resolve(workbook),
            sheet_name: self.capture.sheet.clone(),
            range: self.capture.range.clone(),
            output_path: self.resolve(&self.capture.output),
            canvas: self.capture.canvas,
        }
    }

    pub fn outbound_message(&self) -> Result<OutboundMessage, ConfigError> {
        self.email.to_message(&self.base_dir)
    }

    /// Assemble the records for one run.
    pub fn to_run(&self) -> Result<WorkflowRun, ConfigError> {
        Ok(WorkflowRun {
            fetch: self.fetch.clone(),
            cells: self.cell_mapping(),
            capture: self.capture_request(),
            message: self.outbound_message()?,
        })
    }
}
