//! AutoReport runner: workflow configuration and orchestration.
//!
//! This crate builds on `autoreport-core` to provide:
//! - TOML workflow configuration with path resolution and password lookup
//! - The four-stage orchestrator (fetch, populate, capture, email)
//! - A failure taxonomy tagged with the stage that failed

pub mod config;
pub mod error;
pub mod workflow;

pub use config::{ConfigError, DeliveryConfig, WorkflowConfig, DEFAULT_PASSWORD_ENV};
pub use error::{FailureKind, StageError, WorkflowError};
pub use workflow::{RunReport, Stage, Workflow, WorkflowRun};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn workflow_config_is_send_sync() {
        assert_send::<WorkflowConfig>();
        assert_sync::<WorkflowConfig>();
    }

    #[test]
    fn workflow_error_is_send_sync() {
        assert_send::<WorkflowError>();
        assert_sync::<WorkflowError>();
    }

    #[test]
    fn run_report_is_send_sync() {
        assert_send::<RunReport>();
        assert_sync::<RunReport>();
    }
}
