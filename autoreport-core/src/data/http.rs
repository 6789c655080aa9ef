//! HTTP gateway in front of the market-data terminal.
//!
//! The terminal client library only runs on the terminal host; a small gateway
//! there exposes session start/stop and the `wsd` time-series call as JSON
//! endpoints. This adapter speaks that protocol with a blocking client.
//!
//! No retries: a failed call fails the run.

use super::provider::{DataError, Terminal, TerminalRequest, TerminalResponse};
use serde::Deserialize;
use std::time::Duration;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Gateway status reply for session calls.
#[derive(Debug, Deserialize)]
struct SessionReply {
    error_code: i64,
    #[serde(default)]
    message: Option<String>,
}

/// Terminal reached through an HTTP gateway.
pub struct HttpTerminal {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpTerminal {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataError::Connection(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn session_call(&self, path: &str) -> Result<(), DataError> {
        let resp = self
            .client
            .post(self.url(path))
            .send()
            .map_err(|e| DataError::Connection(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DataError::Connection(format!("HTTP {status} from {path}")));
        }

        let reply: SessionReply = resp
            .json()
            .map_err(|e| DataError::MalformedResponse(format!("{path}: {e}")))?;
        if reply.error_code != 0 {
            return Err(DataError::Connection(format!(
                "{path} returned error code {}{}",
                reply.error_code,
                reply.message.map(|m| format!(": {m}")).unwrap_or_default()
            )));
        }
        Ok(())
    }
}

impl Terminal for HttpTerminal {
    fn name(&self) -> &str {
        "http_gateway"
    }

    fn start(&self) -> Result<(), DataError> {
        self.session_call("session/start")
    }

    fn wsd(&self, request: &TerminalRequest) -> Result<TerminalResponse, DataError> {
        let resp = self
            .client
            .post(self.url("wsd"))
            .json(request)
            .send()
            .map_err(|e| DataError::Connection(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DataError::Connection(format!(
                "HTTP {status} for {}",
                request.codes
            )));
        }

        resp.json().map_err(|e| {
            DataError::MalformedResponse(format!(
                "failed to parse response for {}: {e}",
                request.codes
            ))
        })
    }

    fn stop(&self) -> Result<(), DataError> {
        self.session_call("session/stop")
    }
}
