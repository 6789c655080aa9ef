//! Scoped terminal sessions and payload assembly.

use tracing::{debug, info, warn};

use super::provider::{DataError, Terminal, TerminalRequest, TerminalResponse};
use crate::domain::{FetchRequest, FetchResult};

/// Entry point for terminal access.
pub struct DataSource<T: Terminal> {
    terminal: T,
}

impl<T: Terminal> DataSource<T> {
    pub fn new(terminal: T) -> Self {
        Self { terminal }
    }

    pub fn terminal(&self) -> &T {
        &self.terminal
    }

    /// Open a session. The returned guard disconnects when dropped.
    pub fn connect(&self) -> Result<TerminalSession<'_, T>, DataError> {
        info!(terminal = self.terminal.name(), "logging into terminal");
        self.terminal.start()?;
        Ok(TerminalSession {
            terminal: &self.terminal,
            open: true,
        })
    }

    /// Connect, fetch once, disconnect. The session is released on every path.
    pub fn fetch_once(&self, request: &FetchRequest) -> Result<FetchResult, DataError> {
        let session = self.connect()?;
        let result = session.fetch(request);
        let closed = session.close();
        let payload = result?;
        closed?;
        Ok(payload)
    }
}

/// A live terminal session. Dropping it runs `disconnect`.
pub struct TerminalSession<'a, T: Terminal> {
    terminal: &'a T,
    open: bool,
}

impl<T: Terminal> TerminalSession<'_, T> {
    /// Issue one request and shape the response into a [`FetchResult`].
    pub fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, DataError> {
        request.check().map_err(DataError::InvalidRequest)?;

        info!(
            instrument = %request.instrument,
            fields = %request.joined_fields(),
            start = %request.start,
            end = %request.end,
            "fetching terminal data"
        );
        let wire = TerminalRequest {
            codes: request.instrument.clone(),
            fields: request.joined_fields(),
            begin: request.start,
            end: request.end,
            options: request.options_string(),
        };
        let response = self.terminal.wsd(&wire)?;
        if response.error_code != 0 {
            return Err(DataError::DataRequest {
                code: response.error_code,
            });
        }
        debug!(
            columns = response.data.len(),
            times = response.times.len(),
            "terminal response received"
        );
        assemble(request, response)
    }

    /// Disconnect now and surface any error from the terminal.
    pub fn close(mut self) -> Result<(), DataError> {
        self.open = false;
        info!("logging out of terminal");
        self.terminal.stop()
    }
}

impl<T: Terminal> Drop for TerminalSession<'_, T> {
    fn drop(&mut self) {
        if self.open {
            info!("logging out of terminal");
            if let Err(err) = self.terminal.stop() {
                warn!(error = %err, "terminal logout failed");
            }
        }
    }
}

/// Pair requested fields with returned columns.
///
/// Columns are matched by echoed name when the terminal echoes names, else by
/// position. Fields with no column are left out of the result.
pub fn assemble(request: &FetchRequest, response: TerminalResponse) -> Result<FetchResult, DataError> {
    let TerminalResponse {
        fields: echoed,
        data,
        times,
        ..
    } = response;

    let mut result = FetchResult::default();
    let mut columns: Vec<Option<Vec<_>>> = data.into_iter().map(Some).collect();

    for (idx, field) in request.fields.iter().enumerate() {
        let column_idx = if echoed.is_empty() {
            Some(idx)
        } else {
            echoed.iter().position(|e| e.eq_ignore_ascii_case(field))
        };
        let Some(column) = column_idx.and_then(|i| columns.get_mut(i)).and_then(Option::take) else {
            continue;
        };
        if !times.is_empty() && column.len() != times.len() {
            return Err(DataError::MalformedResponse(format!(
                "field '{field}' has {} values for {} timestamps",
                column.len(),
                times.len()
            )));
        }
        result.fields.insert(field.clone(), column);
    }

    if let Some(expected) = result.fields.values().next().map(Vec::len) {
        if times.is_empty() && result.fields.values().any(|c| c.len() != expected) {
            return Err(DataError::MalformedResponse(
                "field series have unequal lengths".into(),
            ));
        }
    }

    if !times.is_empty() {
        result.times = Some(times);
    }
    Ok(result)
}
