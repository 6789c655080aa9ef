//! Terminal access: session handling and time-series fetch.

pub mod http;
pub mod provider;
pub mod session;

pub use http::HttpTerminal;
pub use provider::{DataError, Terminal, TerminalRequest, TerminalResponse};
pub use session::{assemble, DataSource, TerminalSession};
