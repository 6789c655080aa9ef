//! Mail transport boundary and the SMTP implementation.

use std::time::Duration;

use lettre::address::Envelope;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{SmtpConnection, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use tracing::debug;

use super::MailError;

/// Connect timeout for SMTP sessions.
pub const DEFAULT_SMTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Reply codes that mean the server rejected the credentials.
const AUTH_REJECTED: [&str; 3] = ["530", "534", "535"];

/// Opens mail sessions.
pub trait MailTransport {
    type Session: MailSession;

    fn connect(&self, host: &str, port: u16) -> Result<Self::Session, MailError>;
}

/// One open mail session, driven step by step.
pub trait MailSession {
    /// Upgrade the connection to TLS.
    fn starttls(&mut self) -> Result<(), MailError>;

    /// Fails with [`MailError::Authentication`] when credentials are rejected.
    fn login(&mut self, username: &str, password: &str) -> Result<(), MailError>;

    /// Send one message to every envelope recipient. Any rejection fails the
    /// whole send.
    fn send(&mut self, envelope: &Envelope, raw: &[u8]) -> Result<(), MailError>;

    fn quit(&mut self) -> Result<(), MailError>;
}

/// Closes the wrapped session on drop unless already closed.
pub struct SessionGuard<S: MailSession> {
    session: S,
    open: bool,
}

impl<S: MailSession> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self { session, open: true }
    }

    pub fn session(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn close(mut self) -> Result<(), MailError> {
        self.open = false;
        self.session.quit()
    }
}

impl<S: MailSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if self.open {
            if let Err(err) = self.session.quit() {
                debug!(error = %err, "mail session quit failed");
            }
        }
    }
}

/// Authenticated SMTP with STARTTLS.
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    timeout: Duration,
}

impl Default for SmtpTransport {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SMTP_TIMEOUT,
        }
    }
}

impl SmtpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl MailTransport for SmtpTransport {
    type Session = SmtpSession;

    fn connect(&self, host: &str, port: u16) -> Result<SmtpSession, MailError> {
        let hello = ClientId::default();
        let connection = SmtpConnection::connect((host, port), Some(self.timeout), &hello, None, None)
            .map_err(|e| MailError::Connection(format!("{host}:{port}: {e}")))?;
        Ok(SmtpSession {
            connection,
            host: host.to_string(),
            hello,
        })
    }
}

pub struct SmtpSession {
    connection: SmtpConnection,
    host: String,
    hello: ClientId,
}

impl MailSession for SmtpSession {
    fn starttls(&mut self) -> Result<(), MailError> {
        if !self.connection.can_starttls() {
            return Err(MailError::Tls(format!("{} does not offer STARTTLS", self.host)));
        }
        let params = TlsParameters::new(self.host.clone()).map_err(|e| MailError::Tls(e.to_string()))?;
        self.connection
            .starttls(&params, &self.hello)
            .map_err(|e| MailError::Tls(e.to_string()))
    }

    fn login(&mut self, username: &str, password: &str) -> Result<(), MailError> {
        let credentials = Credentials::new(username.to_string(), password.to_string());
        self.connection
            .auth(&[Mechanism::Plain, Mechanism::Login], &credentials)
            .map(|_| ())
            .map_err(|e| {
                let rejected = e
                    .status()
                    .map(|code| AUTH_REJECTED.contains(&code.to_string().as_str()))
                    .unwrap_or(false);
                if rejected || e.is_permanent() {
                    MailError::Authentication(e.to_string())
                } else {
                    MailError::Connection(e.to_string())
                }
            })
    }

    fn send(&mut self, envelope: &Envelope, raw: &[u8]) -> Result<(), MailError> {
        self.connection
            .send(envelope, raw)
            .map(|_| ())
            .map_err(|e| MailError::DeliverySend(e.to_string()))
    }

    fn quit(&mut self) -> Result<(), MailError> {
        self.connection
            .quit()
            .map(|_| ())
            .map_err(|e| MailError::Connection(e.to_string()))
    }
}
