use lettre::transport::smtp;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{SmtpConnection, TlsParameters};
use lettre::transport::smtp::commands::{Data, Mail, Rcpt};
use lettre::transport::smtp::extension::{ClientId, Extension, MailBodyParameter, MailParameter};
use lettre::{Address, Message};
use log::{debug, warn};
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};

/// An open, authenticated connection that can hand a message to the server.
pub trait MailTransport {
    fn send(&mut self, message: &Message) -> Result<()>;
    /// Ends the session. Must be safe to call after a failed `send`.
    fn close(&mut self);
}

/// Opens a [`MailTransport`].
pub trait Connector {
    type Transport: MailTransport;
    fn connect(&self) -> Result<Self::Transport>;
}

/// Holds a transport and closes it when dropped, whichever way the holder
/// exits.
pub struct ScopedTransport<T: MailTransport> {
    inner: T,
}

impl<T: MailTransport> ScopedTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T: MailTransport> Deref for ScopedTransport<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: MailTransport> DerefMut for ScopedTransport<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: MailTransport> Drop for ScopedTransport<T> {
    fn drop(&mut self) {
        self.inner.close();
    }
}

/// Connects, sends one message and releases the connection. Single attempt.
pub fn deliver<C: Connector + ?Sized>(connector: &C, message: &Message) -> Result<()> {
    let mut transport = ScopedTransport::new(connector.connect()?);
    transport.send(message)
}

pub struct SmtpClient {
    pub server: String,
    pub port: u16,
    pub timeout: Duration,
    credentials: Credentials,
}

impl SmtpClient {
    pub fn new(
        server: impl Into<String>,
        port: u16,
        timeout: Duration,
        user: &str,
        password: &str,
    ) -> Self {
        Self {
            server: server.into(),
            port,
            timeout,
            credentials: Credentials::new(user.to_string(), password.to_string()),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.smtp_host.clone(),
            cfg.smtp_port,
            cfg.timeout,
            &cfg.email_id,
            &cfg.password,
        )
    }
}

impl Connector for SmtpClient {
    type Transport = SmtpSession;

    /// Plain connect, STARTTLS, then LOGIN/PLAIN.
    fn connect(&self) -> Result<SmtpSession> {
        let host = self.server.as_str();
        let hello = ClientId::default();
        let tls = TlsParameters::new(self.server.clone()).map_err(|e| Error::connection(host, e))?;

        debug!("connecting to {}:{}", host, self.port);
        let mut conn = SmtpConnection::connect(
            (host, self.port),
            Some(self.timeout),
            &hello,
            None,
            None,
        )
        .map_err(|e| Error::connection(host, e))?;

        if !conn.can_starttls() {
            conn.abort();
            return Err(Error::connection(host, "server does not offer STARTTLS"));
        }
        if let Err(e) = conn.starttls(&tls, &hello) {
            conn.abort();
            return Err(Error::connection(host, e));
        }
        if let Err(e) = authenticate(&mut conn, &self.credentials, host) {
            conn.abort();
            return Err(e);
        }

        Ok(SmtpSession {
            server: self.server.clone(),
            conn,
        })
    }
}

/// LOGIN or PLAIN, whichever the server offers first. Only a permanent
/// rejection counts as bad credentials.
fn authenticate(conn: &mut SmtpConnection, credentials: &Credentials, host: &str) -> Result<()> {
    conn.auth(&[Mechanism::Login, Mechanism::Plain], credentials)
        .map_err(|e| classify_auth_error(host, e))?;
    debug!("authenticated with {host}");
    Ok(())
}

fn classify_auth_error(host: &str, err: smtp::Error) -> Error {
    if err.is_permanent() || reply_code(&err) == Some(535) {
        Error::Auth(err.to_string())
    } else {
        Error::connection(host, err)
    }
}

pub struct SmtpSession {
    server: String,
    conn: SmtpConnection,
}

/// The SMTP command a failure answered.
#[derive(Debug, Clone, Copy)]
enum Stage<'a> {
    MailFrom,
    Recipient(&'a Address),
    Data,
}

impl SmtpSession {
    fn mail_parameters(&self, message: &Message, body: &[u8]) -> Result<Vec<MailParameter>> {
        let info = self.conn.server_info();
        let mut params = Vec::new();

        let envelope = message.envelope();
        let non_ascii_address = envelope
            .from()
            .into_iter()
            .chain(envelope.to())
            .any(|a| !AsRef::<str>::as_ref(a).is_ascii());
        if non_ascii_address {
            if !info.supports_feature(Extension::SmtpUtfEight) {
                return Err(Error::SendFailed(
                    "server does not accept non-ASCII addresses (no SMTPUTF8)".to_string(),
                ));
            }
            params.push(MailParameter::SmtpUtfEight);
        }
        if !body.is_ascii() {
            if !info.supports_feature(Extension::EightBitMime) {
                return Err(Error::SendFailed(
                    "server does not accept 8-bit content (no 8BITMIME)".to_string(),
                ));
            }
            params.push(MailParameter::Body(MailBodyParameter::EightBitMime));
        }
        Ok(params)
    }
}

impl MailTransport for SmtpSession {
    /// Walks the envelope one command at a time so a failure can be
    /// attributed to the command that caused it.
    fn send(&mut self, message: &Message) -> Result<()> {
        let envelope = message.envelope();
        let body = message.formatted();
        let params = self.mail_parameters(message, &body)?;

        self.conn
            .command(Mail::new(envelope.from().cloned(), params))
            .map_err(|e| classify_send_error(&self.server, Stage::MailFrom, e))?;
        for recipient in envelope.to() {
            self.conn
                .command(Rcpt::new(recipient.clone(), Vec::new()))
                .map_err(|e| classify_send_error(&self.server, Stage::Recipient(recipient), e))?;
        }
        self.conn
            .command(Data)
            .map_err(|e| classify_send_error(&self.server, Stage::Data, e))?;
        let response = self
            .conn
            .message(&body)
            .map_err(|e| classify_send_error(&self.server, Stage::Data, e))?;

        debug!("server accepted message: {:?}", response.first_line());
        Ok(())
    }

    fn close(&mut self) {
        if let Err(e) = self.conn.quit() {
            warn!("QUIT to {} failed ({e}); dropping connection", self.server);
            self.conn.abort();
        } else {
            debug!("closed connection to {}", self.server);
        }
    }
}

fn reply_code(err: &smtp::Error) -> Option<u16> {
    err.status().map(u16::from)
}

/// Only a permanent `RCPT` refusal names a rejected recipient; every other
/// failed step is a failed send.
fn classify_send_error(server: &str, stage: Stage<'_>, err: smtp::Error) -> Error {
    match (stage, reply_code(&err)) {
        (_, Some(530 | 534 | 535)) => Error::Auth(err.to_string()),
        (Stage::Recipient(recipient), _) if err.is_permanent() => Error::RecipientRejected {
            recipient: recipient.to_string(),
            reason: err.to_string(),
        },
        _ if err.is_timeout() => Error::connection(server, err),
        (stage, _) => {
            debug!("{stage:?} step failed on {server}");
            Error::SendFailed(err.to_string())
        }
    }
}
