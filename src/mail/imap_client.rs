use log::{debug, warn};
use native_tls::{TlsConnector, TlsStream};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::{Config, SUBJECT_MAX_CHARS};
use crate::domain::email::{EmailId, EmailSummary};
use crate::error::{Error, Result};
use crate::mail::decoders::{normalize_header, read_headers, split_sender};

/// The handful of mailbox operations the listing needs.
pub trait Mailbox {
    /// Every message sequence number in the selected mailbox, ascending.
    fn search_all(&mut self) -> Result<Vec<EmailId>>;
    /// Raw RFC 822 bytes of one message, `None` if the server sent no body.
    fn fetch_rfc822(&mut self, id: EmailId) -> Result<Option<Vec<u8>>>;
    fn logout(&mut self) -> Result<()>;
}

pub struct ImapClient {
    pub server: String,
    pub port: u16,
    pub timeout: Duration,
}

impl ImapClient {
    pub fn new(server: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            server: server.into(),
            port,
            timeout,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.imap_host.clone(), cfg.imap_port, cfg.timeout)
    }

    /// Tries every resolved address in turn, keeping the last failure.
    fn connect_tcp(&self) -> Result<TcpStream> {
        let host = self.server.as_str();
        let addrs = (host, self.port)
            .to_socket_addrs()
            .map_err(|e| Error::connection(host, e))?;

        let mut last_err = None;
        for addr in addrs {
            debug!("connecting to {}:{} ({addr})", host, self.port);
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(tcp) => return Ok(tcp),
                Err(e) => {
                    debug!("{addr} unreachable: {e}");
                    last_err = Some(e);
                }
            }
        }
        Err(match last_err {
            Some(e) => Error::connection(host, e),
            None => Error::connection(host, "no address found"),
        })
    }

    fn connect(&self) -> Result<imap::Client<TlsStream<TcpStream>>> {
        let host = self.server.as_str();
        let tcp = self.connect_tcp()?;
        tcp.set_read_timeout(Some(self.timeout))
            .and_then(|_| tcp.set_write_timeout(Some(self.timeout)))
            .map_err(|e| Error::connection(host, e))?;

        let tls = TlsConnector::builder()
            .build()
            .map_err(|e| Error::connection(host, e))?;
        let stream = tls
            .connect(host, tcp)
            .map_err(|e| Error::connection(host, e))?;

        let mut client = imap::Client::new(stream);
        client
            .read_greeting()
            .map_err(|e| Error::connection(host, e))?;
        Ok(client)
    }

    /// Connects, logs in and selects INBOX.
    pub fn open_inbox(&self, user: &str, password: &str) -> Result<ImapSession> {
        let client = self.connect()?;
        let mut session = client
            .login(user, password)
            .map_err(|(e, _client)| login_error(&self.server, e))?;
        debug!("logged in as {user}");

        let mailbox = session
            .select("INBOX")
            .map_err(|e| Error::connection(&self.server, e))?;
        debug!("INBOX has {} messages", mailbox.exists);

        Ok(ImapSession {
            server: self.server.clone(),
            session,
        })
    }
}

pub struct ImapSession {
    server: String,
    session: imap::Session<TlsStream<TcpStream>>,
}

impl Mailbox for ImapSession {
    fn search_all(&mut self) -> Result<Vec<EmailId>> {
        let mut ids: Vec<EmailId> = self
            .session
            .search("ALL")
            .map_err(|e| Error::connection(&self.server, e))?
            .into_iter()
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn fetch_rfc822(&mut self, id: EmailId) -> Result<Option<Vec<u8>>> {
        let fetches = self
            .session
            .fetch(id.to_string(), "RFC822")
            .map_err(|e| Error::connection(&self.server, e))?;
        Ok(fetches.iter().next().and_then(|f| f.body()).map(<[u8]>::to_vec))
    }

    fn logout(&mut self) -> Result<()> {
        self.session
            .logout()
            .map_err(|e| Error::connection(&self.server, e))
    }
}

/// A tagged NO or BAD answer to LOGIN means the server refused the
/// credentials; anything else is the connection's fault.
fn login_error(server: &str, err: imap::error::Error) -> Error {
    match err {
        imap::error::Error::No(msg) | imap::error::Error::Bad(msg) => Error::Auth(msg),
        other => Error::connection(server, other),
    }
}

/// Inclusive upper and exclusive lower message id of one inbox page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBounds {
    pub highest: EmailId,
    pub lowest: EmailId,
}

/// Page 1 ends at `max_id`; each further page steps back `page_size` ids.
/// `None` once the page starts before the first message.
pub fn page_bounds(max_id: EmailId, page: u32, page_size: u32) -> Option<PageBounds> {
    let skipped = i64::from(page_size) * i64::from(page.saturating_sub(1));
    let highest = i64::from(max_id) - skipped;
    if highest <= 0 {
        return None;
    }
    let lowest = (highest - i64::from(page_size)).max(0);
    Some(PageBounds {
        highest: highest as EmailId,
        lowest: lowest as EmailId,
    })
}

/// Fetches one page of summaries, newest first.
///
/// Nothing is returned unless every message on the page could be read, so a
/// failure never leaves half a page on screen.
pub fn fetch_page<M: Mailbox + ?Sized>(
    mailbox: &mut M,
    cfg: &Config,
    page: u32,
) -> Result<Vec<EmailSummary>> {
    let ids = mailbox.search_all()?;
    let Some(max_id) = ids.iter().copied().max() else {
        debug!("inbox is empty");
        return Ok(Vec::new());
    };
    let Some(bounds) = page_bounds(max_id, page, cfg.inbox_size) else {
        debug!("page {page} is past the end of the inbox (max id {max_id})");
        return Ok(Vec::new());
    };
    debug!(
        "page {page}: ids {}..={} of {max_id}",
        bounds.lowest + 1,
        bounds.highest
    );

    let mut out = Vec::with_capacity((bounds.highest - bounds.lowest) as usize);
    for (index, id) in (bounds.lowest + 1..=bounds.highest).rev().enumerate() {
        let Some(raw) = mailbox.fetch_rfc822(id)? else {
            warn!("message {id} came back without a body; skipping");
            continue;
        };
        out.push(summarize(index, id, &raw, cfg)?);
    }
    Ok(out)
}

fn summarize(index: usize, id: EmailId, raw: &[u8], cfg: &Config) -> Result<EmailSummary> {
    let tag = |e: Error| match e {
        Error::HeaderParse(msg) => Error::HeaderParse(format!("message {id}: {msg}")),
        other => other,
    };

    let fields = read_headers(raw).map_err(tag)?;
    let from = fields
        .from
        .ok_or_else(|| Error::HeaderParse(format!("message {id}: no From header")))?;
    let (name, address) = split_sender(&from, cfg.sender_delimiter).map_err(tag)?;

    Ok(EmailSummary {
        index,
        id,
        from_name: if name.is_empty() { address } else { name },
        subject: normalize_header(&fields.subject.unwrap_or_default(), SUBJECT_MAX_CHARS),
    })
}
