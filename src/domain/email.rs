use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

pub type EmailId = u32;

/// One row of an inbox page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSummary {
    /// Position within the page, 0 = newest.
    pub index: usize,
    pub id: EmailId,
    pub from_name: String,
    pub subject: String,
}

/// What the user typed at the `send` prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Plain(String),
    Html(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
}

impl Attachment {
    /// Reads the whole file into memory, keeping its file name.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::AttachmentNotFound(path.to_path_buf()));
        }
        let data = fs::read(path).map_err(|_| Error::AttachmentNotFound(path.to_path_buf()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        Ok(Self { filename, data })
    }
}

/// A fully composed message, ready to be turned into MIME.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub body: Body,
    pub attachment: Option<Attachment>,
}
