use std::path::PathBuf;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while configuring, listing or sending.
///
/// Each variant carries its own user-facing message; the binary prints it
/// as-is and exits non-zero.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no platform config directory available; pass --config <PATH>")]
    NoConfigDir,

    #[error("config file not found at {}; run `mailsy setup` first", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("config file {} is corrupt: {reason}", .path.display())]
    ConfigCorrupt { path: PathBuf, reason: String },

    #[error("could not write config file {}: {source}", .path.display())]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    #[error("recipient {recipient} was rejected: {reason}")]
    RecipientRejected { recipient: String, reason: String },

    #[error("there was a problem sending your mail: {0}")]
    SendFailed(String),

    #[error("can not find attachment {}", .0.display())]
    AttachmentNotFound(PathBuf),

    #[error("could not parse header: {0}")]
    HeaderParse(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("prompt failed: {0}")]
    Prompt(String),
}

impl Error {
    pub(crate) fn connection(host: &str, reason: impl ToString) -> Self {
        Self::Connection {
            host: host.to_string(),
            reason: reason.to_string(),
        }
    }
}
