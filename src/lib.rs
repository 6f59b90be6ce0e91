//! Personal command-line email client: one account, a paged inbox listing
//! over IMAP and plain or templated mail over SMTP.

pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod mail;
pub mod prompt;
pub mod template;

pub use error::{Error, Result};
