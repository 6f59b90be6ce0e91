//! The `setup`, `list` and `send` commands.
//!
//! Each command receives the loaded [`Config`] (or the store, for `setup`)
//! explicitly; nothing here keeps state between invocations.

use crossterm::style::Stylize;
use crossterm::tty::IsTty;
use log::{info, warn};
use std::io;
use std::path::Path;

use crate::config::{Config, ConfigStore, Settings};
use crate::domain::email::{Attachment, Draft, EmailSummary, OutboundMessage};
use crate::error::{Error, Result};
use crate::mail::compose::{build_message, compose};
use crate::mail::imap_client::{ImapClient, Mailbox, fetch_page};
use crate::mail::smtp_client::{Connector, SmtpClient, deliver};
use crate::prompt;
use crate::template::{HtmlTemplate, TemplateRenderer};

/// Asks for the account details and replaces the stored config.
pub fn setup(store: &ConfigStore) -> Result<Config> {
    let name = prompt::text("Name")?;
    let email = prompt::text("Email")?;
    let password = prompt::password("Password")?;
    let use_template = prompt::confirm("Use the HTML email template?", false)?;

    let mut settings = Settings::new(name.trim(), email.trim(), password);
    settings.use_template = use_template;
    if use_template {
        settings.job_title = prompt::optional_text("Job title (optional)")?;
        settings.company = prompt::optional_text("Company (optional)")?;
        settings.contact = prompt::optional_text("Contact (optional)")?;
    }

    let config = Config::from_settings(settings).map_err(|reason| Error::ConfigCorrupt {
        path: store.path().to_path_buf(),
        reason,
    })?;
    store.save(&config)?;

    println!(
        "\n\t{} {}",
        "Config saved to".green().bold(),
        store.path().display()
    );
    Ok(config)
}

/// Prints one page of the inbox, newest first.
pub fn list(cfg: &Config, page: u32) -> Result<()> {
    let client = ImapClient::from_config(cfg);
    let mut session = client.open_inbox(&cfg.email_id, &cfg.password)?;
    let summaries = fetch_page(&mut session, cfg, page)?;
    if let Err(e) = session.logout() {
        warn!("logout failed: {e}");
    }

    let styled = io::stdout().is_tty();
    for summary in &summaries {
        println!("{}", format_row(summary, cfg, styled));
    }
    Ok(())
}

/// `[index]\tsender\tsubject`, both columns padded to the configured widths.
pub fn format_row(summary: &EmailSummary, cfg: &Config, styled: bool) -> String {
    let from = format!("{:<width$}", summary.from_name, width = cfg.from_width);
    let subject = format!("{:<width$}", summary.subject, width = cfg.subject_width);
    let from = if styled {
        from.magenta().bold().to_string()
    } else {
        from
    };
    format!("[{}]\t{}\t{}", summary.index, from, subject)
}

/// Collects a message at the prompts and sends it once confirmed.
pub fn send(cfg: &Config, template_dir: &Path) -> Result<()> {
    let to = prompt::text("Recipient(s)")?;
    let subject = prompt::text("Subject")?;
    let text = prompt::text("Body")?;
    let attachment = if prompt::confirm("Attach a file?", false)? {
        let path = prompt::text("Attachment (path)")?;
        Some(Attachment::from_path(Path::new(path.trim()))?)
    } else {
        None
    };

    let draft = Draft {
        to,
        subject,
        text,
        attachment,
    };
    let renderer = if cfg.use_template {
        HtmlTemplate::load(template_dir)?
    } else {
        HtmlTemplate::builtin()
    };
    let connector = SmtpClient::from_config(cfg);

    match send_draft(cfg, draft, &renderer, &connector, |_| {
        prompt::confirm("Send it?", true)
    })? {
        SendOutcome::Sent => println!("\n\t{}", "Email Sent!".green().bold()),
        SendOutcome::Declined => println!("\n\t{}", "Email was not sent.".red().bold()),
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Declined,
}

/// Composes `draft`, asks `confirm`, and only then opens a connection.
pub fn send_draft<R, C, F>(
    cfg: &Config,
    draft: Draft,
    renderer: &R,
    connector: &C,
    confirm: F,
) -> Result<SendOutcome>
where
    R: TemplateRenderer + ?Sized,
    C: Connector + ?Sized,
    F: FnOnce(&OutboundMessage) -> Result<bool>,
{
    let outbound = compose(cfg, draft, renderer)?;
    let message = build_message(cfg, &outbound)?;

    if !confirm(&outbound)? {
        info!("send declined; nothing transmitted");
        return Ok(SendOutcome::Declined);
    }

    deliver(connector, &message)?;
    info!("sent '{}' to {}", outbound.subject, outbound.to);
    Ok(SendOutcome::Sent)
}
