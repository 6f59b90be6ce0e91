use lettre::{Address, Message};
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart};

use crate::config::Config;
use crate::domain::email::{Body, Draft, OutboundMessage};
use crate::error::{Error, Result};
use crate::template::{TemplatePayload, TemplateRenderer};

const ATTACHMENT_CONTENT_TYPE: &str = "application/octet-stream";
const PLAIN_ALTERNATIVE_WIDTH: usize = 78;

/// Turns what the user typed into a message body, rendering it through the
/// template when the account has templates enabled.
pub fn compose<R: TemplateRenderer + ?Sized>(
    cfg: &Config,
    draft: Draft,
    renderer: &R,
) -> Result<OutboundMessage> {
    let body = if cfg.use_template {
        let payload = TemplatePayload {
            name: cfg.name.clone(),
            from: cfg.email_id.clone(),
            to: draft.to.clone(),
            msg: draft.text,
            job_title: cfg.job_title.clone().unwrap_or_default(),
            company: cfg.company.clone().unwrap_or_default(),
            contact: cfg.contact.clone().unwrap_or_default(),
        };
        Body::Html(renderer.render(&payload)?)
    } else {
        Body::Plain(draft.text)
    };

    Ok(OutboundMessage {
        to: draft.to,
        subject: draft.subject,
        body,
        attachment: draft.attachment,
    })
}

enum MimeBody {
    Single(SinglePart),
    Alternative(MultiPart),
}

/// Builds the MIME message. Recipients may be comma separated.
pub fn build_message(cfg: &Config, outbound: &OutboundMessage) -> Result<Message> {
    let sender = cfg
        .email_id
        .parse::<Address>()
        .map_err(|e| Error::SendFailed(format!("invalid sender address {}: {e}", cfg.email_id)))?;
    let display_name = Some(cfg.name.clone()).filter(|n| !n.trim().is_empty());

    let mut builder = Message::builder()
        .from(Mailbox::new(display_name, sender))
        .subject(outbound.subject.as_str());

    let mut recipients = 0;
    for addr in outbound.to.split(',').map(str::trim).filter(|a| !a.is_empty()) {
        let mailbox = addr.parse::<Mailbox>().map_err(|e| Error::RecipientRejected {
            recipient: addr.to_string(),
            reason: format!("{e}"),
        })?;
        builder = builder.to(mailbox);
        recipients += 1;
    }
    if recipients == 0 {
        return Err(Error::RecipientRejected {
            recipient: outbound.to.clone(),
            reason: "no recipient address given".to_string(),
        });
    }

    let body = match &outbound.body {
        Body::Plain(text) => MimeBody::Single(SinglePart::plain(text.clone())),
        Body::Html(html) => MimeBody::Alternative(MultiPart::alternative_plain_html(
            plain_alternative(html)?,
            html.clone(),
        )),
    };

    let built = match (&outbound.attachment, body) {
        (None, MimeBody::Single(part)) => builder.singlepart(part),
        (None, MimeBody::Alternative(alt)) => builder.multipart(alt),
        (Some(attachment), body) => {
            let content_type = ContentType::parse(ATTACHMENT_CONTENT_TYPE)
                .map_err(|e| Error::SendFailed(e.to_string()))?;
            let file = MimeAttachment::new(attachment.filename.clone())
                .body(attachment.data.clone(), content_type);
            let mixed = match body {
                MimeBody::Single(part) => MultiPart::mixed().singlepart(part),
                MimeBody::Alternative(alt) => MultiPart::mixed().multipart(alt),
            };
            builder.multipart(mixed.singlepart(file))
        }
    };

    built.map_err(|e| Error::SendFailed(e.to_string()))
}

fn plain_alternative(html: &str) -> Result<String> {
    html2text::from_read(html.as_bytes(), PLAIN_ALTERNATIVE_WIDTH)
        .map_err(|e| Error::Template(e.to_string()))
}
