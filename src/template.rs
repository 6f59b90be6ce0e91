//! HTML rendering for templated mail.
//!
//! Templates are plain HTML with `{{ key }}` placeholders. Every value is
//! HTML-escaped before substitution; newlines in the message become `<br>`.
//! `{% if key %}...{% endif %}` keeps its contents only when `key` is
//! non-empty. Sections do not nest.

use log::debug;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

const BUILTIN_TEMPLATE: &str = include_str!("../templates/email.html");

/// File name of a user template that overrides the built-in one.
pub const TEMPLATE_FILE: &str = "email.html";

/// The flat key/value payload handed to a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplatePayload {
    pub name: String,
    pub from: String,
    pub to: String,
    pub msg: String,
    pub job_title: String,
    pub company: String,
    pub contact: String,
}

impl TemplatePayload {
    fn lookup(&self, key: &str) -> Option<String> {
        let value = match key {
            "name" => &self.name,
            "from" => &self.from,
            "to" => &self.to,
            "msg" => return Some(escape_html(&self.msg).replace('\n', "<br>\n")),
            "job_title" => &self.job_title,
            "company" => &self.company,
            "contact" => &self.contact,
            _ => return None,
        };
        Some(escape_html(value))
    }
}

pub trait TemplateRenderer {
    fn render(&self, payload: &TemplatePayload) -> Result<String>;
}

pub struct HtmlTemplate {
    source: String,
}

impl HtmlTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn builtin() -> Self {
        Self::new(BUILTIN_TEMPLATE)
    }

    /// Uses `<dir>/email.html` when present, the built-in template otherwise.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(TEMPLATE_FILE);
        if !path.is_file() {
            return Ok(Self::builtin());
        }
        debug!("using template {}", path.display());
        let source = fs::read_to_string(&path)
            .map_err(|e| Error::Template(format!("{}: {e}", path.display())))?;
        Ok(Self::new(source))
    }
}

impl TemplateRenderer for HtmlTemplate {
    fn render(&self, payload: &TemplatePayload) -> Result<String> {
        render_source(&self.source, payload)
    }
}

fn value_of(payload: &TemplatePayload, key: &str) -> Result<String> {
    payload
        .lookup(key)
        .ok_or_else(|| Error::Template(format!("unknown placeholder '{key}'")))
}

/// Splits `s` just after `open` at the matching `close`, returning the
/// trimmed tag and what follows it.
fn take_tag<'a>(s: &'a str, open: &str, close: &str) -> Result<(&'a str, &'a str)> {
    let end = s
        .find(close)
        .ok_or_else(|| Error::Template(format!("unterminated '{open}' tag")))?;
    Ok((s[..end].trim(), &s[end + close.len()..]))
}

fn render_source(source: &str, payload: &TemplatePayload) -> Result<String> {
    let mut out = String::with_capacity(source.len() + payload.msg.len());
    let mut rest = source;

    loop {
        let next = [rest.find("{{"), rest.find("{%")].into_iter().flatten().min();
        let Some(start) = next else { break };
        out.push_str(&rest[..start]);

        if rest[start..].starts_with("{{") {
            let (key, after) = take_tag(&rest[start + 2..], "{{", "}}")?;
            out.push_str(&value_of(payload, key)?);
            rest = after;
            continue;
        }

        let (tag, after) = take_tag(&rest[start + 2..], "{%", "%}")?;
        let Some(key) = tag.strip_prefix("if ").map(str::trim) else {
            return Err(Error::Template(format!("unexpected tag '{{% {tag} %}}'")));
        };
        let close = after
            .find("{%")
            .ok_or_else(|| Error::Template(format!("'if {key}' has no endif")))?;
        let (end_tag, tail) = take_tag(&after[close + 2..], "{%", "%}")?;
        if end_tag != "endif" {
            return Err(Error::Template(format!(
                "expected endif after 'if {key}', found '{end_tag}'"
            )));
        }
        if !value_of(payload, key)?.trim().is_empty() {
            out.push_str(&render_source(&after[..close], payload)?);
        }
        rest = tail;
    }
    out.push_str(rest);
    Ok(out)
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
