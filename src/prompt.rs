//! Interactive prompts for `setup` and `send`.

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Password};

use crate::error::{Error, Result};

fn failed(e: dialoguer::Error) -> Error {
    Error::Prompt(e.to_string())
}

pub fn text(label: &str) -> Result<String> {
    Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt(label)
        .interact_text()
        .map_err(failed)
}

/// Empty input comes back as `None`.
pub fn optional_text(label: &str) -> Result<Option<String>> {
    let value = Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt(label)
        .allow_empty(true)
        .interact_text()
        .map_err(failed)?;
    let value = value.trim();
    Ok((!value.is_empty()).then(|| value.to_string()))
}

pub fn password(label: &str) -> Result<String> {
    Password::with_theme(&ColorfulTheme::default())
        .with_prompt(label)
        .interact()
        .map_err(failed)
}

pub fn confirm(label: &str, default: bool) -> Result<bool> {
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(label)
        .default(default)
        .interact()
        .map_err(failed)
}
