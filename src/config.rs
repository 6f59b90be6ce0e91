use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

const APP_DIR: &str = "mailsy";
const CONFIG_FILE: &str = "config.json";

/// Columns reserved for the index and the tab separators of a listing row.
pub const COLUMN_MARGIN: usize = 12;
pub const SUBJECT_MAX_CHARS: usize = 60;

pub const DEFAULT_INBOX_SIZE: u32 = 10;
pub const DEFAULT_COLUMNS: usize = 113;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const IMAP_HOST: &str = "imap.gmail.com";
pub const IMAP_PORT: u16 = 993;
pub const SMTP_HOST: &str = "smtp.gmail.com";
pub const SMTP_PORT: u16 = 587;

/// Splits a `From` header into display name and address.
pub const SENDER_DELIMITER: char = '<';

fn default_inbox_size() -> u32 {
    DEFAULT_INBOX_SIZE
}

fn default_columns() -> usize {
    DEFAULT_COLUMNS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// On-disk shape of `config.json`.
///
/// Only the credentials are required; everything else falls back to a
/// default so files written by older releases still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Settings {
    pub email_id: String,
    pub email_pass: String,
    #[serde(default = "default_inbox_size")]
    pub email_inbox_size: u32,
    #[serde(default = "default_columns")]
    pub columns: usize,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub use_template: bool,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Settings {
    /// Fresh settings for a new account, with default display preferences.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            email_id: email.into(),
            email_pass: password.into(),
            email_inbox_size: DEFAULT_INBOX_SIZE,
            columns: DEFAULT_COLUMNS,
            name: name.into(),
            use_template: false,
            job_title: None,
            company: None,
            contact: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Validated, derived view over [`Settings`] handed to every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub email_id: String,
    pub password: String,
    pub inbox_size: u32,
    pub columns: usize,
    pub from_width: usize,
    pub subject_width: usize,
    pub name: String,
    pub sender_delimiter: char,
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub timeout: Duration,
    pub use_template: bool,
    pub job_title: Option<String>,
    pub company: Option<String>,
    pub contact: Option<String>,
}

impl Config {
    /// Derives the display widths and fixed endpoints. The error string
    /// describes which stored value is out of range.
    pub fn from_settings(settings: Settings) -> std::result::Result<Self, String> {
        if settings.columns < COLUMN_MARGIN {
            return Err(format!(
                "COLUMNS must be at least {COLUMN_MARGIN}, got {}",
                settings.columns
            ));
        }
        if settings.email_inbox_size == 0 {
            return Err("EMAIL_INBOX_SIZE must be at least 1".to_string());
        }
        if settings.timeout_secs == 0 {
            return Err("TIMEOUT_SECS must be at least 1".to_string());
        }

        let usable = settings.columns - COLUMN_MARGIN;
        let from_width = usable / 4;
        let subject_width = usable - from_width;

        Ok(Self {
            email_id: settings.email_id,
            password: settings.email_pass,
            inbox_size: settings.email_inbox_size,
            columns: settings.columns,
            from_width,
            subject_width,
            name: settings.name,
            sender_delimiter: SENDER_DELIMITER,
            imap_host: IMAP_HOST.to_string(),
            imap_port: IMAP_PORT,
            smtp_host: SMTP_HOST.to_string(),
            smtp_port: SMTP_PORT,
            timeout: Duration::from_secs(settings.timeout_secs),
            use_template: settings.use_template,
            job_title: settings.job_title,
            company: settings.company,
            contact: settings.contact,
        })
    }

    pub fn to_settings(&self) -> Settings {
        Settings {
            email_id: self.email_id.clone(),
            email_pass: self.password.clone(),
            email_inbox_size: self.inbox_size,
            columns: self.columns,
            name: self.name.clone(),
            use_template: self.use_template,
            job_title: self.job_title.clone(),
            company: self.company.clone(),
            contact: self.contact.clone(),
            timeout_secs: self.timeout.as_secs(),
        }
    }
}

/// Reads and writes the single JSON config file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<platform config dir>/mailsy/config.json`
    pub fn default_location() -> Result<Self> {
        let dir = dirs::config_dir().ok_or(Error::NoConfigDir)?;
        Ok(Self::new(dir.join(APP_DIR).join(CONFIG_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the config file; user overrides such as
    /// `email.html` are looked up here too.
    pub fn dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    pub fn load(&self) -> Result<Config> {
        debug!("loading config from {}", self.path.display());
        let raw = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::ConfigNotFound(self.path.clone()));
            }
            Err(e) => return Err(self.corrupt(e)),
        };
        let settings: Settings = serde_json::from_str(&raw).map_err(|e| self.corrupt(e))?;
        Config::from_settings(settings).map_err(|reason| self.corrupt(reason))
    }

    /// Replaces the file as a whole: a sibling temp file is written first and
    /// then renamed over the target.
    pub fn save(&self, config: &Config) -> Result<()> {
        let dir = self.dir();
        // create_dir_all treats a directory that already exists (or appears
        // concurrently) as success.
        fs::create_dir_all(dir).map_err(|e| self.write_failed(e))?;

        let json = serde_json::to_string_pretty(&config.to_settings())
            .map_err(|e| self.write_failed(io::Error::other(e)))?;

        let tmp = self.path.with_extension("json.tmp");
        let written =
            write_private(&tmp, json.as_bytes()).and_then(|_| fs::rename(&tmp, &self.path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(self.write_failed(e));
        }

        debug!("saved config to {}", self.path.display());
        Ok(())
    }

    fn corrupt(&self, reason: impl ToString) -> Error {
        Error::ConfigCorrupt {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    fn write_failed(&self, source: io::Error) -> Error {
        Error::ConfigWrite {
            path: self.path.clone(),
            source,
        }
    }
}

/// Writes a file readable by the owner only; the file holds the account
/// password.
fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    // a stale temp file keeps its old mode through open
    restrict_permissions(&file)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(unix)]
fn restrict_permissions(file: &fs::File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &fs::File) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        let mut settings = Settings::new("Ada Lovelace", "ada@example.com", "app-token");
        settings.use_template = true;
        settings.job_title = Some("Analyst".to_string());
        settings.company = Some("Engines Ltd".to_string());
        settings.contact = Some("+44 20 0000".to_string());
        Config::from_settings(settings).unwrap()
    }

    #[test]
    fn widths_fill_columns_minus_margin() {
        for columns in COLUMN_MARGIN..400 {
            let mut settings = Settings::new("n", "e@example.com", "p");
            settings.columns = columns;
            let cfg = Config::from_settings(settings).unwrap();
            assert_eq!(cfg.from_width + cfg.subject_width + COLUMN_MARGIN, columns);
            assert_eq!(cfg.from_width, (columns - COLUMN_MARGIN) / 4);
        }
    }

    #[test]
    fn default_columns_match_classic_layout() {
        let cfg = Config::from_settings(Settings::new("n", "e@example.com", "p")).unwrap();
        assert_eq!(cfg.from_width, 25);
        assert_eq!(cfg.subject_width, 76);
        assert_eq!(cfg.imap_host, "imap.gmail.com");
        assert_eq!(cfg.smtp_port, 587);
    }

    #[test]
    fn rejects_columns_below_margin() {
        let mut settings = Settings::new("n", "e@example.com", "p");
        settings.columns = 5;
        assert!(Config::from_settings(settings).is_err());
    }

    #[test]
    fn rejects_zero_inbox_size() {
        let mut settings = Settings::new("n", "e@example.com", "p");
        settings.email_inbox_size = 0;
        assert!(Config::from_settings(settings).is_err());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("nested").join("config.json"));
        let cfg = sample();

        store.save(&cfg).unwrap();
        assert_eq!(store.load().unwrap(), cfg);
    }

    #[test]
    fn save_twice_overwrites_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        store.save(&sample()).unwrap();

        let replacement =
            Config::from_settings(Settings::new("Bob", "bob@example.com", "other")).unwrap();
        store.save(&replacement).unwrap();

        assert_eq!(store.load().unwrap(), replacement);
        assert!(!dir.path().join("config.json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_owner_only_even_over_stale_temp() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        let stale = dir.path().join("config.json.tmp");
        fs::write(&stale, "old").unwrap();
        fs::set_permissions(&stale, fs::Permissions::from_mode(0o644)).unwrap();

        store.save(&sample()).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!stale.exists());
    }

    #[test]
    fn failed_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // renaming a file over a non-empty directory fails
        let target = dir.path().join("config.json");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), "x").unwrap();

        let store = ConfigStore::new(&target);
        assert!(matches!(
            store.save(&sample()),
            Err(Error::ConfigWrite { .. })
        ));
        assert!(!dir.path().join("config.json.tmp").exists());
    }

    #[test]
    fn saved_file_uses_uppercase_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        store.save(&sample()).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        for key in [
            "EMAIL_ID",
            "EMAIL_PASS",
            "EMAIL_INBOX_SIZE",
            "COLUMNS",
            "NAME",
            "USE_TEMPLATE",
            "JOB_TITLE",
            "COMPANY",
            "CONTACT",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        assert!(matches!(store.load(), Err(Error::ConfigNotFound(_))));
    }

    #[test]
    fn garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        let store = ConfigStore::new(path);
        assert!(matches!(store.load(), Err(Error::ConfigCorrupt { .. })));
    }

    #[test]
    fn wrong_shape_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"EMAIL_ID": 42}"#).unwrap();
        let store = ConfigStore::new(path);
        assert!(matches!(store.load(), Err(Error::ConfigCorrupt { .. })));
    }

    #[test]
    fn legacy_four_key_file_loads_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "EMAIL_ID": "me@example.com",
                "EMAIL_PASS": "secret",
                "EMAIL_INBOX_SIZE": 10,
                "COLUMNS": 113
            }"#,
        )
        .unwrap();

        let cfg = ConfigStore::new(path).load().unwrap();
        assert_eq!(cfg.email_id, "me@example.com");
        assert!(!cfg.use_template);
        assert_eq!(cfg.name, "");
        assert_eq!(cfg.job_title, None);
        assert_eq!(cfg.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }
}
