//! Account credentials and where they are persisted between runs.

use crate::error::{Result, ServerError};
use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub account_sid: String,
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account_sid", &self.account_sid)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

pub trait CredentialStore {
    /// `None` when nothing has been stored yet.
    fn get_credentials(&self) -> Result<Option<Credentials>>;

    fn set_credentials(&self, credentials: &Credentials) -> Result<()>;
}

/// Credentials kept as pretty JSON in a single file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$XDG_CONFIG_HOME/oapi-mcp/credentials.json`, falling back to `$HOME/.config`.
    pub fn open_default() -> Result<Self> {
        default_credentials_path()
            .map(Self::new)
            .map_err(|e| ServerError::Credentials(format!("{e:#}")))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn get_credentials(&self) -> Result<Option<Credentials>> {
        load_credentials(&self.path).map_err(|e| ServerError::Credentials(format!("{e:#}")))
    }

    fn set_credentials(&self, credentials: &Credentials) -> Result<()> {
        save_credentials(&self.path, credentials)
            .map_err(|e| ServerError::Credentials(format!("{e:#}")))
    }
}

fn default_credentials_path() -> anyhow::Result<PathBuf> {
    let base = if let Ok(v) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(v)
    } else {
        let home = std::env::var("HOME").context("HOME is not set")?;
        PathBuf::from(home).join(".config")
    };
    Ok(base.join("oapi-mcp").join("credentials.json"))
}

fn load_credentials(path: &Path) -> anyhow::Result<Option<Credentials>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("read credentials {}", path.display())),
    };
    let credentials =
        serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(credentials))
}

fn save_credentials(path: &Path, credentials: &Credentials) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create dir {}", parent.display()))?;
    }
    let bytes = serde_json::to_vec_pretty(credentials).context("serialize credentials as json")?;
    let mut file = owner_only(OpenOptions::new().write(true).create(true).truncate(true))
        .open(path)
        .with_context(|| format!("open credentials {}", path.display()))?;
    file.write_all(&bytes)
        .with_context(|| format!("write credentials {}", path.display()))?;
    Ok(())
}

/// New credential files are readable by their owner only.
#[cfg(unix)]
fn owner_only(options: &mut OpenOptions) -> &mut OpenOptions {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(0o600)
}

#[cfg(not(unix))]
fn owner_only(options: &mut OpenOptions) -> &mut OpenOptions {
    options
}
