//! `OpenAPI` document discovery.
//!
//! A spec directory holds one document per service, either flat (`twilio_api_v2010.yaml`) or
//! nested one level per service (`messaging/openapi.yaml`).

use crate::error::{OpenApiToolsError, Result};
use crate::resolver::{Dereferencer, parse_document};
use crate::compiler::first_server_url;
use futures::future::try_join_all;
use regex::Regex;
use reqwest::Client;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};

const SPEC_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

// Stems that say nothing about the service; the enclosing directory names it instead.
const GENERIC_STEMS: &[&str] = &["openapi", "swagger", "spec", "index"];

static SEGMENTED_SERVICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9]+)_([A-Za-z0-9_]+?)_(v\d+[A-Za-z0-9]*)$")
        .expect("service pattern is valid")
});

/// `prefix_name_version` split of a service identifier, e.g. `twilio_api_v2010`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSegments {
    pub prefix: String,
    pub name: String,
    pub version: String,
}

impl ServiceSegments {
    /// Returns `None` when the identifier does not follow the convention.
    #[must_use]
    pub fn parse(service: &str) -> Option<Self> {
        let caps = SEGMENTED_SERVICE.captures(service)?;
        Some(Self {
            prefix: caps[1].to_string(),
            name: caps[2].to_string(),
            version: caps[3].to_string(),
        })
    }
}

/// One loaded, fully dereferenced `OpenAPI` document.
///
/// The document is kept as a raw tree. Path items, operations and parameters are read one at a
/// time during compilation, so a malformed piece only costs that piece.
#[derive(Debug, Clone)]
pub struct SpecRecord {
    /// Service identifier, e.g. `twilio_api_v2010`.
    pub service: String,
    /// Canonical name, e.g. `TwilioApiV2010`. Prefixes every tool key of this service.
    pub name: String,
    pub segments: Option<ServiceSegments>,
    pub path: PathBuf,
    pub document: Value,
}

impl SpecRecord {
    #[must_use]
    pub fn new(service: impl Into<String>, path: impl Into<PathBuf>, document: Value) -> Self {
        let service = service.into();
        Self {
            name: canonical_name(&service),
            segments: ServiceSegments::parse(&service),
            service,
            path: path.into(),
            document,
        }
    }

    /// `info.title`, or the canonical name when the document has none.
    #[must_use]
    pub fn title(&self) -> &str {
        self.document
            .pointer("/info/title")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.name)
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.document.pointer("/info/description").and_then(Value::as_str)
    }

    /// Document-level `servers[0].url`.
    #[must_use]
    pub fn server_url(&self) -> Option<&str> {
        self.document.as_object().and_then(first_server_url)
    }

    /// The `paths` mapping. `None` when the document declares none.
    #[must_use]
    pub fn paths(&self) -> Option<&Map<String, Value>> {
        self.document.get("paths").and_then(Value::as_object)
    }
}

/// `twilio_api_v2010` -> `TwilioApiV2010`.
#[must_use]
pub fn canonical_name(service: &str) -> String {
    service
        .split(['_', '-', '.'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect()
}

/// Loads every `OpenAPI` document under a root directory.
#[derive(Debug, Clone)]
pub struct SpecRepository {
    root: PathBuf,
    client: Client,
}

impl SpecRepository {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            client: Client::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan the root directory depth-first and load every `.yaml`/`.yml`/`.json` file.
    ///
    /// Subdirectories are visited one at a time; the files of one directory are loaded
    /// concurrently. Other files are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::FileSystem`] if a directory or file cannot be read, and
    /// [`OpenApiToolsError::Parse`]/[`OpenApiToolsError::Reference`] if a document is invalid.
    pub async fn load(&self) -> Result<Vec<SpecRecord>> {
        let mut records = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let (files, mut subdirs) = self.list_dir(&dir).await?;
            debug!(dir = %dir.display(), files = files.len(), "Scanning spec directory");

            let loaded = try_join_all(files.iter().map(|f| self.load_file(f))).await?;
            records.extend(loaded);

            // Reverse so that the stack pops subdirectories in name order.
            subdirs.reverse();
            pending.extend(subdirs);
        }

        info!(root = %self.root.display(), specs = records.len(), "Loaded OpenAPI specs");
        Ok(records)
    }

    async fn list_dir(&self, dir: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
        let fs_err = |source| OpenApiToolsError::FileSystem {
            path: dir.to_path_buf(),
            source,
        };

        let mut entries = tokio::fs::read_dir(dir).await.map_err(fs_err)?;
        let mut files = Vec::new();
        let mut subdirs = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(fs_err)? {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(fs_err)?;
            if file_type.is_dir() {
                subdirs.push(path);
            } else if is_spec_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        subdirs.sort();
        Ok((files, subdirs))
    }

    async fn load_file(&self, path: &Path) -> Result<SpecRecord> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| OpenApiToolsError::FileSystem {
                path: path.to_path_buf(),
                source,
            })?;

        let raw = parse_document(&content)
            .map_err(|e| OpenApiToolsError::parse(path.display(), e))?;
        let dereferenced = Dereferencer::new(self.client.clone())
            .dereference_file(path, raw)
            .await?;
        check_document(&dereferenced).map_err(|e| OpenApiToolsError::parse(path.display(), e))?;

        let service = self.service_id(path);
        debug!(service = %service, path = %path.display(), "Loaded OpenAPI document");
        Ok(SpecRecord::new(service, path, dereferenced))
    }

    fn service_id(&self, path: &Path) -> String {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if GENERIC_STEMS.contains(&stem.to_ascii_lowercase().as_str())
            && let Some(dir) = path
                .strip_prefix(&self.root)
                .ok()
                .and_then(|rel| rel.components().next())
                .filter(|_| path.parent() != Some(self.root.as_path()))
        {
            return dir.as_os_str().to_string_lossy().into_owned();
        }
        stem
    }
}

/// Load every spec under `root`. See [`SpecRepository::load`].
///
/// # Errors
///
/// See [`SpecRepository::load`].
pub async fn load_specs(root: impl Into<PathBuf>) -> Result<Vec<SpecRecord>> {
    SpecRepository::new(root).load().await
}

/// Only the document root is checked here; everything below it degrades per item at compile time.
fn check_document(document: &Value) -> std::result::Result<(), &'static str> {
    let root = document.as_object().ok_or("document root is not a mapping")?;
    match root.get("openapi") {
        Some(Value::String(_) | Value::Number(_)) => Ok(()),
        _ => Err("missing `openapi` version field"),
    }
}

fn is_spec_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SPEC_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}
