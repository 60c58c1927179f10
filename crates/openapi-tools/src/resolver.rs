//! `OpenAPI` `$ref` dereferencer.
//!
//! Documents are dereferenced as raw JSON trees before compilation, so that the compiler only
//! ever sees inline structures.
//!
//! Supported references:
//! - Local refs (`#/...`)
//! - File refs (`./common.yaml#/...`, `/abs/path/spec.yaml#/...`, `file:///...#/...`)
//! - URL refs (`https://example.com/common.yaml#/...`)
//!
//! `$ref` resolution is relative to the document that contains the `$ref`. A reference that
//! points back into its own expansion (a recursive schema) is left in place as `{"$ref": ...}`.

use crate::error::{OpenApiToolsError, Result};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use reqwest::Client;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocId {
    Url(Url),
    File(PathBuf),
}

impl DocId {
    fn display(&self) -> String {
        match self {
            DocId::Url(u) => u.to_string(),
            DocId::File(p) => p.display().to_string(),
        }
    }
}

fn strip_fragment(mut url: Url) -> Url {
    url.set_fragment(None);
    url
}

fn canonicalize_best_effort(path: PathBuf) -> PathBuf {
    std::fs::canonicalize(&path).unwrap_or(path)
}

/// Fully inlines `$ref`s for one root document and everything it references.
#[derive(Debug)]
pub struct Dereferencer {
    client: Client,
    docs: RwLock<HashMap<DocId, Arc<Value>>>,
    // Expansions that hit no cycle do not depend on the expansion stack and can be reused.
    expanded: RwLock<HashMap<String, Value>>,
}

struct Expansion {
    value: Value,
    acyclic: bool,
}

impl Dereferencer {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            docs: RwLock::new(HashMap::new()),
            expanded: RwLock::new(HashMap::new()),
        }
    }

    /// Dereference the document at `path`, whose already-parsed content is `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if a reference is malformed, points at a missing JSON pointer, or names
    /// a document that cannot be loaded/parsed.
    pub async fn dereference_file(&self, path: &Path, root: Value) -> Result<Value> {
        let doc = DocId::File(canonicalize_best_effort(path.to_path_buf()));
        self.docs.write().insert(doc.clone(), Arc::new(root.clone()));
        let expansion = self.expand(doc, root, Vec::new()).await?;
        Ok(expansion.value)
    }

    fn expand(
        &self,
        doc: DocId,
        value: Value,
        stack: Vec<String>,
    ) -> BoxFuture<'_, Result<Expansion>> {
        Box::pin(async move {
            match value {
                Value::Object(map) => match map.get("$ref").and_then(Value::as_str) {
                    Some(reference) => {
                        let reference = reference.to_string();
                        self.expand_ref(doc, reference, map, stack).await
                    }
                    None => {
                        let mut out = Map::new();
                        let mut acyclic = true;
                        for (k, v) in map {
                            let child = self.expand(doc.clone(), v, stack.clone()).await?;
                            acyclic &= child.acyclic;
                            out.insert(k, child.value);
                        }
                        Ok(Expansion {
                            value: Value::Object(out),
                            acyclic,
                        })
                    }
                },
                Value::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    let mut acyclic = true;
                    for v in items {
                        let child = self.expand(doc.clone(), v, stack.clone()).await?;
                        acyclic &= child.acyclic;
                        out.push(child.value);
                    }
                    Ok(Expansion {
                        value: Value::Array(out),
                        acyclic,
                    })
                }
                scalar => Ok(Expansion {
                    value: scalar,
                    acyclic: true,
                }),
            }
        })
    }

    async fn expand_ref(
        &self,
        doc: DocId,
        reference: String,
        mut siblings: Map<String, Value>,
        mut stack: Vec<String>,
    ) -> Result<Expansion> {
        let key = Self::canonical_ref_key(&doc, &reference)?;
        if stack.contains(&key) {
            siblings.clear();
            siblings.insert("$ref".to_string(), Value::String(reference));
            return Ok(Expansion {
                value: Value::Object(siblings),
                acyclic: false,
            });
        }

        let cached = self.expanded.read().get(&key).cloned();
        let mut expansion = match cached {
            Some(value) => Expansion {
                value,
                acyclic: true,
            },
            None => {
                let (target_doc, target) = self.resolve_ref_value(&doc, &reference).await?;
                stack.push(key.clone());
                let expansion = self.expand(target_doc, target, stack).await?;
                if expansion.acyclic {
                    self.expanded.write().insert(key, expansion.value.clone());
                }
                expansion
            }
        };

        // `$ref` siblings (e.g. a local `description`) are kept where the target has no value.
        siblings.remove("$ref");
        if let Value::Object(target) = &mut expansion.value {
            for (k, v) in siblings {
                target.entry(k).or_insert(v);
            }
        }
        Ok(expansion)
    }

    async fn resolve_ref_value(
        &self,
        current_doc: &DocId,
        reference: &str,
    ) -> Result<(DocId, Value)> {
        let (target_doc, pointer) = Self::parse_ref(current_doc, reference)?;
        let doc_value = self.load_doc(&target_doc).await?;

        let selected = if let Some(ptr) = pointer {
            doc_value.pointer(&ptr).cloned().ok_or_else(|| {
                OpenApiToolsError::Reference(format!(
                    "'{}' (doc {}, missing pointer '{}')",
                    reference,
                    target_doc.display(),
                    ptr
                ))
            })?
        } else {
            (*doc_value).clone()
        };

        Ok((target_doc, selected))
    }

    fn parse_ref(current_doc: &DocId, reference: &str) -> Result<(DocId, Option<String>)> {
        let (doc_part, frag_part) = match reference.split_once('#') {
            Some((d, f)) => (d, Some(f)),
            None => (reference, None),
        };

        let target_doc = Self::resolve_doc(current_doc, doc_part)?;

        let ptr = match frag_part {
            Some("") | None => None,
            Some(frag) if frag.starts_with('/') => Some(frag.to_string()),
            Some(_) => {
                return Err(OpenApiToolsError::Reference(format!(
                    "'{reference}' (expected JSON pointer starting with '/')",
                )));
            }
        };

        Ok((target_doc, ptr))
    }

    fn resolve_doc(current_doc: &DocId, doc_part: &str) -> Result<DocId> {
        if doc_part.is_empty() {
            return Ok(current_doc.clone());
        }

        if doc_part.starts_with("http://") || doc_part.starts_with("https://") {
            let url = Url::parse(doc_part)
                .map_err(|e| OpenApiToolsError::Reference(format!("bad URL '{doc_part}': {e}")))?;
            return Ok(DocId::Url(strip_fragment(url)));
        }

        if doc_part.starts_with("file://") {
            let url = Url::parse(doc_part).map_err(|e| {
                OpenApiToolsError::Reference(format!("bad file URL '{doc_part}': {e}"))
            })?;
            let path = url.to_file_path().map_err(|()| {
                OpenApiToolsError::Reference(format!("bad file URL (not a path): {doc_part}"))
            })?;
            return Ok(DocId::File(canonicalize_best_effort(path)));
        }

        match current_doc {
            DocId::Url(base) => {
                let joined = base.join(doc_part).map_err(|e| {
                    OpenApiToolsError::Reference(format!(
                        "cannot resolve '{doc_part}' against base {base}: {e}",
                    ))
                })?;
                Ok(DocId::Url(strip_fragment(joined)))
            }
            DocId::File(base) => {
                let resolved = if Path::new(doc_part).is_absolute() {
                    PathBuf::from(doc_part)
                } else {
                    base.parent()
                        .unwrap_or_else(|| Path::new("."))
                        .join(doc_part)
                };
                Ok(DocId::File(canonicalize_best_effort(resolved)))
            }
        }
    }

    fn canonical_ref_key(current_doc: &DocId, reference: &str) -> Result<String> {
        let (target_doc, pointer) = Self::parse_ref(current_doc, reference)?;
        let mut key = match &target_doc {
            DocId::Url(u) => format!("url:{u}"),
            DocId::File(p) => format!("file:{}", p.display()),
        };
        if let Some(ptr) = pointer {
            key.push('#');
            key.push_str(&ptr);
        }
        Ok(key)
    }

    async fn load_doc(&self, doc: &DocId) -> Result<Arc<Value>> {
        if let Some(v) = self.docs.read().get(doc).cloned() {
            return Ok(v);
        }

        let content = match doc {
            DocId::File(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| OpenApiToolsError::FileSystem {
                        path: path.clone(),
                        source,
                    })?
            }
            DocId::Url(url) => self
                .client
                .get(url.clone())
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| OpenApiToolsError::Reference(format!("failed to fetch {url}: {e}")))?
                .text()
                .await
                .map_err(|e| OpenApiToolsError::Reference(format!("failed to read {url}: {e}")))?,
        };

        let parsed =
            parse_document(&content).map_err(|e| OpenApiToolsError::parse(doc.display(), e))?;

        let parsed = Arc::new(parsed);
        self.docs.write().insert(doc.clone(), Arc::clone(&parsed));
        Ok(parsed)
    }
}

/// Parse JSON, falling back to YAML.
pub(crate) fn parse_document(content: &str) -> std::result::Result<Value, serde_yaml::Error> {
    serde_json::from_str(content).or_else(|_| serde_yaml::from_str(content))
}
