//! Advanced-settings document codec.
//!
//! The document is an ordered JSON object. Only `inbounds` and `outbounds`
//! carry meaning for reconciliation; every other key is passed through.
//! Numbers keep their source text until a record builder coerces them, so an
//! integral `port` never comes back as `8080.0`.

pub mod entry;

pub use entry::{ConfigEntry, Field};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::ResourceKind;

/// Built-in template used when no template has been stored yet.
pub const DEFAULT_TEMPLATE: &str = include_str!("default_template.json");

/// Errors raised while decoding or encoding a document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Failed to parse JSON document: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Expected JSON object at document root, found {found}")]
    NotAnObject { found: &'static str },

    #[error("Failed to encode JSON document: {0}")]
    Encode(#[source] serde_json::Error),
}

/// An ordered mapping of top-level keys to arbitrary JSON values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDocument {
    root: Map<String, Value>,
}

impl ConfigDocument {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.root.insert(key.into(), value);
    }

    /// Entries of the given kind.
    ///
    /// A missing key or a non-array value yields no entries.
    pub fn entries(&self, kind: ResourceKind) -> &[Value] {
        match self.root.get(kind.entries_key()) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    /// Replace the entries of the given kind, keeping the key's position.
    pub fn set_entries(&mut self, kind: ResourceKind, entries: Vec<Value>) {
        self.root
            .insert(kind.entries_key().to_string(), Value::Array(entries));
    }

    /// Copy every top-level key of `other` over this document, except `skip`.
    ///
    /// Values from `other` win.
    pub fn overlay(&mut self, other: &ConfigDocument, skip: &[&str]) {
        for (key, value) in &other.root {
            if skip.contains(&key.as_str()) {
                continue;
            }
            self.root.insert(key.clone(), value.clone());
        }
    }
}

/// Decode document text.
///
/// Empty or whitespace-only input decodes to an empty document.
pub fn decode(text: &str) -> Result<ConfigDocument, DocumentError> {
    if text.trim().is_empty() {
        return Ok(ConfigDocument::new());
    }
    let value: Value = serde_json::from_str(text).map_err(DocumentError::Parse)?;
    match value {
        Value::Object(root) => Ok(ConfigDocument { root }),
        other => Err(DocumentError::NotAnObject {
            found: json_type_name(&other),
        }),
    }
}

/// Encode a document as pretty-printed JSON.
pub fn encode(document: &ConfigDocument) -> Result<String, DocumentError> {
    serde_json::to_string_pretty(&document.root).map_err(DocumentError::Encode)
}

/// The built-in default template.
pub fn default_template() -> Result<ConfigDocument, DocumentError> {
    decode(DEFAULT_TEMPLATE)
}

/// Content digest of a document, independent of object key order.
pub fn fingerprint(document: &ConfigDocument) -> String {
    let normalized = normalize_json(&Value::Object(document.root.clone()));
    let bytes = serde_json::to_vec(&normalized).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn normalize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            let mut normalized = Map::new();
            for key in keys {
                if let Some(child) = map.get(key) {
                    normalized.insert(key.clone(), normalize_json(child));
                }
            }
            Value::Object(normalized)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize_json).collect()),
        _ => value.clone(),
    }
}
