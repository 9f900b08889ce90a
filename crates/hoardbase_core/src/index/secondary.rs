//! Equality indexes over one field path.

use crate::catalog::MAX_NAME_LEN;
use crate::error::{CoreError, CoreResult};
use crate::query::resolve;
use crate::types::DocumentId;
use hoardbase_codec::{to_canonical_cbor, Document, Value, PATH_SEPARATOR};
use std::collections::{BTreeMap, BTreeSet};

/// The definition of a secondary index, as stored in the directory.
///
/// An index is named by its dotted field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Dotted path of the indexed field.
    pub path: String,
    /// Whether two documents may share a (non-null) value.
    pub unique: bool,
}

impl IndexSpec {
    /// Checks that `path` names a field.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty path, an empty segment, or a
    /// path longer than [`MAX_NAME_LEN`] bytes.
    pub fn new(path: &str, unique: bool) -> CoreResult<Self> {
        field_path(path)?;
        Ok(Self {
            path: path.to_string(),
            unique,
        })
    }
}

/// Splits a dotted field path into segments.
///
/// # Errors
///
/// Returns `Validation` for an empty path, an empty segment, or a path
/// longer than [`MAX_NAME_LEN`] bytes.
pub(crate) fn field_path(path: &str) -> CoreResult<Vec<String>> {
    if path.is_empty() || path.len() > MAX_NAME_LEN || path.split(PATH_SEPARATOR).any(str::is_empty) {
        return Err(CoreError::validation(format!("invalid field path {path:?}")));
    }
    Ok(path.split(PATH_SEPARATOR).map(str::to_string).collect())
}

/// What [`Collection::indexes`](crate::Collection::indexes) reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    /// Dotted path of the indexed field.
    pub path: String,
    /// Whether the index rejects duplicate values.
    pub unique: bool,
    /// Number of documents that have the field.
    pub entries: usize,
}

/// Maps the canonical encoding of a field value to the documents holding
/// it.
///
/// Documents without the field are not indexed. Equality follows the
/// query matcher: `1`, `1.0` and `"1"` are three different keys. A unique
/// index still admits any number of `Null` values.
#[derive(Debug, Clone)]
pub struct SecondaryIndex {
    spec: IndexSpec,
    path: Vec<String>,
    entries: BTreeMap<Vec<u8>, BTreeSet<DocumentId>>,
    keys: BTreeMap<DocumentId, Vec<u8>>,
}

impl SecondaryIndex {
    /// An empty index.
    #[must_use]
    pub fn new(spec: IndexSpec) -> Self {
        let path = spec.path.split(PATH_SEPARATOR).map(str::to_string).collect();
        Self {
            spec,
            path,
            entries: BTreeMap::new(),
            keys: BTreeMap::new(),
        }
    }

    /// The definition.
    #[must_use]
    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    /// Returns true if this index answers lookups on `path`.
    #[must_use]
    pub fn covers(&self, path: &[String]) -> bool {
        self.path == path
    }

    /// Another document that already holds `document`'s value, when the
    /// index is unique.
    #[must_use]
    pub fn conflict(&self, id: DocumentId, document: &Document) -> Option<DocumentId> {
        if !self.spec.unique {
            return None;
        }
        let value = resolve(document, &self.path)?;
        if *value == Value::Null {
            return None;
        }
        let key = key_of(value)?;
        self.entries
            .get(&key)?
            .iter()
            .copied()
            .find(|&other| other != id)
    }

    /// Indexes `document` under `id`, replacing what `id` had before.
    pub fn insert(&mut self, id: DocumentId, document: &Document) {
        self.remove(id);
        let Some(key) = resolve(document, &self.path).and_then(key_of) else {
            return;
        };
        self.entries.entry(key.clone()).or_default().insert(id);
        self.keys.insert(id, key);
    }

    /// Forgets `id`.
    pub fn remove(&mut self, id: DocumentId) {
        let Some(key) = self.keys.remove(&id) else {
            return;
        };
        if let Some(ids) = self.entries.get_mut(&key) {
            ids.remove(&id);
            if ids.is_empty() {
                self.entries.remove(&key);
            }
        }
    }

    /// Ids whose field equals `value`, ascending.
    #[must_use]
    pub fn lookup(&self, value: &Value) -> Vec<DocumentId> {
        key_of(value)
            .and_then(|key| self.entries.get(&key))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.keys.clear();
    }

    /// Number of indexed documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if no document is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Summary for callers.
    #[must_use]
    pub fn info(&self) -> IndexInfo {
        IndexInfo {
            path: self.spec.path.clone(),
            unique: self.spec.unique,
            entries: self.len(),
        }
    }
}

/// Stored values never hold NaN, so only a query literal can fail here,
/// and a NaN literal matches nothing.
pub(crate) fn key_of(value: &Value) -> Option<Vec<u8>> {
    to_canonical_cbor(value).ok()
}
