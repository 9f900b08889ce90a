//! Ordered field maps.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::collections::btree_map::{self, BTreeMap};

/// Separator between the segments of a field path (`"address.city"`).
pub const PATH_SEPARATOR: char = '.';

/// Maximum nesting depth of a stored document.
pub const MAX_DEPTH: usize = 64;

/// An ordered map from field names to values.
///
/// Fields are kept sorted by name, so two documents holding the same
/// fields compare equal and encode to the same bytes regardless of the
/// order they were built in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a field, returning the previous value if there was one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    /// Returns the value of a top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Resolves a dotted field path by descending into nested maps.
    ///
    /// Returns `None` as soon as a segment is missing or a non-map value is
    /// reached before the last segment.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split(PATH_SEPARATOR);
        let first = segments.next()?;
        let mut current = self.fields.get(first)?;
        for segment in segments {
            current = current.as_document()?.fields.get(segment)?;
        }
        Some(current)
    }

    /// Removes a field, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Returns true if the document has the given top-level field.
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Number of top-level fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over fields in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.fields.iter()
    }

    /// Iterates over field names in order.
    pub fn keys(&self) -> btree_map::Keys<'_, String, Value> {
        self.fields.keys()
    }

    /// Applies a merge patch (RFC 7386) to this document.
    ///
    /// A `Null` in the patch removes the field, a nested map merges into the
    /// existing nested map (replacing any non-map value), and every other
    /// value overwrites the field.
    pub fn merge_patch(&mut self, patch: &Document) {
        for (key, value) in patch.iter() {
            match value {
                Value::Null => {
                    self.fields.remove(key);
                }
                Value::Map(nested) => match self.fields.get_mut(key) {
                    Some(Value::Map(existing)) => existing.merge_patch(nested),
                    _ => {
                        let mut fresh = Document::new();
                        fresh.merge_patch(nested);
                        self.fields.insert(key.clone(), Value::Map(fresh));
                    }
                },
                other => {
                    self.fields.insert(key.clone(), other.clone());
                }
            }
        }
    }

    /// Checks that the document can be stored.
    ///
    /// Field names must be non-empty and must not contain
    /// [`PATH_SEPARATOR`], floats must not be NaN, and nesting must not
    /// exceed [`MAX_DEPTH`].
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidDocument`], [`CodecError::NaNForbidden`]
    /// or [`CodecError::TooDeep`].
    pub fn validate(&self) -> CodecResult<()> {
        if self.depth() > MAX_DEPTH {
            return Err(CodecError::TooDeep { max: MAX_DEPTH });
        }
        self.validate_fields()
    }

    fn validate_fields(&self) -> CodecResult<()> {
        for (key, value) in &self.fields {
            if key.is_empty() {
                return Err(CodecError::invalid_document("empty field name"));
            }
            if key.contains(PATH_SEPARATOR) {
                return Err(CodecError::invalid_document(format!(
                    "field name {key:?} contains '{PATH_SEPARATOR}'"
                )));
            }
            validate_value(value)?;
        }
        Ok(())
    }

    /// Nesting depth: an empty or flat document has depth 1.
    pub(crate) fn depth(&self) -> usize {
        1 + self.fields.values().map(Value::depth).max().unwrap_or(0)
    }
}

fn validate_value(value: &Value) -> CodecResult<()> {
    match value {
        Value::Float(f) if f.is_nan() => Err(CodecError::NaNForbidden),
        Value::Array(items) => items.iter().try_for_each(validate_value),
        Value::Map(document) => document.validate_fields(),
        _ => Ok(()),
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// Builds a [`Document`] from `key => value` pairs.
///
/// ```
/// use hoardbase_codec::doc;
///
/// let person = doc! { "name" => "Ada", "address" => doc! { "city" => "London" } };
/// assert_eq!(person.get_path("address.city").and_then(|v| v.as_text()), Some("London"));
/// ```
#[macro_export]
macro_rules! doc {
    () => {
        $crate::Document::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut document = $crate::Document::new();
        $(
            document.insert($key, $value);
        )+
        document
    }};
}
