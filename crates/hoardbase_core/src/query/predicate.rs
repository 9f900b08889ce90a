use hoardbase_codec::{Document, Value, PATH_SEPARATOR};

/// One field path and the value it must equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    path: Vec<String>,
    value: Value,
}

impl Condition {
    /// Path segments from the document root.
    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// The literal the field must equal.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// A conjunction of field equalities.
///
/// The empty predicate matches every document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    /// The predicate that matches everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Builds a predicate from a query document.
    ///
    /// An empty nested map is kept as a literal and only matches an empty
    /// map.
    #[must_use]
    pub fn from_document(query: &Document) -> Self {
        let mut conditions = Vec::new();
        flatten(query, &[], &mut conditions);
        Self { conditions }
    }

    /// Adds the condition `path == value`.
    #[must_use]
    pub fn and_eq(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            path: split_path(&[], path),
            value: value.into(),
        });
        self
    }

    /// The conditions, all of which must hold.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Returns true if this predicate matches everything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluates the predicate against a document.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        super::matches(document, self)
    }
}

fn split_path(prefix: &[String], key: &str) -> Vec<String> {
    prefix
        .iter()
        .cloned()
        .chain(key.split(PATH_SEPARATOR).map(str::to_string))
        .collect()
}

fn flatten(query: &Document, prefix: &[String], out: &mut Vec<Condition>) {
    for (key, value) in query {
        let path = split_path(prefix, key);
        match value {
            Value::Map(nested) if !nested.is_empty() => flatten(nested, &path, out),
            _ => out.push(Condition {
                path,
                value: value.clone(),
            }),
        }
    }
}

impl From<Document> for Predicate {
    fn from(query: Document) -> Self {
        Self::from_document(&query)
    }
}

impl From<&Document> for Predicate {
    fn from(query: &Document) -> Self {
        Self::from_document(query)
    }
}
