//! Property-based test generators using proptest.
//!
//! Every generated document is storable: field names are non-empty and
//! dot-free, floats are never NaN and nesting stays shallow.

use hoardbase_codec::{Document, Value};
use proptest::prelude::*;

/// Strategy for generating valid field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_]{0,7}"
}

/// Strategy for generating valid collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9_]{0,31}"
}

/// Strategy for generating storable scalar values.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        any::<f64>()
            .prop_filter("NaN is not storable", |f| !f.is_nan())
            .prop_map(Value::Float),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(Value::Bytes),
        "\\PC{0,16}".prop_map(Value::Text),
    ]
}

/// Strategy for generating storable values, including nested arrays and
/// maps.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(field_name_strategy(), inner, 0..4)
                .prop_map(|fields| Value::Map(fields.into_iter().collect())),
        ]
    })
}

/// Strategy for generating storable documents.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::btree_map(field_name_strategy(), value_strategy(), 0..6)
        .prop_map(|fields| fields.into_iter().collect())
}

/// Strategy for generating merge patches.
///
/// Roughly a third of the fields are `Null` and therefore remove the
/// field they name.
pub fn patch_strategy() -> impl Strategy<Value = Document> {
    let field = prop_oneof![
        1 => Just(Value::Null),
        2 => value_strategy(),
    ];
    prop::collection::btree_map(field_name_strategy(), field, 0..4)
        .prop_map(|fields| fields.into_iter().collect())
}

/// One step of a generated workload.
///
/// `target` picks among the documents alive when the step runs, modulo
/// their count; steps that target nothing are skipped.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Insert a new document.
    Insert {
        /// Document to insert.
        data: Document,
    },
    /// Replace a document wholesale.
    Replace {
        /// Which live document.
        target: usize,
        /// Replacement document.
        data: Document,
    },
    /// Merge a patch into a document.
    Update {
        /// Which live document.
        target: usize,
        /// Merge patch.
        patch: Document,
    },
    /// Delete a document.
    Delete {
        /// Which live document.
        target: usize,
    },
}

/// Strategy for generating workload steps, weighted towards inserts.
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        4 => document_strategy().prop_map(|data| Operation::Insert { data }),
        1 => (any::<usize>(), document_strategy())
            .prop_map(|(target, data)| Operation::Replace { target, data }),
        2 => (any::<usize>(), patch_strategy())
            .prop_map(|(target, patch)| Operation::Update { target, patch }),
        2 => any::<usize>().prop_map(|target| Operation::Delete { target }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<Operation>> {
    prop::collection::vec(operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Few cases, for tests that touch the filesystem.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
