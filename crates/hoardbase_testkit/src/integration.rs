//! Cross-crate integration test helpers.
//!
//! [`IntegrationHarness`] drives a collection with generated
//! [`Operation`]s while keeping an in-memory model of what it should
//! contain, then checks the two agree.

use crate::fixtures::TestDatabase;
use crate::generators::Operation;
use hoardbase_codec::{doc, encode_document, fingerprint, Document};
use hoardbase_core::{Collection, DocumentId, Predicate, Timestamp};
use std::collections::BTreeMap;

/// Name of the collection the harness works on.
pub const HARNESS_COLLECTION: &str = "harness";

/// Field the harness adds to every document it writes. Generated field
/// names are lowercase, so it never collides with them.
pub const KEY_FIELD: &str = "KEY";

/// A test harness that mirrors every write in a model.
pub struct IntegrationHarness {
    test_db: TestDatabase,
    expected: BTreeMap<DocumentId, Document>,
    issued: Vec<DocumentId>,
    last_modified: Option<Timestamp>,
    next_key: i64,
}

impl IntegrationHarness {
    /// Creates a harness over an in-memory database.
    pub fn memory() -> Self {
        Self::with_database(TestDatabase::memory())
    }

    /// Creates a harness over a temporary database file.
    pub fn file() -> Self {
        Self::with_database(TestDatabase::file())
    }

    fn with_database(test_db: TestDatabase) -> Self {
        test_db
            .create_collection(HARNESS_COLLECTION)
            .expect("Failed to create harness collection");
        Self {
            test_db,
            expected: BTreeMap::new(),
            issued: Vec::new(),
            last_modified: None,
            next_key: 0,
        }
    }

    /// The collection under test.
    pub fn collection(&self) -> Collection {
        self.test_db
            .collection(HARNESS_COLLECTION)
            .expect("Harness collection is missing")
    }

    /// Closes and reopens the database file.
    pub fn reopen(&mut self) {
        self.test_db.reopen();
    }

    /// Applies one operation to both the database and the model.
    pub fn apply(&mut self, operation: &Operation) {
        let collection = self.collection();
        match operation {
            Operation::Insert { data } => {
                let data = self.tagged(data.clone());
                let result = collection
                    .insert_one(data.clone())
                    .expect("Failed to insert document");
                if let Some(&previous) = self.issued.last() {
                    assert!(result.id > previous, "id {} not above {previous}", result.id);
                }
                self.observe(result.last_modified);
                self.issued.push(result.id);
                self.expected.insert(result.id, data);
            }
            Operation::Replace { target, data } => {
                let Some((id, key)) = self.pick(*target) else { return };
                let mut data = data.clone();
                data.insert(KEY_FIELD, key);
                let record = collection
                    .replace_one(doc! { KEY_FIELD => key }, data.clone())
                    .expect("Failed to replace document")
                    .expect("Replacement matched nothing");
                self.check_written(id, record.id, record.last_modified);
                self.expected.insert(id, data);
            }
            Operation::Update { target, patch } => {
                let Some((id, key)) = self.pick(*target) else { return };
                let record = collection
                    .update_one(doc! { KEY_FIELD => key }, patch, false)
                    .expect("Failed to update document")
                    .expect("Update matched nothing");
                self.check_written(id, record.id, record.last_modified);
                if let Some(data) = self.expected.get_mut(&id) {
                    data.merge_patch(patch);
                }
            }
            Operation::Delete { target } => {
                let Some((id, _)) = self.pick(*target) else { return };
                assert!(collection.delete(id).expect("Failed to delete document"));
                self.expected.remove(&id);
            }
        }
    }

    /// Applies a sequence of operations.
    pub fn apply_all(&mut self, operations: &[Operation]) {
        for operation in operations {
            self.apply(operation);
        }
    }

    /// Checks that the collection holds exactly the model's documents,
    /// in id order, each with the fingerprint of its canonical encoding.
    pub fn verify_all(&self) {
        let collection = self.collection();
        let mut actual = BTreeMap::new();
        for record in collection.find(Predicate::all()).expect("Failed to scan") {
            let record = record.expect("Failed to read record");
            let bytes = encode_document(&record.data).expect("Stored document does not encode");
            assert_eq!(record.hash, fingerprint(&bytes), "hash mismatch for {}", record.id);
            actual.insert(record.id, record.data);
        }
        assert_eq!(actual, self.expected);
        assert_eq!(
            collection
                .count_documents(Predicate::all())
                .expect("Failed to count"),
            self.expected.len() as u64
        );
    }

    /// Number of documents the model expects.
    pub fn tracked_count(&self) -> usize {
        self.expected.len()
    }

    /// The model's documents.
    pub fn expected(&self) -> &BTreeMap<DocumentId, Document> {
        &self.expected
    }

    fn pick(&self, target: usize) -> Option<(DocumentId, i64)> {
        if self.expected.is_empty() {
            return None;
        }
        let (&id, data) = self.expected.iter().nth(target % self.expected.len())?;
        let key = data.get(KEY_FIELD).and_then(|v| v.as_integer())?;
        Some((id, key))
    }

    /// Adds a unique key so single documents can be addressed by predicate.
    fn tagged(&mut self, mut data: Document) -> Document {
        self.next_key += 1;
        data.insert(KEY_FIELD, self.next_key);
        data
    }

    fn check_written(&mut self, id: DocumentId, written: DocumentId, stamp: Timestamp) {
        assert_eq!(written, id, "wrote {written}, expected {id}");
        self.observe(stamp);
    }

    fn observe(&mut self, stamp: Timestamp) {
        if let Some(previous) = self.last_modified {
            assert!(stamp > previous, "timestamp {stamp} not after {previous}");
        }
        self.last_modified = Some(stamp);
    }
}

impl Default for IntegrationHarness {
    fn default() -> Self {
        Self::memory()
    }
}
