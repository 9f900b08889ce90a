//! Crash recovery testing for HoardBase.
//!
//! [`CrashableBackend`] is an in-memory backend that stops accepting
//! writes once a byte budget is spent. [`crash_and_recover`] runs a
//! scenario against it, takes the bytes left behind at the moment of the
//! crash, reopens them as a fresh database and compares what recovery
//! produced with the states a clean run passes through.
//!
//! ## Crash model
//!
//! - Overwrites (`write_at`) are applied whole or not at all.
//! - Appends may be cut short at any byte.
//! - After the crash every write and sync fails.
//!
//! ## Usage
//!
//! ```rust
//! use hoardbase_codec::doc;
//! use hoardbase_testkit::crash::{crash_and_recover, Step};
//!
//! let steps = vec![
//!     Step::create("users"),
//!     Step::insert("users", doc! { "name" => "test" }),
//! ];
//! for budget in 0..64 {
//!     let outcome = crash_and_recover(&steps, budget);
//!     outcome.assert_consistent();
//! }
//! ```

use hoardbase_codec::Document;
use hoardbase_core::{Config, CoreResult, Database, DocumentId, Predicate};
use hoardbase_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

#[derive(Debug, Default)]
struct CrashState {
    inner: InMemoryBackend,
    budget: Option<usize>,
    written: usize,
    crash_on_sync: bool,
    crashed: bool,
}

impl CrashState {
    fn crash(&mut self, what: &str) -> StorageError {
        self.crashed = true;
        StorageError::Io(io::Error::other(format!("simulated crash during {what}")))
    }

    /// Bytes of the next write that may still land, or an error once
    /// crashed.
    fn admit(&mut self, len: usize, what: &str) -> StorageResult<usize> {
        if self.crashed {
            return Err(self.crash(what));
        }
        let allowed = match self.budget {
            Some(budget) => budget.saturating_sub(self.written).min(len),
            None => len,
        };
        self.written += allowed;
        Ok(allowed)
    }
}

/// A storage backend that can simulate a crash.
///
/// Clones share the same bytes and crash state, so a test can keep one
/// clone to arm the crash and read the surviving image while the database
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct CrashableBackend {
    state: Arc<Mutex<CrashState>>,
}

impl CrashableBackend {
    /// Creates an empty backend with no crash armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Crashes once `bytes` more bytes have been written.
    pub fn crash_after(&self, bytes: usize) {
        let mut state = self.state.lock();
        state.budget = Some(state.written.saturating_add(bytes));
    }

    /// Makes every sync fail and crash the backend.
    pub fn set_crash_on_sync(&self, crash: bool) {
        self.state.lock().crash_on_sync = crash;
    }

    /// Clears the crash state; the bytes are kept.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.budget = None;
        state.crash_on_sync = false;
        state.crashed = false;
    }

    /// Returns whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.state.lock().crashed
    }

    /// Total bytes written so far.
    pub fn bytes_written(&self) -> usize {
        self.state.lock().written
    }

    /// A copy of the bytes currently stored.
    pub fn image(&self) -> Vec<u8> {
        self.state.lock().inner.data()
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.state.lock().inner.read_at(offset, len)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
        let mut state = self.state.lock();
        if state.admit(data.len(), "write")? < data.len() {
            return Err(state.crash("write"));
        }
        state.inner.write_at(offset, data)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut state = self.state.lock();
        let allowed = state.admit(data.len(), "append")?;
        if allowed < data.len() {
            if allowed > 0 {
                state.inner.append(&data[..allowed])?;
            }
            return Err(state.crash("append"));
        }
        state.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        let mut state = self.state.lock();
        if state.crashed {
            return Err(state.crash("flush"));
        }
        state.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.state.lock().inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        let mut state = self.state.lock();
        if state.crashed || state.crash_on_sync {
            return Err(state.crash("sync"));
        }
        state.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut state = self.state.lock();
        if state.crashed {
            return Err(state.crash("truncate"));
        }
        state.inner.truncate(new_size)
    }
}

/// One step of a crash scenario.
#[derive(Debug, Clone)]
pub enum Step {
    /// Create a collection.
    Create(String),
    /// Rename a collection.
    Rename {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Drop a collection.
    Drop(String),
    /// Insert a document.
    Insert {
        /// Target collection.
        collection: String,
        /// Document to insert.
        data: Document,
    },
    /// Merge a patch into the first match.
    Update {
        /// Target collection.
        collection: String,
        /// Which document.
        filter: Document,
        /// Merge patch.
        patch: Document,
    },
    /// Replace the first match.
    Replace {
        /// Target collection.
        collection: String,
        /// Which document.
        filter: Document,
        /// Replacement.
        data: Document,
    },
    /// Delete a document by id.
    Delete {
        /// Target collection.
        collection: String,
        /// Document id.
        id: u64,
    },
}

impl Step {
    /// A [`Step::Create`].
    pub fn create(name: &str) -> Self {
        Self::Create(name.to_string())
    }

    /// A [`Step::Insert`].
    pub fn insert(collection: &str, data: Document) -> Self {
        Self::Insert {
            collection: collection.to_string(),
            data,
        }
    }

    /// Runs the step against `db`.
    ///
    /// # Errors
    ///
    /// Whatever the underlying operation returns.
    pub fn run(&self, db: &Database) -> CoreResult<()> {
        match self {
            Self::Create(name) => db.create_collection(name).map(|_| ()),
            Self::Rename { from, to } => db.rename_collection(from, to),
            Self::Drop(name) => db.drop_collection(name),
            Self::Insert { collection, data } => {
                db.collection(collection)?.insert_one(data.clone()).map(|_| ())
            }
            Self::Update {
                collection,
                filter,
                patch,
            } => db
                .collection(collection)?
                .update_one(filter, patch, false)
                .map(|_| ()),
            Self::Replace {
                collection,
                filter,
                data,
            } => db
                .collection(collection)?
                .replace_one(filter, data.clone())
                .map(|_| ()),
            Self::Delete { collection, id } => db
                .collection(collection)?
                .delete(DocumentId::new(*id))
                .map(|_| ()),
        }
    }
}

/// Every collection's documents by id.
pub type Snapshot = BTreeMap<String, BTreeMap<u64, Document>>;

/// Reads the full contents of a database.
///
/// # Errors
///
/// Returns the first read error.
pub fn snapshot(db: &Database) -> CoreResult<Snapshot> {
    let mut out = Snapshot::new();
    for name in db.list_collections()? {
        let mut documents = BTreeMap::new();
        for record in db.collection(&name)?.find(Predicate::all())? {
            let record = record?;
            documents.insert(record.id.as_u64(), record.data);
        }
        out.insert(name, documents);
    }
    Ok(out)
}

/// Result of one crash-and-recover run.
#[derive(Debug)]
pub struct CrashOutcome {
    /// Bytes the crashed run was allowed to write.
    pub budget: usize,
    /// Steps that returned `Ok` before the first failure.
    pub completed: usize,
    /// Whether the crash actually fired.
    pub crashed: bool,
    /// States of a clean run: before any step, then after each step.
    pub states: Vec<Snapshot>,
    /// What recovery produced from the crashed image.
    pub recovered: Snapshot,
}

impl CrashOutcome {
    /// Recovery must land on the state after the last completed step, or
    /// on the state after the step that was in flight.
    pub fn is_consistent(&self) -> bool {
        let before = &self.states[self.completed];
        let after = self.states.get(self.completed + 1);
        &self.recovered == before || after == Some(&self.recovered)
    }

    /// Panics with a description when [`is_consistent`](Self::is_consistent)
    /// fails.
    pub fn assert_consistent(&self) {
        assert!(
            self.is_consistent(),
            "budget {}: recovered {:?} after {} completed steps, expected {:?} or {:?}",
            self.budget,
            self.recovered,
            self.completed,
            self.states[self.completed],
            self.states.get(self.completed + 1)
        );
    }
}

/// Opens a database with the default configuration over `backend`.
fn open(backend: Box<dyn StorageBackend>) -> Database {
    Database::open_with_backend(backend, Config::default()).expect("Failed to open database")
}

/// Runs `steps` cleanly and returns the state before and after each one.
///
/// # Panics
///
/// Panics if a step fails without a crash.
pub fn reference_states(steps: &[Step]) -> Vec<Snapshot> {
    let db = open(Box::new(InMemoryBackend::new()));
    let mut states = vec![snapshot(&db).expect("Failed to snapshot")];
    for step in steps {
        step.run(&db)
            .unwrap_or_else(|e| panic!("{step:?} failed without a crash: {e}"));
        states.push(snapshot(&db).expect("Failed to snapshot"));
    }
    states
}

/// Bytes a clean run of `steps` writes after the database is created.
pub fn bytes_for(steps: &[Step]) -> usize {
    let backend = CrashableBackend::new();
    let db = open(Box::new(backend.clone()));
    let start = backend.bytes_written();
    for step in steps {
        step.run(&db).expect("Step failed without a crash");
    }
    backend.bytes_written() - start
}

/// Runs `steps` with a crash after `budget` bytes, reopens the surviving
/// bytes and reports what recovery produced.
///
/// # Panics
///
/// Panics if the surviving image cannot be reopened.
pub fn crash_and_recover(steps: &[Step], budget: usize) -> CrashOutcome {
    let states = reference_states(steps);

    let backend = CrashableBackend::new();
    let db = open(Box::new(backend.clone()));
    backend.crash_after(budget);

    let completed = steps
        .iter()
        .take_while(|step| step.run(&db).is_ok())
        .count();
    let image = backend.image();
    let crashed = backend.has_crashed();
    drop(db);

    let recovered_db = Database::open_with_backend(
        Box::new(InMemoryBackend::with_data(image)),
        Config::default(),
    )
    .unwrap_or_else(|e| panic!("budget {budget}: recovery failed: {e}"));
    let recovered = snapshot(&recovered_db).expect("Failed to snapshot recovered database");

    CrashOutcome {
        budget,
        completed,
        crashed,
        states,
        recovered,
    }
}
