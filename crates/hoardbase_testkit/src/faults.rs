//! Single-write fault injection.
//!
//! Where [`crash`](crate::crash) stops the world, [`FaultyBackend`] fails
//! exactly one write and then carries on as if nothing happened. This is
//! the shape of a transient I/O error: the database must report it, keep
//! serving, and leave the file in a state that reopens to exactly what
//! the live database shows.
//!
//! ```rust
//! use hoardbase_codec::doc;
//! use hoardbase_testkit::crash::Step;
//! use hoardbase_testkit::faults::{fail_once_and_reopen, writes_for};
//!
//! let steps = vec![
//!     Step::create("users"),
//!     Step::insert("users", doc! { "name" => "test" }),
//! ];
//! for nth in 0..writes_for(&steps) {
//!     fail_once_and_reopen(&steps, nth).assert_consistent();
//! }
//! ```

use crate::crash::{snapshot, Snapshot, Step};
use hoardbase_core::{Config, Database};
use hoardbase_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

#[derive(Debug, Default)]
struct FaultState {
    inner: InMemoryBackend,
    writes: usize,
    fail_at: Option<usize>,
    failed: bool,
}

impl FaultState {
    /// Counts one write and fails it if it is the armed one.
    fn admit(&mut self, what: &str) -> StorageResult<()> {
        let index = self.writes;
        self.writes += 1;
        if self.fail_at == Some(index) {
            self.fail_at = None;
            self.failed = true;
            return Err(StorageError::Io(io::Error::other(format!(
                "injected failure of {what} #{index}"
            ))));
        }
        Ok(())
    }
}

/// An in-memory backend that fails one chosen write.
///
/// `write_at`, `append` and `truncate` count as writes. The failed write
/// changes nothing; every write before and after it succeeds. Clones
/// share the same bytes and counters.
#[derive(Debug, Clone, Default)]
pub struct FaultyBackend {
    state: Arc<Mutex<FaultState>>,
}

impl FaultyBackend {
    /// Creates an empty backend with no fault armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the write `n` writes from now (`0` is the next one).
    pub fn fail_nth_write(&self, n: usize) {
        let mut state = self.state.lock();
        state.fail_at = Some(state.writes + n);
    }

    /// Writes attempted so far, including a failed one.
    pub fn writes(&self) -> usize {
        self.state.lock().writes
    }

    /// Returns whether the armed write has failed.
    pub fn has_failed(&self) -> bool {
        self.state.lock().failed
    }

    /// A copy of the bytes currently stored.
    pub fn image(&self) -> Vec<u8> {
        self.state.lock().inner.data()
    }
}

impl StorageBackend for FaultyBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.state.lock().inner.read_at(offset, len)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
        let mut state = self.state.lock();
        state.admit("write")?;
        state.inner.write_at(offset, data)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut state = self.state.lock();
        state.admit("append")?;
        state.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.state.lock().inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.state.lock().inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.state.lock().inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut state = self.state.lock();
        state.admit("truncate")?;
        state.inner.truncate(new_size)
    }
}

/// Result of one fail-once run.
#[derive(Debug)]
pub struct FaultOutcome {
    /// Index of the failed write, counted from the first step.
    pub nth: usize,
    /// Whether the armed write was reached.
    pub failed: bool,
    /// Steps that returned an error.
    pub errors: usize,
    /// What the live database showed after all steps.
    pub live: Snapshot,
    /// What reopening the file produced.
    pub reopened: Snapshot,
}

impl FaultOutcome {
    /// The reopened file must show exactly what the live database did.
    pub fn is_consistent(&self) -> bool {
        self.live == self.reopened
    }

    /// Panics with a description when [`is_consistent`](Self::is_consistent)
    /// fails.
    pub fn assert_consistent(&self) {
        assert!(
            self.is_consistent(),
            "write {}: live {:?}, reopened {:?}",
            self.nth,
            self.live,
            self.reopened
        );
    }
}

fn open(backend: Box<dyn StorageBackend>) -> Database {
    Database::open_with_backend(backend, Config::default()).expect("Failed to open database")
}

/// Writes a clean run of `steps` issues after the database is created.
pub fn writes_for(steps: &[Step]) -> usize {
    let backend = FaultyBackend::new();
    let db = open(Box::new(backend.clone()));
    let start = backend.writes();
    for step in steps {
        step.run(&db).expect("Step failed without a fault");
    }
    backend.writes() - start
}

/// Runs every step with write `nth` failing, ignoring step errors, then
/// reopens the file and compares it with the live database.
///
/// # Panics
///
/// Panics if a snapshot fails or the file cannot be reopened.
pub fn fail_once_and_reopen(steps: &[Step], nth: usize) -> FaultOutcome {
    let backend = FaultyBackend::new();
    let db = open(Box::new(backend.clone()));
    backend.fail_nth_write(nth);

    let errors = steps.iter().filter(|step| step.run(&db).is_err()).count();
    let live = snapshot(&db).expect("Failed to snapshot live database");
    let image = backend.image();
    drop(db);

    let reopened_db = Database::open_with_backend(
        Box::new(InMemoryBackend::with_data(image)),
        Config::default(),
    )
    .unwrap_or_else(|e| panic!("write {nth}: reopen failed: {e}"));
    let reopened = snapshot(&reopened_db).expect("Failed to snapshot reopened database");

    FaultOutcome {
        nth,
        failed: backend.has_failed(),
        errors,
        live,
        reopened,
    }
}
