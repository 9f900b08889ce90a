//! Test fixtures and database helpers.

use hoardbase_codec::doc;
use hoardbase_core::{Collection, Config, Database};
use std::path::{Path, PathBuf};
use std::sync::Once;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// File name used for file-backed test databases.
pub const TEST_DB_FILE: &str = "test.hoard";

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self {
            db: Database::open_in_memory().expect("Failed to open in-memory database"),
            temp_dir: None,
        }
    }

    /// Creates a new database file in a fresh temporary directory.
    pub fn file() -> Self {
        Self::file_with_config(Config::default())
    }

    /// Like [`file`](Self::file), with a custom configuration.
    pub fn file_with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open_with_config(&temp_dir.path().join(TEST_DB_FILE), config)
            .expect("Failed to open file database");
        Self {
            db,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the database path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join(TEST_DB_FILE))
    }

    /// Closes and reopens a file-backed database, running recovery.
    ///
    /// # Panics
    ///
    /// Panics for in-memory databases, which cannot be reopened.
    pub fn reopen(&mut self) {
        let path = self.path().expect("Only file databases can be reopened");
        self.db.close().expect("Failed to close database");
        self.db = Database::open(&path).expect("Failed to reopen database");
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
///
/// # Example
///
/// ```rust
/// use hoardbase_testkit::with_temp_db;
///
/// with_temp_db(|db| {
///     let users = db.create_collection("users").unwrap();
///     assert_eq!(users.name().unwrap(), "users");
/// });
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a temporary file-based database.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db.path().expect("File database should have a path");
    f(&test_db.db, &path)
}

/// Installs a `tracing` subscriber for test output.
///
/// Honors `RUST_LOG`, defaulting to `warn`. Safe to call from every test.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a database with one `test` collection holding `count`
    /// documents of the form `{"index": i, "even": i % 2 == 0}`.
    pub fn populated_database(count: usize) -> (TestDatabase, Collection) {
        let test_db = TestDatabase::memory();
        let collection = test_db
            .create_collection("test")
            .expect("Failed to create collection");

        let documents = (0..count).map(|i| {
            let i = i as i64;
            doc! { "index" => i, "even" => i % 2 == 0 }
        });
        collection
            .insert_many(documents)
            .expect("Failed to insert documents");

        (test_db, collection)
    }

    /// Creates a database with `count` collections named
    /// `collection_0`, `collection_1`, ... holding one document each.
    pub fn multi_collection_database(count: usize) -> (TestDatabase, Vec<Collection>) {
        let test_db = TestDatabase::memory();
        let mut collections = Vec::with_capacity(count);

        for i in 0..count {
            let collection = test_db
                .create_collection(&format!("collection_{i}"))
                .expect("Failed to create collection");
            collection
                .insert_one(doc! { "collection" => i as i64 })
                .expect("Failed to insert document");
            collections.push(collection);
        }

        (test_db, collections)
    }
}
