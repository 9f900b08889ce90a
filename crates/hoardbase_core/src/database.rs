//! Database facade.

use crate::collection::{Collection, CollectionConfig};
use crate::config::Config;
use crate::engine::Engine;
use crate::error::{CoreError, CoreResult};
use crate::stats::DatabaseStats;
use hoardbase_storage::{FileBackend, InMemoryBackend, OpenMode, StorageBackend, StorageError};
use parking_lot::RwLock;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// State shared by a database and all of its collection handles.
///
/// `None` once the database is closed.
#[derive(Debug)]
pub(crate) struct Shared {
    engine: RwLock<Option<Engine>>,
}

impl Shared {
    /// Runs `f` under the read lock.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&Engine) -> CoreResult<T>) -> CoreResult<T> {
        let guard = self.engine.read();
        let engine = guard.as_ref().ok_or(CoreError::DatabaseClosed)?;
        f(engine)
    }

    /// Runs `f` under the write lock.
    pub(crate) fn write<T>(&self, f: impl FnOnce(&mut Engine) -> CoreResult<T>) -> CoreResult<T> {
        let mut guard = self.engine.write();
        let engine = guard.as_mut().ok_or(CoreError::DatabaseClosed)?;
        f(engine)
    }
}

/// The main database handle.
///
/// A `Database` owns one backing file (or one in-memory buffer) and the
/// collections stored in it. It is `Send + Sync`; share it behind an `Arc`
/// or hand out [`Collection`] handles, which are cheap to clone.
///
/// # Opening a Database
///
/// ```rust,no_run
/// use hoardbase_codec::doc;
/// use hoardbase_core::Database;
/// use std::path::Path;
///
/// let db = Database::open(Path::new("app.hoard"))?;
/// let users = db.create_collection("users")?;
/// users.insert_one(doc! { "name" => "test" })?;
///
/// users.find_with(doc! { "name" => "test" }, |record, is_last| {
///     println!("{} {:?} last={is_last}", record.id, record.data);
/// })?;
///
/// db.close()?;
/// # Ok::<(), hoardbase_core::CoreError>(())
/// ```
///
/// # Closing
///
/// [`close`](Self::close) syncs the file and releases it along with its
/// lock. Dropping the database closes it too. After closing, every call on
/// the database or its collections fails with `DatabaseClosed`.
#[derive(Debug)]
pub struct Database {
    shared: Arc<Shared>,
    path: Option<PathBuf>,
}

impl Database {
    /// Opens or creates a database file with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyOpen` if another handle has the file open,
    /// `InvalidFormat` if the file is not a HoardBase database,
    /// `CorruptRecord` if a stored record is damaged, or an I/O error.
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a database file with a custom configuration.
    ///
    /// # Errors
    ///
    /// As [`open`](Self::open); additionally `AlreadyExists` when
    /// `error_if_exists` is set and the file exists, and an I/O error of
    /// kind `NotFound` when `create_if_missing` is unset and it does not.
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        let mode = if config.error_if_exists {
            OpenMode::CreateNew
        } else if config.create_if_missing {
            OpenMode::OpenOrCreate
        } else {
            OpenMode::OpenExisting
        };

        let backend = match FileBackend::open(path, mode) {
            Ok(backend) => backend,
            Err(StorageError::Io(e)) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(CoreError::already_exists(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut db = Self::open_with_backend(Box::new(backend), config)?;
        db.path = Some(path.to_path_buf());
        info!(path = %path.display(), "opened database");
        Ok(db)
    }

    /// Opens a database over any storage backend.
    ///
    /// An empty backend is initialized as a new database; anything else
    /// must hold an existing one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the backend holds something other than a
    /// HoardBase database, `CorruptRecord` if a stored record is damaged,
    /// or an I/O error.
    pub fn open_with_backend(backend: Box<dyn StorageBackend>, config: Config) -> CoreResult<Self> {
        let engine = if backend.size()? == 0 {
            Engine::create(backend, &config)?
        } else {
            Engine::open(backend, &config)?
        };
        Ok(Self {
            shared: Arc::new(Shared {
                engine: RwLock::new(Some(engine)),
            }),
            path: None,
        })
    }

    /// Creates a database that lives only in memory.
    ///
    /// # Errors
    ///
    /// Infallible in practice; the signature matches [`open`](Self::open).
    pub fn open_in_memory() -> CoreResult<Self> {
        let config = Config::default().sync_on_write(false);
        Self::open_with_backend(Box::new(InMemoryBackend::new()), config)
    }

    /// Creates a new, empty collection.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the name is taken, `Validation` for an
    /// empty or over-long name, or an I/O error.
    pub fn create_collection(&self, name: &str) -> CoreResult<Collection> {
        self.create_collection_with_config(name, CollectionConfig::default())
    }

    /// Creates a new, empty collection with the given settings.
    ///
    /// # Errors
    ///
    /// Same as [`create_collection`](Self::create_collection).
    pub fn create_collection_with_config(
        &self,
        name: &str,
        config: CollectionConfig,
    ) -> CoreResult<Collection> {
        let id = self
            .shared
            .write(|engine| engine.create_collection(name, config))?;
        Ok(Collection::new(Arc::clone(&self.shared), id))
    }

    /// Returns a handle to an existing collection.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no collection with that name.
    pub fn collection(&self, name: &str) -> CoreResult<Collection> {
        let id = self.shared.read(|engine| engine.collection_id(name))?;
        Ok(Collection::new(Arc::clone(&self.shared), id))
    }

    /// Names of all collections, sorted.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after [`close`](Self::close).
    pub fn list_collections(&self) -> CoreResult<Vec<String>> {
        self.shared.read(|engine| Ok(engine.collection_names()))
    }

    /// Deletes a collection and all of its documents.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such collection, or an I/O error.
    pub fn drop_collection(&self, name: &str) -> CoreResult<()> {
        self.shared.write(|engine| engine.drop_collection(name))
    }

    /// Renames a collection. Existing handles follow the rename.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `from` does not exist, `AlreadyExists` if `to`
    /// does, `Validation` for a bad new name, or an I/O error.
    pub fn rename_collection(&self, from: &str, to: &str) -> CoreResult<()> {
        self.shared.write(|engine| engine.rename_collection(from, to))
    }

    /// Path of the backing file; `None` for in-memory databases.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Counts and space usage.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after [`close`](Self::close), or an I/O error.
    pub fn stats(&self) -> CoreResult<DatabaseStats> {
        self.shared.read(|engine| {
            let space = engine.space()?;
            let header = engine.header();
            Ok(DatabaseStats {
                collections: engine.collection_names().len(),
                documents: engine.document_count(),
                file_size: space.file_size,
                free_slots: space.free_slots,
                free_bytes: space.free_bytes,
                created_at: header.created_at,
                format_version: header.version,
            })
        })
    }

    /// Flushes and syncs the backing file.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after [`close`](Self::close), or an I/O error.
    pub fn sync(&self) -> CoreResult<()> {
        self.shared.write(Engine::sync)
    }

    /// Syncs and releases the backing file and its lock.
    ///
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the final sync fails; the file is released
    /// either way.
    pub fn close(&self) -> CoreResult<()> {
        let Some(mut engine) = self.shared.engine.write().take() else {
            return Ok(());
        };
        let result = engine.sync();
        drop(engine);
        debug!(path = ?self.path, "closed database");
        result
    }

    /// Returns true until [`close`](Self::close) is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.engine.read().is_some()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
