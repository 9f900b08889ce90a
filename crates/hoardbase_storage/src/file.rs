//! File-based storage backend for persistent storage.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// How [`FileBackend::open`] treats an existing or missing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Open the file, creating it if it does not exist.
    #[default]
    OpenOrCreate,
    /// Create the file; fail if it already exists.
    CreateNew,
    /// Open the file; fail if it does not exist.
    OpenExisting,
}

/// A storage backend over a single OS file.
///
/// The file is exclusively locked (advisory, via `fs2`) for as long as the
/// backend is alive, so a second backend on the same path fails with
/// [`StorageError::Locked`] until the first is dropped.
///
/// # Durability
///
/// - `flush()` calls `File::flush()` to push data to the OS
/// - `sync()` calls `File::sync_all()` to ensure data is on disk
///
/// # Example
///
/// ```no_run
/// use hoardbase_storage::{FileBackend, OpenMode, StorageBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("data.hoard"), OpenMode::OpenOrCreate).unwrap();
/// backend.append(b"persistent data").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: RwLock<File>,
    size: RwLock<u64>,
}

impl FileBackend {
    /// Opens a file backend and takes the exclusive lock.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another handle holds the lock,
    /// or an I/O error if the file cannot be opened in the given mode.
    pub fn open(path: &Path, mode: OpenMode) -> StorageResult<Self> {
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        match mode {
            OpenMode::OpenOrCreate => {
                options.create(true).truncate(false);
            }
            OpenMode::CreateNew => {
                options.create_new(true);
            }
            OpenMode::OpenExisting => {}
        }
        let file = options.open(path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.to_path_buf()));
        }

        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            size: RwLock::new(size),
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = *self.size.read();
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;

        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
        let size = *self.size.read();
        let end = offset.saturating_add(data.len() as u64);

        if offset > size || end > size {
            return Err(StorageError::WritePastEnd {
                offset,
                len: data.len(),
                size,
            });
        }

        if data.is_empty() {
            return Ok(());
        }

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if data.is_empty() {
            return Ok(*self.size.read());
        }

        let mut file = self.file.write();
        let mut size = self.size.write();

        let offset = *size;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        *size += data.len() as u64;

        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.file.write().flush()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(*self.size.read())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file.write().sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let file = self.file.write();
        let mut size = self.size.write();

        if new_size > *size {
            return Err(StorageError::TruncateBeyondSize {
                requested: new_size,
                size: *size,
            });
        }

        file.set_len(new_size)?;
        file.sync_all()?;
        *size = new_size;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open(path: &Path) -> FileBackend {
        FileBackend::open(path, OpenMode::OpenOrCreate).unwrap()
    }

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.hoard");

        let backend = open(&path);
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
        assert_eq!(backend.path(), path);
    }

    #[test]
    fn file_append_and_read() {
        let dir = tempdir().unwrap();
        let mut backend = open(&dir.path().join("test.hoard"));

        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.size().unwrap(), 11);
        assert_eq!(backend.read_at(0, 11).unwrap(), b"hello world");
        assert_eq!(backend.read_at(6, 5).unwrap(), b"world");
    }

    #[test]
    fn file_write_at_overwrites_in_place() {
        let dir = tempdir().unwrap();
        let mut backend = open(&dir.path().join("test.hoard"));
        backend.append(b"hello world").unwrap();

        backend.write_at(6, b"WORLD").unwrap();
        assert_eq!(backend.read_at(0, 11).unwrap(), b"hello WORLD");
        assert_eq!(backend.size().unwrap(), 11);

        // Appends still land at the end after a seek elsewhere
        assert_eq!(backend.append(b"!").unwrap(), 11);
        assert_eq!(backend.read_at(0, 12).unwrap(), b"hello WORLD!");
    }

    #[test]
    fn file_write_past_end_fails() {
        let dir = tempdir().unwrap();
        let mut backend = open(&dir.path().join("test.hoard"));
        backend.append(b"hello").unwrap();

        let result = backend.write_at(3, b"xyz");
        assert!(matches!(result, Err(StorageError::WritePastEnd { .. })));
        assert_eq!(backend.read_at(0, 5).unwrap(), b"hello");
    }

    #[test]
    fn file_read_past_end_fails() {
        let dir = tempdir().unwrap();
        let mut backend = open(&dir.path().join("test.hoard"));
        backend.append(b"hello").unwrap();

        let result = backend.read_at(10, 5);
        assert!(matches!(result, Err(StorageError::ReadPastEnd { .. })));
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.hoard");

        {
            let mut backend = open(&path);
            backend.append(b"persistent data").unwrap();
            backend.write_at(0, b"P").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path, OpenMode::OpenExisting).unwrap();
        assert_eq!(backend.size().unwrap(), 15);
        assert_eq!(backend.read_at(0, 15).unwrap(), b"Persistent data");
    }

    #[test]
    fn file_truncate() {
        let dir = tempdir().unwrap();
        let mut backend = open(&dir.path().join("test.hoard"));
        backend.append(b"hello world").unwrap();

        backend.truncate(5).unwrap();
        assert_eq!(backend.size().unwrap(), 5);
        assert!(matches!(
            backend.truncate(6),
            Err(StorageError::TruncateBeyondSize { .. })
        ));
    }

    #[test]
    fn file_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.hoard");

        let first = open(&path);
        let second = FileBackend::open(&path, OpenMode::OpenOrCreate);
        assert!(matches!(second, Err(StorageError::Locked(_))));

        drop(first);
        assert!(FileBackend::open(&path, OpenMode::OpenOrCreate).is_ok());
    }

    #[test]
    fn file_open_modes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.hoard");

        assert!(matches!(
            FileBackend::open(&path, OpenMode::OpenExisting),
            Err(StorageError::Io(_))
        ));
        drop(FileBackend::open(&path, OpenMode::CreateNew).unwrap());
        assert!(matches!(
            FileBackend::open(&path, OpenMode::CreateNew),
            Err(StorageError::Io(_))
        ));
    }

    #[test]
    fn file_flush_and_sync() {
        let dir = tempdir().unwrap();
        let mut backend = open(&dir.path().join("test.hoard"));
        backend.append(b"data").unwrap();

        assert!(backend.flush().is_ok());
        assert!(backend.sync().is_ok());
    }
}
