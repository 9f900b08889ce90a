//! In-memory storage backend for testing.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;

/// An in-memory storage backend.
///
/// Used by `Database::open_in_memory` and by tests that need to inspect or
/// damage the raw bytes of a database.
///
/// # Example
///
/// ```rust
/// use hoardbase_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let offset = backend.append(b"test data").unwrap();
/// assert_eq!(offset, 0);
/// assert_eq!(backend.size().unwrap(), 9);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: RwLock<Vec<u8>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory backend with pre-existing data.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Returns a copy of all data in the backend.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

fn range(offset: u64, len: usize, size: usize) -> Option<std::ops::Range<usize>> {
    let start = usize::try_from(offset).ok()?;
    let end = start.checked_add(len)?;
    (end <= size).then_some(start..end)
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        match range(offset, len, data.len()) {
            Some(r) => Ok(data[r].to_vec()),
            None => Err(StorageError::ReadPastEnd {
                offset,
                len,
                size: data.len() as u64,
            }),
        }
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> StorageResult<()> {
        let mut data = self.data.write();
        match range(offset, bytes.len(), data.len()) {
            Some(r) => {
                data[r].copy_from_slice(bytes);
                Ok(())
            }
            None => Err(StorageError::WritePastEnd {
                offset,
                len: bytes.len(),
                size: data.len() as u64,
            }),
        }
    }

    fn append(&mut self, new_data: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;

        if new_size > size {
            return Err(StorageError::TruncateBeyondSize {
                requested: new_size,
                size,
            });
        }

        // new_size <= len, so it fits in usize
        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(backend.data().is_empty());
    }

    #[test]
    fn memory_append_returns_offsets() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.size().unwrap(), 11);
        assert_eq!(backend.read_at(6, 5).unwrap(), b"world");
    }

    #[test]
    fn memory_read_past_end_fails() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"hello").unwrap();

        assert!(matches!(
            backend.read_at(10, 5),
            Err(StorageError::ReadPastEnd { .. })
        ));
        assert!(matches!(
            backend.read_at(3, 10),
            Err(StorageError::ReadPastEnd { .. })
        ));
        assert!(matches!(
            backend.read_at(u64::MAX, 1),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn memory_write_at() {
        let mut backend = InMemoryBackend::with_data(b"abcdef".to_vec());
        backend.write_at(2, b"XY").unwrap();
        assert_eq!(backend.data(), b"abXYef");

        assert!(matches!(
            backend.write_at(5, b"XY"),
            Err(StorageError::WritePastEnd { .. })
        ));
        assert_eq!(backend.data(), b"abXYef");
    }

    #[test]
    fn memory_truncate() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"hello world").unwrap();

        backend.truncate(5).unwrap();
        assert_eq!(backend.read_at(0, 5).unwrap(), b"hello");
        assert!(matches!(
            backend.truncate(100),
            Err(StorageError::TruncateBeyondSize { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_write_at_matches_vec_model(
            initial in prop::collection::vec(any::<u8>(), 1..64),
            patch in prop::collection::vec(any::<u8>(), 0..16),
            offset in 0usize..64,
        ) {
            let mut backend = InMemoryBackend::with_data(initial.clone());
            let result = backend.write_at(offset as u64, &patch);

            let mut model = initial;
            if offset + patch.len() <= model.len() {
                model[offset..offset + patch.len()].copy_from_slice(&patch);
                prop_assert!(result.is_ok());
            } else {
                prop_assert!(result.is_err());
            }
            prop_assert_eq!(backend.data(), model);
        }
    }
}
