//! Storage backend trait definition.

use crate::error::StorageResult;

/// A random-access byte store.
///
/// HoardBase owns all interpretation of the bytes; a backend only moves
/// them.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `write_at` never changes the size of the store
/// - `read_at` returns exactly the bytes last written at that range
/// - `sync` makes every earlier write durable
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `ReadPastEnd` if the range extends beyond the current size,
    /// or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Overwrites existing bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `WritePastEnd` if the range extends beyond the current size,
    /// or an I/O error.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Appends data to the end of the storage.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size of the storage in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Makes all written data and metadata durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Shrinks the storage to `new_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns `TruncateBeyondSize` if `new_size` is greater than the
    /// current size, or an I/O error.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
