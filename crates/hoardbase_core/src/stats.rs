//! Database statistics.
//!
//! ```rust
//! use hoardbase_codec::doc;
//! use hoardbase_core::Database;
//!
//! let db = Database::open_in_memory()?;
//! db.create_collection("users")?.insert_one(doc! { "name" => "test" })?;
//!
//! let stats = db.stats()?;
//! assert_eq!(stats.collections, 1);
//! assert_eq!(stats.documents, 1);
//! # Ok::<(), hoardbase_core::CoreError>(())
//! ```

use crate::types::Timestamp;
use std::fmt;

/// A snapshot of database contents and space usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Number of collections.
    pub collections: usize,
    /// Number of documents across all collections.
    pub documents: usize,
    /// Size of the backing file in bytes.
    pub file_size: u64,
    /// Number of free slots available for reuse.
    pub free_slots: usize,
    /// Bytes held by free slots.
    pub free_bytes: u64,
    /// When the file was created.
    pub created_at: Timestamp,
    /// File format version (major, minor).
    pub format_version: (u16, u16),
}

impl DatabaseStats {
    /// Fraction of the file held by free slots, in `0.0..=1.0`.
    #[must_use]
    pub fn free_ratio(&self) -> f64 {
        if self.file_size == 0 {
            return 0.0;
        }
        self.free_bytes as f64 / self.file_size as f64
    }
}

impl fmt::Display for DatabaseStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "v{}.{}: {} collections, {} documents, {} bytes ({} free in {} slots)",
            self.format_version.0,
            self.format_version.1,
            self.collections,
            self.documents,
            self.file_size,
            self.free_bytes,
            self.free_slots
        )
    }
}
