//! Core type definitions for HoardBase.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier for a collection.
///
/// Collection IDs are assigned when collections are created and stored in
/// every slot that belongs to the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionId(pub u32);

impl CollectionId {
    /// Creates a new collection ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "collection:{}", self.0)
    }
}

/// Identifier of a document within its collection.
///
/// Ids start at 1, strictly increase, and are never reused, even after the
/// document is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(pub u64);

impl DocumentId {
    /// The first id handed out in a new collection.
    pub const FIRST: Self = Self(1);

    /// Creates a new document ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Modification time in microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Creates a timestamp from microseconds since the epoch.
    #[must_use]
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Returns microseconds since the epoch.
    #[must_use]
    pub const fn as_micros(self) -> i64 {
        self.0
    }

    /// Reads the system clock.
    #[must_use]
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_micros()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Self(micros)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}µs", self.0)
    }
}

/// Hands out strictly increasing timestamps.
///
/// Seeded at open with the newest timestamp found in the file, so values
/// keep increasing across reopen even if the system clock steps back.
#[derive(Debug, Clone)]
pub(crate) struct Clock {
    last: Timestamp,
}

impl Clock {
    pub(crate) fn starting_after(last: Timestamp) -> Self {
        Self { last }
    }

    /// Advances past `seen` if it is newer than anything handed out.
    pub(crate) fn observe(&mut self, seen: Timestamp) {
        self.last = self.last.max(seen);
    }

    pub(crate) fn tick(&mut self) -> Timestamp {
        let next = Timestamp::now().max(Timestamp(self.last.0.saturating_add(1)));
        self.last = next;
        next
    }
}
