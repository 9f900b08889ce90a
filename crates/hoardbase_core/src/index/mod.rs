//! Per-collection indexes: the id index every collection has, plus the
//! optional secondary and content-hash indexes.

mod hashes;
mod secondary;

pub use hashes::HashIndex;
pub use secondary::{IndexInfo, IndexSpec, SecondaryIndex};
pub(crate) use secondary::{field_path, key_of};

use crate::store::Location;
use crate::types::DocumentId;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Maps document ids to slot locations and hands out new ids.
///
/// Ids are handed out in strictly increasing order; `next_id` is never
/// rewound, even when the highest id is removed.
#[derive(Debug, Clone)]
pub struct CollectionIndex {
    entries: BTreeMap<DocumentId, Location>,
    next_id: u64,
}

impl Default for CollectionIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionIndex {
    /// Creates an empty index whose first id is 1.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(DocumentId::FIRST.as_u64())
    }

    /// Creates an empty index that will hand out `next` first.
    #[must_use]
    pub fn starting_at(next: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: next.max(DocumentId::FIRST.as_u64()),
        }
    }

    /// Returns a fresh id and reserves it.
    pub fn next_id(&mut self) -> DocumentId {
        let id = DocumentId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// The id the next call to [`next_id`](Self::next_id) will return.
    #[must_use]
    pub fn peek_next_id(&self) -> u64 {
        self.next_id
    }

    /// Records where a document lives, returning its previous location.
    ///
    /// Also moves the id sequence past `id`.
    pub fn put(&mut self, id: DocumentId, location: Location) -> Option<Location> {
        self.next_id = self.next_id.max(id.as_u64().saturating_add(1));
        self.entries.insert(id, location)
    }

    /// Location of a document.
    #[must_use]
    pub fn get(&self, id: DocumentId) -> Option<Location> {
        self.entries.get(&id).copied()
    }

    /// Forgets a document, returning its location.
    pub fn remove(&mut self, id: DocumentId) -> Option<Location> {
        self.entries.remove(&id)
    }

    /// All entries in ascending id order.
    pub fn scan(&self) -> impl Iterator<Item = (DocumentId, Location)> + '_ {
        self.entries.iter().map(|(&id, &location)| (id, location))
    }

    /// The first entry with an id greater than `after`, or the first entry
    /// overall when `after` is `None`.
    #[must_use]
    pub fn next_after(&self, after: Option<DocumentId>) -> Option<(DocumentId, Location)> {
        let lower = match after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        self.entries
            .range((lower, Bound::Unbounded))
            .next()
            .map(|(&id, &location)| (id, location))
    }

    /// Number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the collection holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
