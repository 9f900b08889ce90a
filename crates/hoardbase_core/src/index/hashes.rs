//! Content-hash lookup for collections that reject duplicates.

use crate::types::DocumentId;
use hoardbase_codec::ContentHash;
use std::collections::HashMap;

/// Which document holds each content hash.
#[derive(Debug, Clone, Default)]
pub struct HashIndex {
    by_hash: HashMap<ContentHash, DocumentId>,
    by_id: HashMap<DocumentId, ContentHash>,
}

impl HashIndex {
    /// An empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Another document that already has `hash`.
    #[must_use]
    pub fn conflict(&self, id: DocumentId, hash: &ContentHash) -> Option<DocumentId> {
        self.by_hash.get(hash).copied().filter(|&other| other != id)
    }

    /// Records `hash` for `id`, replacing what `id` had before.
    pub fn insert(&mut self, id: DocumentId, hash: ContentHash) {
        self.remove(id);
        self.by_hash.insert(hash, id);
        self.by_id.insert(id, hash);
    }

    /// Forgets `id`.
    pub fn remove(&mut self, id: DocumentId) {
        if let Some(hash) = self.by_id.remove(&id) {
            if self.by_hash.get(&hash) == Some(&id) {
                self.by_hash.remove(&hash);
            }
        }
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.by_hash.clear();
        self.by_id.clear();
    }
}
