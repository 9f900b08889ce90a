//! The in-memory view of an open database file.
//!
//! `Engine` owns the record store, the collection directory and one id
//! index per collection. It is not synchronized; `Database` wraps it in a
//! lock.

use crate::catalog::{validate_name, DirectoryEntry};
use crate::collection::CollectionConfig;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::index::{key_of, CollectionIndex, HashIndex, IndexInfo, IndexSpec, SecondaryIndex};
use crate::query::{resolve, Predicate};
use crate::record::{DocumentBody, EncodedDocument, Record};
use crate::store::{FileHeader, LiveSlot, Location, RecordStore, SlotKind, SpaceStats};
use crate::types::{Clock, CollectionId, DocumentId, Timestamp};
use hoardbase_codec::{ContentHash, Document, Value};
use hoardbase_storage::StorageBackend;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Most secondary indexes one collection may have.
pub(crate) const MAX_INDEXES: usize = 32;

/// Directory state of one collection.
#[derive(Debug)]
pub(crate) struct CollectionState {
    pub name: String,
    /// The live directory slot.
    pub entry: Location,
    pub entry_modified: Timestamp,
    pub config: CollectionConfig,
    pub index: CollectionIndex,
    pub secondary: Vec<SecondaryIndex>,
    /// Filled only when `config.hash_unique` is set.
    pub hashes: HashIndex,
}

impl CollectionState {
    fn new(entry: &DirectoryEntry, location: Location, index: CollectionIndex) -> Self {
        Self {
            name: entry.name.clone(),
            entry: location,
            entry_modified: entry.last_modified,
            config: entry.config,
            index,
            secondary: entry.indexes.iter().cloned().map(SecondaryIndex::new).collect(),
            hashes: HashIndex::new(),
        }
    }

    /// Whether writes must be checked against unique constraints.
    fn constrained(&self) -> bool {
        self.config.hash_unique || !self.secondary.is_empty()
    }

    fn specs(&self) -> Vec<IndexSpec> {
        self.secondary.iter().map(|s| s.spec().clone()).collect()
    }

    /// Fails if storing `data` under `id` would duplicate a unique value.
    fn check(&self, id: DocumentId, data: &Document, hash: &ContentHash) -> CoreResult<()> {
        if self.config.hash_unique && self.hashes.conflict(id, hash).is_some() {
            return Err(CoreError::unique_violation(&self.name, "content hash"));
        }
        for secondary in &self.secondary {
            if secondary.conflict(id, data).is_some() {
                return Err(CoreError::unique_violation(&self.name, &secondary.spec().path));
            }
        }
        Ok(())
    }

    fn track(&mut self, id: DocumentId, data: &Document, hash: ContentHash) {
        if self.config.hash_unique {
            self.hashes.insert(id, hash);
        }
        for secondary in &mut self.secondary {
            secondary.insert(id, data);
        }
    }

    fn untrack(&mut self, id: DocumentId) {
        self.hashes.remove(id);
        for secondary in &mut self.secondary {
            secondary.remove(id);
        }
    }

    /// Entries that may match `predicate`, ascending by id.
    ///
    /// Uses the first secondary index that covers an equality of the
    /// predicate, or else every entry.
    fn candidates<'a>(
        &'a self,
        predicate: &Predicate,
    ) -> Box<dyn Iterator<Item = (DocumentId, Location)> + 'a> {
        for condition in predicate.conditions() {
            if let Some(secondary) = self.secondary.iter().find(|s| s.covers(condition.path())) {
                let ids = secondary.lookup(condition.value());
                return Box::new(
                    ids.into_iter()
                        .filter_map(move |id| self.index.get(id).map(|location| (id, location))),
                );
            }
        }
        Box::new(self.index.scan())
    }
}

#[derive(Debug)]
pub(crate) struct Engine {
    store: RecordStore,
    collections: BTreeMap<CollectionId, CollectionState>,
    names: BTreeMap<String, CollectionId>,
    next_collection_id: u32,
    clock: Clock,
    /// Superseded slots still live on disk because freeing them failed.
    stale: Vec<Location>,
}

fn state_mut(
    collections: &mut BTreeMap<CollectionId, CollectionState>,
    collection: CollectionId,
) -> CoreResult<&mut CollectionState> {
    collections
        .get_mut(&collection)
        .ok_or_else(|| CoreError::not_found(collection.to_string()))
}

impl Engine {
    /// Initializes a new, empty database on `backend`.
    pub(crate) fn create(backend: Box<dyn StorageBackend>, config: &Config) -> CoreResult<Self> {
        let mut clock = Clock::starting_after(Timestamp::from_micros(0));
        let header = FileHeader::new(clock.tick());
        let store = RecordStore::create(backend, header, config)?;
        debug!(created_at = %header.created_at, "initialized new database file");

        Ok(Self {
            store,
            collections: BTreeMap::new(),
            names: BTreeMap::new(),
            next_collection_id: 1,
            clock,
            stale: Vec::new(),
        })
    }

    /// Opens an existing database and rebuilds the directory and indexes.
    pub(crate) fn open(backend: Box<dyn StorageBackend>, config: &Config) -> CoreResult<Self> {
        let (store, live) = RecordStore::open(backend, config)?;
        let clock = Clock::starting_after(store.header().created_at);

        let mut engine = Self {
            store,
            collections: BTreeMap::new(),
            names: BTreeMap::new(),
            next_collection_id: 1,
            clock,
            stale: Vec::new(),
        };
        engine.recover(live)?;
        Ok(engine)
    }

    fn recover(&mut self, live: Vec<LiveSlot>) -> CoreResult<()> {
        let (directory, documents): (Vec<_>, Vec<_>) = live
            .into_iter()
            .partition(|slot| slot.kind == SlotKind::Directory);

        // Directory first, so documents can find their collection
        let mut counters: HashMap<CollectionId, u64> = HashMap::new();
        for slot in directory {
            let entry = DirectoryEntry::decode(slot.location.offset, &slot.body)?;
            self.clock.observe(entry.last_modified);
            let counter = counters.entry(entry.collection).or_insert(0);
            *counter = (*counter).max(slot.counter);

            if let Some(existing) = self.collections.get(&entry.collection) {
                // A rename was interrupted before the old entry was freed
                let (keep_new, stale) = if entry.last_modified > existing.entry_modified {
                    (true, existing.entry)
                } else {
                    (false, slot.location)
                };
                warn!(collection = %entry.collection, offset = stale.offset, "freeing stale directory entry");
                self.store.free(stale)?;
                if !keep_new {
                    continue;
                }
                let old_name = existing.name.clone();
                self.names.remove(&old_name);
            }

            if let Some(&other) = self.names.get(&entry.name) {
                if other != entry.collection {
                    return Err(CoreError::corrupt(
                        slot.location.offset,
                        format!("collection name {:?} is used twice", entry.name),
                    ));
                }
            }

            self.next_collection_id = self
                .next_collection_id
                .max(entry.collection.as_u32().saturating_add(1));
            self.names.insert(entry.name.clone(), entry.collection);
            let index = self
                .collections
                .remove(&entry.collection)
                .map_or_else(CollectionIndex::new, |state| state.index);
            self.collections.insert(
                entry.collection,
                CollectionState::new(&entry, slot.location, index),
            );
        }

        for (collection, counter) in counters {
            if let Some(state) = self.collections.get_mut(&collection) {
                state.index = CollectionIndex::starting_at(counter);
            }
        }

        let mut versions: HashMap<(CollectionId, DocumentId), Timestamp> = HashMap::new();
        for slot in documents {
            let body = DocumentBody::decode(slot.location.offset, &slot.body)?;
            self.clock.observe(body.last_modified);

            let Some(state) = self.collections.get_mut(&body.collection) else {
                // Left behind by an interrupted drop_collection
                warn!(collection = %body.collection, id = %body.id, "freeing orphaned document");
                self.store.free(slot.location)?;
                continue;
            };

            let key = (body.collection, body.id);
            match versions.get(&key) {
                Some(&seen) if seen >= body.last_modified => {
                    warn!(id = %body.id, offset = slot.location.offset, "freeing superseded document version");
                    self.store.free(slot.location)?;
                }
                _ => {
                    if let Some(stale) = state.index.put(body.id, slot.location) {
                        warn!(id = %body.id, offset = stale.offset, "freeing superseded document version");
                        self.store.free(stale)?;
                    }
                    versions.insert(key, body.last_modified);
                }
            }
        }

        let constrained: Vec<CollectionId> = self
            .collections
            .iter()
            .filter(|(_, state)| state.constrained())
            .map(|(&collection, _)| collection)
            .collect();
        for collection in constrained {
            self.rebuild(collection)?;
        }

        info!(
            collections = self.collections.len(),
            documents = versions.len(),
            "database recovered"
        );
        Ok(())
    }

    // ---- collections ------------------------------------------------

    pub(crate) fn create_collection(
        &mut self,
        name: &str,
        config: CollectionConfig,
    ) -> CoreResult<CollectionId> {
        validate_name(name)?;
        self.free_stale();
        if self.names.contains_key(name) {
            return Err(CoreError::already_exists(name));
        }

        let collection = CollectionId::new(self.next_collection_id);
        let entry = DirectoryEntry {
            collection,
            last_modified: self.clock.tick(),
            config,
            name: name.to_string(),
            indexes: Vec::new(),
        };
        let index = CollectionIndex::new();
        let location = self.commit_entry(&entry, index.peek_next_id(), None)?;

        self.next_collection_id += 1;
        self.names.insert(name.to_string(), collection);
        self.collections
            .insert(collection, CollectionState::new(&entry, location, index));
        info!(name, %collection, hash_unique = config.hash_unique, "created collection");
        Ok(collection)
    }

    pub(crate) fn collection_id(&self, name: &str) -> CoreResult<CollectionId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| CoreError::not_found(name))
    }

    pub(crate) fn collection(&self, collection: CollectionId) -> CoreResult<&CollectionState> {
        self.collections
            .get(&collection)
            .ok_or_else(|| CoreError::not_found(collection.to_string()))
    }

    pub(crate) fn collection_names(&self) -> Vec<String> {
        self.names.keys().cloned().collect()
    }

    pub(crate) fn drop_collection(&mut self, name: &str) -> CoreResult<()> {
        let collection = self.collection_id(name)?;
        let entry = self.collection(collection)?.entry;
        self.free_stale();

        // Freeing the directory entry is the commit point
        self.store.free(entry)?;
        self.names.remove(name);
        let Some(state) = self.collections.remove(&collection) else {
            return Ok(());
        };

        let mut orphaned = 0usize;
        for (_, location) in state.index.scan() {
            if let Err(e) = self.store.free(location) {
                warn!(error = %e, offset = location.offset, "could not free document of dropped collection");
                self.stale.push(location);
                orphaned += 1;
            }
        }
        info!(name, documents = state.index.len(), orphaned, "dropped collection");
        Ok(())
    }

    pub(crate) fn rename_collection(&mut self, from: &str, to: &str) -> CoreResult<()> {
        validate_name(to)?;
        let collection = self.collection_id(from)?;
        if from == to {
            return Ok(());
        }
        if self.names.contains_key(to) {
            return Err(CoreError::already_exists(to));
        }

        self.free_stale();
        let (old_entry, counter, config, indexes) = {
            let state = self.collection(collection)?;
            (state.entry, state.index.peek_next_id(), state.config, state.specs())
        };
        let entry = DirectoryEntry {
            collection,
            last_modified: self.clock.tick(),
            config,
            name: to.to_string(),
            indexes,
        };
        let location = self.commit_entry(&entry, counter, Some(old_entry))?;

        self.names.remove(from);
        self.names.insert(to.to_string(), collection);
        let state = state_mut(&mut self.collections, collection)?;
        state.name = to.to_string();
        state.entry = location;
        state.entry_modified = entry.last_modified;
        info!(from, to, "renamed collection");
        Ok(())
    }

    /// Adds a secondary index on `path`, filled from the stored
    /// documents. Returns false if the same index already exists.
    pub(crate) fn create_index(
        &mut self,
        collection: CollectionId,
        spec: IndexSpec,
    ) -> CoreResult<bool> {
        let state = self.collection(collection)?;
        if let Some(existing) = state.secondary.iter().find(|s| s.spec().path == spec.path) {
            if existing.spec() == &spec {
                return Ok(false);
            }
            return Err(CoreError::already_exists(format!("index {}", spec.path)));
        }
        if state.secondary.len() >= MAX_INDEXES {
            return Err(CoreError::validation(format!(
                "collection {} already has {MAX_INDEXES} indexes",
                state.name
            )));
        }

        let mut secondary = SecondaryIndex::new(spec.clone());
        for (id, location) in state.index.scan() {
            let record = self.read_record(collection, id, location)?;
            if secondary.conflict(id, &record.data).is_some() {
                return Err(CoreError::unique_violation(&state.name, &spec.path));
            }
            secondary.insert(id, &record.data);
        }

        let mut indexes = state.specs();
        indexes.push(spec);
        self.free_stale();
        self.rewrite_entry(collection, indexes)?;
        let state = state_mut(&mut self.collections, collection)?;
        info!(collection = %state.name, path = %secondary.spec().path, entries = secondary.len(), "created index");
        state.secondary.push(secondary);
        Ok(true)
    }

    /// Removes the secondary index on `path`. Returns false if there was
    /// none.
    pub(crate) fn drop_index(&mut self, collection: CollectionId, path: &str) -> CoreResult<bool> {
        let state = self.collection(collection)?;
        let Some(position) = state.secondary.iter().position(|s| s.spec().path == path) else {
            return Ok(false);
        };
        let mut indexes = state.specs();
        indexes.remove(position);
        self.free_stale();
        self.rewrite_entry(collection, indexes)?;
        let state = state_mut(&mut self.collections, collection)?;
        state.secondary.remove(position);
        info!(collection = %state.name, path, "dropped index");
        Ok(true)
    }

    pub(crate) fn indexes(&self, collection: CollectionId) -> CoreResult<Vec<IndexInfo>> {
        Ok(self
            .collection(collection)?
            .secondary
            .iter()
            .map(SecondaryIndex::info)
            .collect())
    }

    /// Rebuilds the secondary and content-hash indexes from the stored
    /// documents.
    pub(crate) fn rebuild(&mut self, collection: CollectionId) -> CoreResult<()> {
        let entries: Vec<(DocumentId, Location)> =
            self.collection(collection)?.index.scan().collect();
        {
            let state = state_mut(&mut self.collections, collection)?;
            state.hashes.clear();
            for secondary in &mut state.secondary {
                secondary.clear();
            }
        }
        for (id, location) in entries {
            let record = self.read_record(collection, id, location)?;
            let state = state_mut(&mut self.collections, collection)?;
            if state.check(id, &record.data, &record.hash).is_err() {
                warn!(collection = %state.name, %id, "stored document breaks a unique constraint");
            }
            state.track(id, &record.data, record.hash);
        }
        debug!(%collection, "rebuilt indexes");
        Ok(())
    }

    /// Writes a directory entry for `collection` with the given index
    /// definitions and retires the current one.
    fn rewrite_entry(&mut self, collection: CollectionId, indexes: Vec<IndexSpec>) -> CoreResult<()> {
        let (old_entry, counter, config, name) = {
            let state = self.collection(collection)?;
            (state.entry, state.index.peek_next_id(), state.config, state.name.clone())
        };
        let entry = DirectoryEntry {
            collection,
            last_modified: self.clock.tick(),
            config,
            name,
            indexes,
        };
        let location = self.commit_entry(&entry, counter, Some(old_entry))?;
        let state = state_mut(&mut self.collections, collection)?;
        state.entry = location;
        state.entry_modified = entry.last_modified;
        Ok(())
    }

    /// Writes `entry` to a new directory slot, then frees `old`.
    fn commit_entry(
        &mut self,
        entry: &DirectoryEntry,
        counter: u64,
        old: Option<Location>,
    ) -> CoreResult<Location> {
        let location = self.write_slot(SlotKind::Directory, counter, &entry.encode())?;
        if let Some(old) = old {
            if let Err(e) = self.store.free(old) {
                // Recovery keeps the newer entry
                warn!(error = %e, offset = old.offset, "could not free old directory entry");
                self.stale.push(old);
            }
        }
        Ok(location)
    }

    // ---- documents --------------------------------------------------

    pub(crate) fn insert(
        &mut self,
        collection: CollectionId,
        document: EncodedDocument,
    ) -> CoreResult<Record> {
        self.collection(collection)?;
        self.free_stale();
        let state = state_mut(&mut self.collections, collection)?;
        state.check(
            DocumentId::new(state.index.peek_next_id()),
            &document.data,
            &document.hash,
        )?;
        let id = state.index.next_id();
        // The id must be durable before any slot can carry it
        self.store.set_counter(state.entry, state.index.peek_next_id())?;

        let last_modified = self.clock.tick();
        let body = DocumentBody {
            collection,
            id,
            last_modified,
            hash: document.hash,
            payload: document.payload,
        };
        let location = self.write_slot(SlotKind::Document, 0, &body.encode())?;
        let state = state_mut(&mut self.collections, collection)?;
        state.index.put(id, location);
        state.track(id, &document.data, body.hash);

        Ok(Record {
            id,
            data: document.data,
            hash: body.hash,
            last_modified,
        })
    }

    /// Writes a new version of an existing document under the same id.
    pub(crate) fn rewrite(
        &mut self,
        collection: CollectionId,
        id: DocumentId,
        document: EncodedDocument,
    ) -> CoreResult<Record> {
        let old = self
            .collection(collection)?
            .index
            .get(id)
            .ok_or_else(|| self.document_not_found(collection, id))?;
        self.collection(collection)?
            .check(id, &document.data, &document.hash)?;
        self.free_stale();

        let last_modified = self.clock.tick();
        let body = DocumentBody {
            collection,
            id,
            last_modified,
            hash: document.hash,
            payload: document.payload,
        };
        let location = self.write_slot(SlotKind::Document, 0, &body.encode())?;
        let state = state_mut(&mut self.collections, collection)?;
        state.index.put(id, location);
        state.track(id, &document.data, body.hash);

        if let Err(e) = self.store.free(old) {
            // Recovery keeps the newer version
            warn!(error = %e, offset = old.offset, "could not free previous document version");
            self.stale.push(old);
        }

        Ok(Record {
            id,
            data: document.data,
            hash: body.hash,
            last_modified,
        })
    }

    /// Deletes a document. Returns false if there is no such id.
    pub(crate) fn remove(&mut self, collection: CollectionId, id: DocumentId) -> CoreResult<bool> {
        self.collection(collection)?;
        self.free_stale();
        let state = state_mut(&mut self.collections, collection)?;
        let Some(location) = state.index.get(id) else {
            return Ok(false);
        };
        self.store.free(location)?;
        state.index.remove(id);
        state.untrack(id);
        Ok(true)
    }

    pub(crate) fn get(&self, collection: CollectionId, id: DocumentId) -> CoreResult<Option<Record>> {
        match self.collection(collection)?.index.get(id) {
            Some(location) => self.read_record(collection, id, location).map(Some),
            None => Ok(None),
        }
    }

    /// The next document after `after` in id order.
    pub(crate) fn next_after(
        &self,
        collection: CollectionId,
        after: Option<DocumentId>,
    ) -> CoreResult<Option<(DocumentId, Location)>> {
        Ok(self.collection(collection)?.index.next_after(after))
    }

    pub(crate) fn read_record(
        &self,
        collection: CollectionId,
        id: DocumentId,
        location: Location,
    ) -> CoreResult<Record> {
        let raw = self.store.read(location, SlotKind::Document)?;
        let body = DocumentBody::decode(location.offset, &raw)?;
        if body.collection != collection || body.id != id {
            return Err(CoreError::corrupt(
                location.offset,
                format!(
                    "slot holds {} document {}, expected {collection} document {id}",
                    body.collection, body.id
                ),
            ));
        }
        body.into_record(location.offset)
    }

    /// Matching records in id order, up to `limit`.
    pub(crate) fn matching(
        &self,
        collection: CollectionId,
        predicate: &Predicate,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Record>> {
        let mut out = Vec::new();
        for (id, location) in self.collection(collection)?.candidates(predicate) {
            if limit.is_some_and(|limit| out.len() >= limit) {
                break;
            }
            let record = self.read_record(collection, id, location)?;
            if predicate.matches(&record.data) {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Number of matching records, decoding one at a time.
    pub(crate) fn count_matching(
        &self,
        collection: CollectionId,
        predicate: &Predicate,
    ) -> CoreResult<u64> {
        let mut count = 0u64;
        for (id, location) in self.collection(collection)?.candidates(predicate) {
            if predicate.matches(&self.read_record(collection, id, location)?.data) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Distinct values of the field at `path` among matching records, in
    /// order of first appearance. Records without the field, or with
    /// `Null` there, contribute nothing.
    pub(crate) fn distinct(
        &self,
        collection: CollectionId,
        path: &[String],
        predicate: &Predicate,
    ) -> CoreResult<Vec<Value>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (id, location) in self.collection(collection)?.candidates(predicate) {
            let record = self.read_record(collection, id, location)?;
            if !predicate.matches(&record.data) {
                continue;
            }
            match resolve(&record.data, path) {
                None | Some(Value::Null) => {}
                Some(value) => {
                    if key_of(value).is_some_and(|key| seen.insert(key)) {
                        out.push(value.clone());
                    }
                }
            }
        }
        Ok(out)
    }

    // ---- file -------------------------------------------------------

    pub(crate) fn header(&self) -> FileHeader {
        self.store.header()
    }

    pub(crate) fn space(&self) -> CoreResult<SpaceStats> {
        self.store.space()
    }

    pub(crate) fn document_count(&self) -> usize {
        self.collections.values().map(|state| state.index.len()).sum()
    }

    pub(crate) fn sync(&mut self) -> CoreResult<()> {
        self.store.sync()
    }

    /// Retries freeing superseded slots, so that a later delete or drop
    /// cannot leave an older version behind to be recovered.
    fn free_stale(&mut self) {
        let mut kept = Vec::new();
        for location in std::mem::take(&mut self.stale) {
            if let Err(e) = self.store.free(location) {
                warn!(error = %e, offset = location.offset, "could not free stale slot");
                kept.push(location);
            }
        }
        self.stale = kept;
    }

    fn write_slot(&mut self, kind: SlotKind, counter: u64, body: &[u8]) -> CoreResult<Location> {
        let location = self.store.allocate(body.len())?;
        if let Err(e) = self.store.write(location, kind, counter, body) {
            warn!(error = %e, offset = location.offset, "slot write failed");
            if let Err(release) = self.store.release(location) {
                warn!(error = %release, offset = location.offset, "releasing failed slot failed");
            }
            return Err(e);
        }
        Ok(location)
    }

    fn document_not_found(&self, collection: CollectionId, id: DocumentId) -> CoreError {
        let name = self
            .collections
            .get(&collection)
            .map_or_else(|| collection.to_string(), |state| state.name.clone());
        CoreError::DocumentNotFound {
            collection: name,
            id: id.as_u64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoardbase_codec::doc;
    use hoardbase_storage::{FileBackend, InMemoryBackend, OpenMode};
    use std::path::Path;
    use tempfile::tempdir;

    fn memory_engine() -> Engine {
        Engine::create(Box::new(InMemoryBackend::new()), &Config::default()).unwrap()
    }

    fn file_engine(path: &Path) -> Engine {
        let backend = FileBackend::open(path, OpenMode::OpenOrCreate).unwrap();
        if backend.size().unwrap() == 0 {
            Engine::create(Box::new(backend), &Config::default()).unwrap()
        } else {
            Engine::open(Box::new(backend), &Config::default()).unwrap()
        }
    }

    fn encoded(n: i64) -> EncodedDocument {
        EncodedDocument::new(doc! { "n" => n }).unwrap()
    }

    #[test]
    fn insert_and_get() {
        let mut engine = memory_engine();
        let users = engine.create_collection("users", CollectionConfig::default()).unwrap();
        let record = engine.insert(users, encoded(1)).unwrap();
        assert_eq!(record.id, DocumentId::new(1));

        let fetched = engine.get(users, record.id).unwrap().unwrap();
        assert_eq!(fetched, record);
        assert_eq!(engine.get(users, DocumentId::new(2)).unwrap(), None);
    }

    #[test]
    fn collections_have_independent_ids() {
        let mut engine = memory_engine();
        let a = engine.create_collection("a", CollectionConfig::default()).unwrap();
        let b = engine.create_collection("b", CollectionConfig::default()).unwrap();
        engine.insert(a, encoded(1)).unwrap();
        engine.insert(a, encoded(2)).unwrap();
        assert_eq!(engine.insert(b, encoded(3)).unwrap().id, DocumentId::new(1));
    }

    #[test]
    fn duplicate_collection_rejected() {
        let mut engine = memory_engine();
        engine.create_collection("users", CollectionConfig::default()).unwrap();
        assert!(matches!(
            engine.create_collection("users", CollectionConfig::default()),
            Err(CoreError::AlreadyExists { .. })
        ));
        assert!(matches!(
            engine.create_collection("", CollectionConfig::default()),
            Err(CoreError::Validation { .. })
        ));
    }

    #[test]
    fn rewrite_keeps_id_and_frees_old_slot() {
        let mut engine = memory_engine();
        let users = engine.create_collection("users", CollectionConfig::default()).unwrap();
        let first = engine.insert(users, encoded(1)).unwrap();
        let before = engine.space().unwrap().free_slots;

        let second = engine.rewrite(users, first.id, encoded(2)).unwrap();
        assert_eq!(second.id, first.id);
        assert_ne!(second.hash, first.hash);
        assert!(second.last_modified > first.last_modified);
        assert_eq!(engine.space().unwrap().free_slots, before + 1);
    }

    #[test]
    fn rewrite_missing_document() {
        let mut engine = memory_engine();
        let users = engine.create_collection("users", CollectionConfig::default()).unwrap();
        assert!(matches!(
            engine.rewrite(users, DocumentId::new(9), encoded(1)),
            Err(CoreError::DocumentNotFound { id: 9, .. })
        ));
    }

    #[test]
    fn remove_then_ids_keep_increasing() {
        let mut engine = memory_engine();
        let users = engine.create_collection("users", CollectionConfig::default()).unwrap();
        let a = engine.insert(users, encoded(1)).unwrap();
        assert!(engine.remove(users, a.id).unwrap());
        assert!(!engine.remove(users, a.id).unwrap());
        assert_eq!(engine.insert(users, encoded(2)).unwrap().id, DocumentId::new(2));
    }

    #[test]
    fn matching_respects_limit() {
        let mut engine = memory_engine();
        let users = engine.create_collection("users", CollectionConfig::default()).unwrap();
        for n in 0..5 {
            engine.insert(users, encoded(n % 2)).unwrap();
        }
        let predicate = Predicate::all().and_eq("n", 0);
        assert_eq!(engine.matching(users, &predicate, None).unwrap().len(), 3);
        assert_eq!(engine.matching(users, &predicate, Some(1)).unwrap().len(), 1);
    }

    #[test]
    fn count_matching_agrees_with_matching() {
        let mut engine = memory_engine();
        let users = engine.create_collection("users", CollectionConfig::default()).unwrap();
        for n in 0..7 {
            engine.insert(users, encoded(n % 3)).unwrap();
        }
        let predicate = Predicate::all().and_eq("n", 1);
        assert_eq!(engine.count_matching(users, &predicate).unwrap(), 2);
        assert_eq!(engine.count_matching(users, &Predicate::all()).unwrap(), 7);
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.hoard");
        {
            let mut engine = file_engine(&path);
            let users = engine.create_collection("users", CollectionConfig::default()).unwrap();
            engine.insert(users, encoded(1)).unwrap();
            let b = engine.insert(users, encoded(2)).unwrap();
            engine.remove(users, b.id).unwrap();
            engine.create_collection("empty", CollectionConfig::default()).unwrap();
        }

        let mut engine = file_engine(&path);
        assert_eq!(engine.collection_names(), vec!["empty", "users"]);
        let users = engine.collection_id("users").unwrap();
        assert_eq!(engine.collection(users).unwrap().index.len(), 1);
        // Id 2 was used and deleted; it is not handed out again
        assert_eq!(engine.insert(users, encoded(3)).unwrap().id, DocumentId::new(3));
    }

    #[test]
    fn rename_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.hoard");
        {
            let mut engine = file_engine(&path);
            let users = engine.create_collection("users", CollectionConfig::default()).unwrap();
            engine.insert(users, encoded(1)).unwrap();
            engine.rename_collection("users", "people").unwrap();
        }

        let mut engine = file_engine(&path);
        assert_eq!(engine.collection_names(), vec!["people"]);
        let people = engine.collection_id("people").unwrap();
        assert_eq!(engine.insert(people, encoded(2)).unwrap().id, DocumentId::new(2));
    }

    #[test]
    fn dropped_collection_stays_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.hoard");
        {
            let mut engine = file_engine(&path);
            let users = engine.create_collection("users", CollectionConfig::default()).unwrap();
            engine.insert(users, encoded(1)).unwrap();
            engine.drop_collection("users").unwrap();
            assert!(matches!(
                engine.collection_id("users"),
                Err(CoreError::NotFound { .. })
            ));
        }

        let engine = file_engine(&path);
        assert!(engine.collection_names().is_empty());
        assert_eq!(engine.document_count(), 0);
    }

    #[test]
    fn timestamps_keep_increasing_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.hoard");
        let last;
        {
            let mut engine = file_engine(&path);
            let users = engine.create_collection("users", CollectionConfig::default()).unwrap();
            last = engine.insert(users, encoded(1)).unwrap().last_modified;
        }

        let mut engine = file_engine(&path);
        let users = engine.collection_id("users").unwrap();
        assert!(engine.insert(users, encoded(2)).unwrap().last_modified > last);
    }

    #[test]
    fn unique_rejection_consumes_no_id() {
        let mut engine = memory_engine();
        let tags = engine
            .create_collection("tags", CollectionConfig::new().hash_unique(true))
            .unwrap();
        engine.insert(tags, encoded(1)).unwrap();
        assert!(matches!(
            engine.insert(tags, encoded(1)),
            Err(CoreError::UniqueViolation { .. })
        ));
        assert_eq!(engine.insert(tags, encoded(2)).unwrap().id, DocumentId::new(2));
    }

    #[test]
    fn index_narrows_candidates() {
        let mut engine = memory_engine();
        let users = engine.create_collection("users", CollectionConfig::default()).unwrap();
        for n in 0..6 {
            engine.insert(users, encoded(n % 3)).unwrap();
        }
        assert!(engine
            .create_index(users, IndexSpec::new("n", false).unwrap())
            .unwrap());

        let predicate = Predicate::all().and_eq("n", 2);
        let state = engine.collection(users).unwrap();
        let ids: Vec<u64> = state.candidates(&predicate).map(|(id, _)| id.as_u64()).collect();
        assert_eq!(ids, vec![3, 6]);
        assert_eq!(engine.count_matching(users, &predicate).unwrap(), 2);
    }

    #[test]
    fn config_and_indexes_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.hoard");
        {
            let mut engine = file_engine(&path);
            let users = engine
                .create_collection("users", CollectionConfig::new().hash_unique(true))
                .unwrap();
            engine.insert(users, encoded(1)).unwrap();
            engine
                .create_index(users, IndexSpec::new("n", true).unwrap())
                .unwrap();
            engine.rename_collection("users", "people").unwrap();
        }

        let mut engine = file_engine(&path);
        let people = engine.collection_id("people").unwrap();
        let state = engine.collection(people).unwrap();
        assert!(state.config.hash_unique);
        assert_eq!(state.specs(), vec![IndexSpec::new("n", true).unwrap()]);
        assert_eq!(engine.indexes(people).unwrap()[0].entries, 1);

        assert!(matches!(
            engine.insert(people, encoded(1)),
            Err(CoreError::UniqueViolation { .. })
        ));
        let with_extra = EncodedDocument::new(doc! { "n" => 1, "x" => true }).unwrap();
        assert!(matches!(
            engine.insert(people, with_extra),
            Err(CoreError::UniqueViolation { constraint, .. }) if constraint == "n"
        ));
    }
}
