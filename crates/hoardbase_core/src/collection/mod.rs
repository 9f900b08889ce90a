//! Collection handles.

mod config;

pub use config::CollectionConfig;

use crate::cursor::{Cursor, FindOptions};
use crate::database::Shared;
use crate::error::CoreResult;
use crate::index::{field_path, IndexInfo, IndexSpec};
use crate::query::Predicate;
use crate::record::{EncodedDocument, InsertResult, Record};
use crate::types::{CollectionId, DocumentId};
use hoardbase_codec::{Document, Value};
use std::sync::Arc;

/// A handle to one collection of a [`Database`](crate::Database).
///
/// Handles are cheap to clone and stay valid across renames. Once the
/// collection is dropped every call fails with `NotFound`, and once the
/// database is closed with `DatabaseClosed`.
///
/// Every mutating call holds the database write lock for its whole
/// duration, so each call is atomic with respect to other calls.
#[derive(Debug, Clone)]
pub struct Collection {
    shared: Arc<Shared>,
    id: CollectionId,
}

impl Collection {
    pub(crate) fn new(shared: Arc<Shared>, id: CollectionId) -> Self {
        Self { shared, id }
    }

    /// The collection's internal id.
    #[must_use]
    pub fn id(&self) -> CollectionId {
        self.id
    }

    /// The collection's current name.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the collection was dropped.
    pub fn name(&self) -> CoreResult<String> {
        self.shared
            .read(|engine| Ok(engine.collection(self.id)?.name.clone()))
    }

    /// The settings the collection was created with.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the collection was dropped.
    pub fn config(&self) -> CoreResult<CollectionConfig> {
        self.shared.read(|engine| Ok(engine.collection(self.id)?.config))
    }

    /// Stores a new document and assigns it the next id.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the document cannot be stored (NaN, bad
    /// field names, too deep), `UniqueViolation` if it repeats a unique
    /// value, or an I/O error. Nothing is stored on error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use hoardbase_codec::doc;
    /// use hoardbase_core::Database;
    ///
    /// let db = Database::open_in_memory()?;
    /// let users = db.create_collection("users")?;
    /// let result = users.insert_one(doc! { "name" => "test" })?;
    /// assert_eq!(result.id.as_u64(), 1);
    /// # Ok::<(), hoardbase_core::CoreError>(())
    /// ```
    pub fn insert_one(&self, data: Document) -> CoreResult<InsertResult> {
        let document = EncodedDocument::new(data)?;
        self.shared.write(|engine| {
            engine
                .insert(self.id, document)
                .map(|record| InsertResult::from(&record))
        })
    }

    /// Stores several documents, in order.
    ///
    /// Every document is validated before anything is written. A unique
    /// violation or an I/O error stops the batch; documents written before
    /// it stay stored.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if any document is invalid, or the first
    /// `UniqueViolation` or I/O error.
    pub fn insert_many<I>(&self, documents: I) -> CoreResult<Vec<InsertResult>>
    where
        I: IntoIterator<Item = Document>,
    {
        let encoded = documents
            .into_iter()
            .map(EncodedDocument::new)
            .collect::<CoreResult<Vec<_>>>()?;

        self.shared.write(|engine| {
            let mut results = Vec::with_capacity(encoded.len());
            for document in encoded {
                let record = engine.insert(self.id, document)?;
                results.push(InsertResult::from(&record));
            }
            Ok(results)
        })
    }

    /// Returns a lazy cursor over matching records in id order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the collection was dropped.
    pub fn find(&self, predicate: impl Into<Predicate>) -> CoreResult<Cursor> {
        self.find_with_options(predicate, FindOptions::default())
    }

    /// Like [`find`](Self::find), with skip and limit.
    ///
    /// The cursor covers the records present now; documents inserted
    /// while it is open are not yielded.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the collection was dropped.
    pub fn find_with_options(
        &self,
        predicate: impl Into<Predicate>,
        options: FindOptions,
    ) -> CoreResult<Cursor> {
        let end = self
            .shared
            .read(|engine| Ok(engine.collection(self.id)?.index.peek_next_id()))?;
        Ok(Cursor::new(
            Arc::clone(&self.shared),
            self.id,
            predicate.into(),
            DocumentId::new(end),
            options,
        ))
    }

    /// Streams matching records to `sink`.
    ///
    /// `sink` receives each record together with an `is_last` flag that is
    /// true exactly once, for the final record delivered. With no matches
    /// `sink` is never called.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the collection was dropped, or the first read
    /// error. Every match read before the error is delivered first, the
    /// last of them with `is_last` set.
    pub fn find_with<F>(&self, predicate: impl Into<Predicate>, mut sink: F) -> CoreResult<()>
    where
        F: FnMut(Record, bool),
    {
        let mut cursor = self.find(predicate)?;
        let Some(first) = cursor.next() else {
            return Ok(());
        };
        let mut pending = first?;
        for next in cursor {
            match next {
                Ok(next) => sink(std::mem::replace(&mut pending, next), false),
                Err(e) => {
                    sink(pending, true);
                    return Err(e);
                }
            }
        }
        sink(pending, true);
        Ok(())
    }

    /// The first matching record, if any.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the collection was dropped, or a read error.
    pub fn find_one(&self, predicate: impl Into<Predicate>) -> CoreResult<Option<Record>> {
        self.find(predicate)?.next().transpose()
    }

    /// The record with the given id, if it exists.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the collection was dropped, or a read error.
    pub fn get(&self, id: DocumentId) -> CoreResult<Option<Record>> {
        self.shared.read(|engine| engine.get(self.id, id))
    }

    /// Number of matching records.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the collection was dropped, or a read error.
    pub fn count_documents(&self, predicate: impl Into<Predicate>) -> CoreResult<u64> {
        let predicate = predicate.into();
        self.shared.read(|engine| {
            if predicate.is_empty() {
                return Ok(engine.collection(self.id)?.index.len() as u64);
            }
            engine.count_matching(self.id, &predicate)
        })
    }

    /// Distinct values of the field at `path` among matching records, in
    /// order of first appearance.
    ///
    /// Values compare as in queries, so `1` and `1.0` are both kept.
    /// Records without the field, or with `Null` there, are not counted.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed path, `NotFound` if the
    /// collection was dropped, or a read error.
    pub fn distinct(&self, path: &str, predicate: impl Into<Predicate>) -> CoreResult<Vec<Value>> {
        let path = field_path(path)?;
        let predicate = predicate.into();
        self.shared
            .read(|engine| engine.distinct(self.id, &path, &predicate))
    }

    /// Adds an equality index on the field at `path`.
    ///
    /// Queries with an equality on `path` then read only the records the
    /// index names. With `unique`, no two documents may hold the same
    /// non-null value there. Returns false if an identical index already
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed path or too many indexes,
    /// `AlreadyExists` if `path` is indexed with the other uniqueness,
    /// `UniqueViolation` if stored documents already repeat a value,
    /// `NotFound` if the collection was dropped, or an I/O error.
    pub fn create_index(&self, path: &str, unique: bool) -> CoreResult<bool> {
        let spec = IndexSpec::new(path, unique)?;
        self.shared
            .write(|engine| engine.create_index(self.id, spec))
    }

    /// Removes the index on `path`. Returns false if there was none.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the collection was dropped, or an I/O error.
    pub fn drop_index(&self, path: &str) -> CoreResult<bool> {
        self.shared.write(|engine| engine.drop_index(self.id, path))
    }

    /// The collection's secondary indexes, in creation order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the collection was dropped.
    pub fn indexes(&self) -> CoreResult<Vec<IndexInfo>> {
        self.shared.read(|engine| engine.indexes(self.id))
    }

    /// Rebuilds the secondary and content-hash indexes from the stored
    /// documents.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the collection was dropped, or a read error.
    pub fn reindex(&self) -> CoreResult<()> {
        self.shared.write(|engine| engine.rebuild(self.id))
    }

    /// Deletes the document with the given id. Returns false if there was
    /// none.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the collection was dropped, or an I/O error.
    pub fn delete(&self, id: DocumentId) -> CoreResult<bool> {
        self.shared.write(|engine| engine.remove(self.id, id))
    }

    /// Deletes the first matching document. Returns false if nothing
    /// matched.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the collection was dropped, or an I/O error.
    pub fn delete_one(&self, predicate: impl Into<Predicate>) -> CoreResult<bool> {
        self.find_one_and_delete(predicate).map(|deleted| deleted.is_some())
    }

    /// Deletes every matching document and returns how many were deleted.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the collection was dropped, or the first I/O
    /// error; documents deleted before it stay deleted.
    pub fn delete_many(&self, predicate: impl Into<Predicate>) -> CoreResult<u64> {
        let predicate = predicate.into();
        self.shared.write(|engine| {
            let matches = engine.matching(self.id, &predicate, None)?;
            let mut deleted = 0u64;
            for record in matches {
                if engine.remove(self.id, record.id)? {
                    deleted += 1;
                }
            }
            Ok(deleted)
        })
    }

    /// Deletes the first matching document and returns it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the collection was dropped, or an I/O error.
    pub fn find_one_and_delete(&self, predicate: impl Into<Predicate>) -> CoreResult<Option<Record>> {
        let predicate = predicate.into();
        self.shared.write(|engine| {
            let Some(record) = engine.matching(self.id, &predicate, Some(1))?.pop() else {
                return Ok(None);
            };
            engine.remove(self.id, record.id)?;
            Ok(Some(record))
        })
    }

    /// Replaces the first matching document, keeping its id.
    ///
    /// Returns the new record, or `None` if nothing matched.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the replacement cannot be stored,
    /// `UniqueViolation` if it repeats a unique value, `NotFound` if the
    /// collection was dropped, or an I/O error.
    pub fn replace_one(
        &self,
        predicate: impl Into<Predicate>,
        replacement: Document,
    ) -> CoreResult<Option<Record>> {
        let predicate = predicate.into();
        let document = EncodedDocument::new(replacement)?;
        self.shared.write(|engine| {
            let Some(current) = engine.matching(self.id, &predicate, Some(1))?.pop() else {
                return Ok(None);
            };
            engine.rewrite(self.id, current.id, document).map(Some)
        })
    }

    /// Applies a merge patch to the first matching document.
    ///
    /// `Null` in the patch removes a field, nested maps merge, and other
    /// values replace. With `upsert`, a missing match inserts the patch
    /// applied to an empty document. Returns the written record, or `None`
    /// if nothing matched and nothing was inserted.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the patched document cannot be stored,
    /// `UniqueViolation` if it repeats a unique value, `NotFound` if the
    /// collection was dropped, or an I/O error.
    pub fn update_one(
        &self,
        predicate: impl Into<Predicate>,
        patch: &Document,
        upsert: bool,
    ) -> CoreResult<Option<Record>> {
        let predicate = predicate.into();
        self.shared.write(|engine| {
            match engine.matching(self.id, &predicate, Some(1))?.pop() {
                Some(current) => {
                    let document = EncodedDocument::new(patched(current.data, patch))?;
                    engine.rewrite(self.id, current.id, document).map(Some)
                }
                None if upsert => {
                    let document = EncodedDocument::new(patched(Document::new(), patch))?;
                    engine.insert(self.id, document).map(Some)
                }
                None => Ok(None),
            }
        })
    }

    /// Applies a merge patch to every matching document.
    ///
    /// All patched documents are validated before any is written. With
    /// `upsert` and no match, the patch applied to an empty document is
    /// inserted. Returns the number of documents written.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if any patched document cannot be stored,
    /// `NotFound` if the collection was dropped, or the first
    /// `UniqueViolation` or I/O error; documents written before it stay
    /// written.
    pub fn update_many(
        &self,
        predicate: impl Into<Predicate>,
        patch: &Document,
        upsert: bool,
    ) -> CoreResult<u64> {
        let predicate = predicate.into();
        self.shared.write(|engine| {
            let matches = engine.matching(self.id, &predicate, None)?;
            if matches.is_empty() {
                if !upsert {
                    return Ok(0);
                }
                let document = EncodedDocument::new(patched(Document::new(), patch))?;
                engine.insert(self.id, document)?;
                return Ok(1);
            }

            let updates = matches
                .into_iter()
                .map(|record| -> CoreResult<_> {
                    Ok((record.id, EncodedDocument::new(patched(record.data, patch))?))
                })
                .collect::<CoreResult<Vec<_>>>()?;

            let mut written = 0u64;
            for (id, document) in updates {
                engine.rewrite(self.id, id, document)?;
                written += 1;
            }
            Ok(written)
        })
    }
}

fn patched(mut data: Document, patch: &Document) -> Document {
    data.merge_patch(patch);
    data
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared) && self.id == other.id
    }
}

impl Eq for Collection {}

#[cfg(test)]
mod tests;
