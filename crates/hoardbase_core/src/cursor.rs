//! Lazy result streaming.

use crate::database::Shared;
use crate::error::CoreResult;
use crate::query::Predicate;
use crate::record::Record;
use crate::types::{CollectionId, DocumentId};
use std::iter::FusedIterator;
use std::sync::Arc;

/// Paging for [`Collection::find_with_options`](crate::Collection::find_with_options).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Number of matching records to pass over before yielding.
    pub skip: usize,
    /// Largest number of records to yield.
    pub limit: Option<usize>,
}

impl FindOptions {
    /// No skip, no limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of matches to skip.
    #[must_use]
    pub const fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Sets the maximum number of records to yield.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A lazy, forward-only walk over the records of one collection that
/// match a predicate, in ascending id order.
///
/// The cursor holds no buffered results, only the last id it visited
/// and the first id the collection had not yet handed out when the
/// cursor was created. Each step takes the database read lock, finds the
/// next id after that position, and reads and tests that one record.
///
/// Records inserted after the cursor was created are never yielded, so a
/// cursor always ends, even when its consumer inserts as it goes. Other
/// writes between steps are seen: deleted records are skipped and
/// updated ones are yielded with their new contents.
///
/// Once the cursor returns `None` or an error it stays exhausted.
#[derive(Debug)]
pub struct Cursor {
    shared: Arc<Shared>,
    collection: CollectionId,
    predicate: Predicate,
    position: Option<DocumentId>,
    /// Ids from here on were issued after the cursor was created.
    end: DocumentId,
    skip: usize,
    remaining: Option<usize>,
    finished: bool,
}

impl Cursor {
    pub(crate) fn new(
        shared: Arc<Shared>,
        collection: CollectionId,
        predicate: Predicate,
        end: DocumentId,
        options: FindOptions,
    ) -> Self {
        Self {
            shared,
            collection,
            predicate,
            position: None,
            end,
            skip: options.skip,
            remaining: options.limit,
            finished: false,
        }
    }

    /// The id of the last record examined, matching or not.
    #[must_use]
    pub fn position(&self) -> Option<DocumentId> {
        self.position
    }

    /// Advances to the next matching record.
    fn step(&mut self) -> CoreResult<Option<Record>> {
        loop {
            let collection = self.collection;
            let position = self.position;
            let end = self.end;
            let candidate = self.shared.read(|engine| {
                match engine.next_after(collection, position)? {
                    Some((id, location)) if id < end => engine
                        .read_record(collection, id, location)
                        .map(Some),
                    _ => Ok(None),
                }
            })?;

            let Some(record) = candidate else {
                return Ok(None);
            };
            self.position = Some(record.id);
            if self.predicate.matches(&record.data) {
                return Ok(Some(record));
            }
        }
    }
}

impl Iterator for Cursor {
    type Item = CoreResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            if self.remaining == Some(0) {
                self.finished = true;
                break;
            }
            match self.step() {
                Ok(Some(record)) => {
                    if self.skip > 0 {
                        self.skip -= 1;
                        continue;
                    }
                    if let Some(remaining) = &mut self.remaining {
                        *remaining -= 1;
                    }
                    return Some(Ok(record));
                }
                Ok(None) => self.finished = true,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

impl FusedIterator for Cursor {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CoreError, Database};
    use hoardbase_codec::doc;

    fn seeded() -> (Database, crate::Collection) {
        let db = Database::open_in_memory().unwrap();
        let items = db.create_collection("items").unwrap();
        for n in 1..=6 {
            items
                .insert_one(doc! { "n" => n, "even" => n % 2 == 0 })
                .unwrap();
        }
        (db, items)
    }

    fn ns(cursor: Cursor) -> Vec<i64> {
        cursor
            .map(|r| r.unwrap().data.get("n").and_then(|v| v.as_integer()).unwrap())
            .collect()
    }

    #[test]
    fn yields_matches_in_id_order() {
        let (_db, items) = seeded();
        let cursor = items.find(doc! { "even" => true }).unwrap();
        assert_eq!(ns(cursor), vec![2, 4, 6]);
    }

    #[test]
    fn skip_and_limit() {
        let (_db, items) = seeded();
        let options = FindOptions::new().skip(1).limit(3);
        let cursor = items.find_with_options(Predicate::all(), options).unwrap();
        assert_eq!(ns(cursor), vec![2, 3, 4]);

        let none = items
            .find_with_options(Predicate::all(), FindOptions::new().limit(0))
            .unwrap();
        assert!(ns(none).is_empty());
    }

    #[test]
    fn sees_writes_between_steps() {
        let (_db, items) = seeded();
        let mut cursor = items.find(Predicate::all()).unwrap();
        assert_eq!(cursor.next().unwrap().unwrap().id, DocumentId::new(1));

        items.delete(DocumentId::new(2)).unwrap();
        items
            .replace_one(doc! { "n" => 3 }, doc! { "n" => 30 })
            .unwrap();

        assert_eq!(ns(cursor), vec![30, 4, 5, 6]);
    }

    #[test]
    fn inserts_after_creation_are_not_yielded() {
        let (_db, items) = seeded();
        let mut cursor = items.find(Predicate::all()).unwrap();
        items.insert_one(doc! { "n" => 7 }).unwrap();

        let mut seen = Vec::new();
        while let Some(record) = cursor.next() {
            let record = record.unwrap();
            // Copying each record to the end must not chase its own tail
            items.insert_one(record.data.clone()).unwrap();
            seen.push(record.id.as_u64());
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(items.count_documents(Predicate::all()).unwrap(), 13);
    }

    #[test]
    fn cursor_on_empty_collection_ignores_later_inserts() {
        let db = Database::open_in_memory().unwrap();
        let items = db.create_collection("items").unwrap();
        let mut cursor = items.find(Predicate::all()).unwrap();
        items.insert_one(doc! { "n" => 1 }).unwrap();
        assert!(cursor.next().is_none());
    }

    #[test]
    fn position_tracks_last_examined() {
        let (_db, items) = seeded();
        let mut cursor = items.find(doc! { "n" => 3 }).unwrap();
        assert_eq!(cursor.position(), None);
        cursor.next().unwrap().unwrap();
        assert_eq!(cursor.position(), Some(DocumentId::new(3)));
        assert!(cursor.next().is_none());
        assert_eq!(cursor.position(), Some(DocumentId::new(6)));
    }

    #[test]
    fn closed_database_ends_cursor_with_error() {
        let (db, items) = seeded();
        let mut cursor = items.find(Predicate::all()).unwrap();
        cursor.next().unwrap().unwrap();

        db.close().unwrap();
        assert!(matches!(cursor.next(), Some(Err(CoreError::DatabaseClosed))));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn dropped_collection_ends_cursor_with_not_found() {
        let (db, items) = seeded();
        let mut cursor = items.find(Predicate::all()).unwrap();
        db.drop_collection("items").unwrap();
        assert!(matches!(cursor.next(), Some(Err(CoreError::NotFound { .. }))));
    }
}
