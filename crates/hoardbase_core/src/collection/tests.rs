use super::*;
use crate::{CollectionConfig, CoreError, Database, IndexInfo};
use hoardbase_codec::{doc, fingerprint, encode_document, Value};

fn users() -> (Database, Collection) {
    let db = Database::open_in_memory().unwrap();
    let users = db.create_collection("users").unwrap();
    (db, users)
}

fn seeded() -> (Database, Collection) {
    let (db, users) = users();
    users
        .insert_many(vec![
            doc! { "name" => "ada", "role" => "admin", "age" => 36 },
            doc! { "name" => "bob", "role" => "user", "age" => 25 },
            doc! { "name" => "cy", "role" => "user", "age" => 41 },
        ])
        .unwrap();
    (db, users)
}

fn names(records: &[Record]) -> Vec<&str> {
    records
        .iter()
        .filter_map(|r| r.data.get("name").and_then(Value::as_text))
        .collect()
}

#[test]
fn insert_assigns_sequential_ids_and_hash() {
    let (_db, users) = users();
    let data = doc! { "name" => "test" };
    let first = users.insert_one(data.clone()).unwrap();
    let second = users.insert_one(data.clone()).unwrap();

    assert_eq!(first.id, DocumentId::new(1));
    assert_eq!(second.id, DocumentId::new(2));
    // Equal data, equal fingerprint
    assert_eq!(first.hash, second.hash);
    assert_eq!(first.hash, fingerprint(&encode_document(&data).unwrap()));
    assert!(second.last_modified > first.last_modified);
}

#[test]
fn insert_many_validates_before_writing() {
    let (_db, users) = users();
    let result = users.insert_many(vec![
        doc! { "ok" => 1 },
        doc! { "bad" => f64::NAN },
    ]);
    assert!(matches!(result, Err(CoreError::Validation { .. })));
    assert_eq!(users.count_documents(doc! {}).unwrap(), 0);
}

#[test]
fn invalid_document_is_not_stored() {
    let (_db, users) = users();
    assert!(matches!(
        users.insert_one(doc! { "x" => f64::NAN }),
        Err(CoreError::Validation { .. })
    ));
    // No id was consumed either
    assert_eq!(users.insert_one(doc! { "x" => 1.5 }).unwrap().id, DocumentId::new(1));
}

#[test]
fn find_with_flags_last_record_once() {
    let (_db, users) = seeded();
    let mut seen = Vec::new();
    users
        .find_with(doc! { "role" => "user" }, |record, is_last| {
            seen.push((record.id.as_u64(), is_last));
        })
        .unwrap();
    assert_eq!(seen, vec![(2, false), (3, true)]);

    let mut single = Vec::new();
    users
        .find_with(doc! { "name" => "ada" }, |record, is_last| {
            single.push((record.id.as_u64(), is_last));
        })
        .unwrap();
    assert_eq!(single, vec![(1, true)]);
}

#[test]
fn find_with_delivers_pending_record_before_error() {
    let (db, users) = seeded();
    let mut seen = Vec::new();
    let result = users.find_with(Predicate::all(), |record, is_last| {
        if seen.is_empty() {
            db.drop_collection("users").unwrap();
        }
        seen.push((record.id.as_u64(), is_last));
    });
    assert!(matches!(result, Err(CoreError::NotFound { .. })));
    assert_eq!(seen, vec![(1, false), (2, true)]);
}

#[test]
fn find_with_ends_when_sink_inserts() {
    let (_db, users) = seeded();
    let mut seen = Vec::new();
    users
        .find_with(Predicate::all(), |record, is_last| {
            users.insert_one(record.data).unwrap();
            seen.push((record.id.as_u64(), is_last));
        })
        .unwrap();
    assert_eq!(seen, vec![(1, false), (2, false), (3, true)]);
    assert_eq!(users.count_documents(Predicate::all()).unwrap(), 6);
}

#[test]
fn find_with_no_match_never_calls_sink() {
    let (_db, users) = seeded();
    let mut calls = 0;
    users
        .find_with(doc! { "role" => "owner" }, |_, _| calls += 1)
        .unwrap();
    assert_eq!(calls, 0);
}

#[test]
fn find_one_get_and_count() {
    let (_db, users) = seeded();
    let bob = users.find_one(doc! { "name" => "bob" }).unwrap().unwrap();
    assert_eq!(bob.id, DocumentId::new(2));
    assert_eq!(users.get(bob.id).unwrap(), Some(bob));
    assert_eq!(users.get(DocumentId::new(99)).unwrap(), None);
    assert_eq!(users.find_one(doc! { "name" => "zed" }).unwrap(), None);

    assert_eq!(users.count_documents(doc! {}).unwrap(), 3);
    assert_eq!(users.count_documents(doc! { "role" => "user" }).unwrap(), 2);
}

#[test]
fn values_compare_strictly_by_type() {
    let (_db, users) = users();
    users.insert_one(doc! { "n" => 1 }).unwrap();
    users.insert_one(doc! { "n" => 1.0 }).unwrap();
    users.insert_one(doc! { "n" => "1" }).unwrap();
    assert_eq!(users.count_documents(doc! { "n" => 1 }).unwrap(), 1);
    assert_eq!(users.count_documents(doc! { "n" => 1.0 }).unwrap(), 1);
}

#[test]
fn nested_paths_match() {
    let (_db, users) = users();
    users
        .insert_one(doc! { "address" => doc! { "city" => "Lyon", "zip" => "69001" } })
        .unwrap();
    users
        .insert_one(doc! { "address" => doc! { "city" => "Oslo" } })
        .unwrap();

    assert_eq!(
        users.count_documents(doc! { "address.city" => "Lyon" }).unwrap(),
        1
    );
    assert_eq!(
        users
            .count_documents(doc! { "address" => doc! { "city" => "Oslo" } })
            .unwrap(),
        1
    );
    assert_eq!(
        users.count_documents(doc! { "address.country" => "FR" }).unwrap(),
        0
    );
}

#[test]
fn delete_variants() {
    let (_db, users) = seeded();
    assert!(users.delete(DocumentId::new(1)).unwrap());
    assert!(!users.delete(DocumentId::new(1)).unwrap());

    assert!(users.delete_one(doc! { "role" => "user" }).unwrap());
    assert_eq!(users.get(DocumentId::new(2)).unwrap(), None);
    assert!(!users.delete_one(doc! { "role" => "admin" }).unwrap());

    let (_db, users) = seeded();
    assert_eq!(users.delete_many(doc! { "role" => "user" }).unwrap(), 2);
    assert_eq!(users.delete_many(doc! { "role" => "user" }).unwrap(), 0);
    assert_eq!(users.count_documents(doc! {}).unwrap(), 1);
}

#[test]
fn find_one_and_delete_returns_removed_record() {
    let (_db, users) = seeded();
    let removed = users
        .find_one_and_delete(doc! { "role" => "user" })
        .unwrap()
        .unwrap();
    assert_eq!(removed.id, DocumentId::new(2));
    assert_eq!(names(&[removed]), vec!["bob"]);
    assert_eq!(users.count_documents(doc! {}).unwrap(), 2);
    assert_eq!(
        users.find_one_and_delete(doc! { "role" => "owner" }).unwrap(),
        None
    );
}

#[test]
fn replace_one_keeps_id() {
    let (_db, users) = seeded();
    let before = users.get(DocumentId::new(2)).unwrap().unwrap();
    let after = users
        .replace_one(doc! { "name" => "bob" }, doc! { "name" => "rob" })
        .unwrap()
        .unwrap();

    assert_eq!(after.id, before.id);
    assert_ne!(after.hash, before.hash);
    assert!(after.last_modified > before.last_modified);
    // Replacement drops fields the new document lacks
    assert_eq!(after.data, doc! { "name" => "rob" });
    assert_eq!(users.get(before.id).unwrap(), Some(after));

    assert_eq!(
        users
            .replace_one(doc! { "name" => "bob" }, doc! { "name" => "x" })
            .unwrap(),
        None
    );
}

#[test]
fn update_one_merges_patch() {
    let (_db, users) = users();
    users
        .insert_one(doc! { "name" => "ada", "age" => 36, "meta" => doc! { "a" => 1, "b" => 2 } })
        .unwrap();

    let patch = doc! { "age" => 37, "name" => (), "meta" => doc! { "b" => 3, "c" => 4 } };
    let updated = users
        .update_one(doc! { "name" => "ada" }, &patch, false)
        .unwrap()
        .unwrap();
    assert_eq!(updated.id, DocumentId::new(1));
    assert_eq!(
        updated.data,
        doc! { "age" => 37, "meta" => doc! { "a" => 1, "b" => 3, "c" => 4 } }
    );

    assert_eq!(
        users
            .update_one(doc! { "name" => "ada" }, &patch, false)
            .unwrap(),
        None
    );
}

#[test]
fn update_one_upsert_inserts_patch() {
    let (_db, users) = seeded();
    let inserted = users
        .update_one(doc! { "name" => "dee" }, &doc! { "name" => "dee", "gone" => () }, true)
        .unwrap()
        .unwrap();
    assert_eq!(inserted.id, DocumentId::new(4));
    assert_eq!(inserted.data, doc! { "name" => "dee" });
}

#[test]
fn unchanged_update_keeps_hash_and_refreshes_timestamp() {
    let (_db, users) = seeded();
    let before = users.get(DocumentId::new(1)).unwrap().unwrap();
    let after = users
        .update_one(doc! { "name" => "ada" }, &doc! { "age" => 36 }, false)
        .unwrap()
        .unwrap();
    assert_eq!(after.hash, before.hash);
    assert!(after.last_modified > before.last_modified);
}

#[test]
fn update_many_counts_writes() {
    let (_db, users) = seeded();
    let patch = doc! { "active" => true };
    assert_eq!(
        users.update_many(doc! { "role" => "user" }, &patch, false).unwrap(),
        2
    );
    assert_eq!(users.count_documents(doc! { "active" => true }).unwrap(), 2);

    assert_eq!(
        users.update_many(doc! { "role" => "owner" }, &patch, false).unwrap(),
        0
    );
    assert_eq!(
        users.update_many(doc! { "role" => "owner" }, &patch, true).unwrap(),
        1
    );
    assert_eq!(users.count_documents(doc! {}).unwrap(), 4);
}

#[test]
fn update_many_is_all_or_nothing_on_validation() {
    let (_db, users) = seeded();
    let result = users.update_many(doc! {}, &doc! { "score" => f64::NAN }, false);
    assert!(matches!(result, Err(CoreError::Validation { .. })));
    assert!(users
        .find(doc! {})
        .unwrap()
        .all(|r| !r.unwrap().data.contains_key("score")));
}

#[test]
fn dropped_collection_handle_fails() {
    let (db, users) = seeded();
    db.drop_collection("users").unwrap();
    assert!(matches!(users.name(), Err(CoreError::NotFound { .. })));
    assert!(matches!(
        users.count_documents(doc! {}),
        Err(CoreError::NotFound { .. })
    ));
    assert!(matches!(
        users.update_many(doc! {}, &doc! { "a" => 1 }, true),
        Err(CoreError::NotFound { .. })
    ));
}

#[test]
fn closed_database_handle_fails() {
    let (db, users) = seeded();
    db.close().unwrap();
    assert!(matches!(
        users.get(DocumentId::new(1)),
        Err(CoreError::DatabaseClosed)
    ));
    assert!(matches!(
        users.delete_many(doc! {}),
        Err(CoreError::DatabaseClosed)
    ));
}

#[test]
fn handles_compare_by_database_and_id() {
    let (db, users) = users();
    let other_db = Database::open_in_memory().unwrap();
    let other = other_db.create_collection("users").unwrap();

    assert_eq!(users, db.collection("users").unwrap());
    assert_eq!(users.clone(), users);
    assert_ne!(users, other);
}

#[test]
fn concurrent_inserts_get_distinct_ids() {
    let (_db, users) = users();
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let users = users.clone();
            std::thread::spawn(move || {
                (0..25)
                    .map(|n| users.insert_one(doc! { "t" => t, "n" => n }).unwrap().id)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .map(DocumentId::as_u64)
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=100).collect::<Vec<_>>());
}

#[test]
fn distinct_keeps_first_appearance_order() {
    let (_db, users) = seeded();
    assert_eq!(
        users.distinct("role", Predicate::all()).unwrap(),
        vec![Value::from("admin"), Value::from("user")]
    );
    assert_eq!(
        users.distinct("name", doc! { "role" => "user" }).unwrap(),
        vec![Value::from("bob"), Value::from("cy")]
    );

    users.insert_one(doc! { "role" => Value::Null }).unwrap();
    users.insert_one(doc! { "age" => 36.0 }).unwrap();
    assert_eq!(users.distinct("role", Predicate::all()).unwrap().len(), 2);
    // 36 and 36.0 are different values
    assert_eq!(users.distinct("age", Predicate::all()).unwrap().len(), 4);

    assert!(matches!(
        users.distinct("a..b", Predicate::all()),
        Err(CoreError::Validation { .. })
    ));
}

#[test]
fn distinct_reads_nested_paths() {
    let (_db, users) = users();
    for city in ["Oslo", "Lima", "Oslo"] {
        users
            .insert_one(doc! { "address" => doc! { "city" => city } })
            .unwrap();
    }
    assert_eq!(
        users.distinct("address.city", doc! {}).unwrap(),
        vec![Value::from("Oslo"), Value::from("Lima")]
    );
}

#[test]
fn hash_unique_rejects_equal_documents() {
    let db = Database::open_in_memory().unwrap();
    let tags = db
        .create_collection_with_config("tags", CollectionConfig::new().hash_unique(true))
        .unwrap();
    assert!(tags.config().unwrap().hash_unique);

    let rust = tags.insert_one(doc! { "tag" => "rust" }).unwrap();
    tags.insert_one(doc! { "tag" => "go" }).unwrap();
    assert!(matches!(
        tags.insert_one(doc! { "tag" => "rust" }),
        Err(CoreError::UniqueViolation { constraint, .. }) if constraint == "content hash"
    ));
    assert!(matches!(
        tags.replace_one(doc! { "tag" => "go" }, doc! { "tag" => "rust" }),
        Err(CoreError::UniqueViolation { .. })
    ));
    // Rewriting a document with its own content is allowed
    tags.replace_one(doc! { "tag" => "rust" }, doc! { "tag" => "rust" })
        .unwrap();

    tags.delete(rust.id).unwrap();
    tags.insert_one(doc! { "tag" => "rust" }).unwrap();
    assert_eq!(tags.count_documents(doc! {}).unwrap(), 2);
}

#[test]
fn default_collections_allow_equal_documents() {
    let (_db, users) = users();
    assert!(!users.config().unwrap().hash_unique);
    let a = users.insert_one(doc! { "name" => "test" }).unwrap();
    let b = users.insert_one(doc! { "name" => "test" }).unwrap();
    assert_eq!(a.hash, b.hash);
}

#[test]
fn unique_index_guards_inserts_and_updates() {
    let (_db, users) = seeded();
    assert!(users.create_index("name", true).unwrap());

    assert!(matches!(
        users.insert_one(doc! { "name" => "ada" }),
        Err(CoreError::UniqueViolation { constraint, .. }) if constraint == "name"
    ));
    assert!(matches!(
        users.update_one(doc! { "name" => "bob" }, &doc! { "name" => "cy" }, false),
        Err(CoreError::UniqueViolation { .. })
    ));
    // Missing and null values never collide
    users.insert_one(doc! { "role" => "guest" }).unwrap();
    users.insert_one(doc! { "role" => "guest" }).unwrap();
    users.insert_one(doc! { "name" => Value::Null }).unwrap();
    users.insert_one(doc! { "name" => Value::Null }).unwrap();

    // A renamed document frees its old value
    users
        .update_one(doc! { "name" => "bob" }, &doc! { "name" => "rob" }, false)
        .unwrap();
    users.insert_one(doc! { "name" => "bob" }).unwrap();
}

#[test]
fn create_index_refuses_existing_duplicates() {
    let (_db, users) = seeded();
    assert!(matches!(
        users.create_index("role", true),
        Err(CoreError::UniqueViolation { .. })
    ));
    assert!(users.indexes().unwrap().is_empty());

    assert!(users.create_index("role", false).unwrap());
    assert!(!users.create_index("role", false).unwrap());
    assert!(matches!(
        users.create_index("role", true),
        Err(CoreError::AlreadyExists { .. })
    ));
}

#[test]
fn indexed_queries_agree_with_scans() {
    let (_db, users) = seeded();
    users.create_index("role", false).unwrap();
    assert_eq!(
        users.indexes().unwrap(),
        vec![IndexInfo {
            path: "role".to_string(),
            unique: false,
            entries: 3,
        }]
    );

    assert_eq!(users.count_documents(doc! { "role" => "user" }).unwrap(), 2);
    assert_eq!(
        users.count_documents(doc! { "role" => "user", "age" => 41 }).unwrap(),
        1
    );
    assert_eq!(users.count_documents(doc! { "role" => "owner" }).unwrap(), 0);

    users
        .update_one(doc! { "name" => "ada" }, &doc! { "role" => "user" }, false)
        .unwrap();
    let first = users.find_one_and_delete(doc! { "role" => "user" }).unwrap().unwrap();
    assert_eq!(first.id, DocumentId::new(1));
    assert_eq!(users.delete_many(doc! { "role" => "user" }).unwrap(), 2);
    assert_eq!(users.indexes().unwrap()[0].entries, 0);
}

#[test]
fn drop_index_and_reindex() {
    let (_db, users) = seeded();
    users.create_index("age", true).unwrap();
    users.reindex().unwrap();
    assert_eq!(users.indexes().unwrap()[0].entries, 3);

    assert!(users.drop_index("age").unwrap());
    assert!(!users.drop_index("age").unwrap());
    assert!(users.indexes().unwrap().is_empty());
    users.insert_one(doc! { "age" => 36 }).unwrap();
}

#[test]
fn settings_and_indexes_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.hoard");
    {
        let db = Database::open(&path).unwrap();
        let tags = db
            .create_collection_with_config("tags", CollectionConfig::new().hash_unique(true))
            .unwrap();
        tags.insert_one(doc! { "tag" => "rust", "slug" => "r" }).unwrap();
        tags.create_index("slug", true).unwrap();
        db.close().unwrap();
    }

    let db = Database::open(&path).unwrap();
    let tags = db.collection("tags").unwrap();
    assert!(tags.config().unwrap().hash_unique);
    assert_eq!(tags.indexes().unwrap()[0].entries, 1);
    assert!(matches!(
        tags.insert_one(doc! { "tag" => "rust", "slug" => "r" }),
        Err(CoreError::UniqueViolation { .. })
    ));
    assert!(matches!(
        tags.insert_one(doc! { "tag" => "rs", "slug" => "r" }),
        Err(CoreError::UniqueViolation { .. })
    ));
}
