//! # HoardBase Core
//!
//! Embedded, single-file document store.
//!
//! A database is one file holding named collections of schemaless
//! documents. Each stored document gets a per-collection id that is never
//! reused, a SHA-256 fingerprint of its canonical CBOR encoding, and a
//! last-modified timestamp.
//!
//! This crate provides:
//! - [`Database`]: opening, closing and managing collections
//! - [`Collection`]: insert, find, update, replace and delete
//! - [`Cursor`]: lazy iteration over matching documents
//! - [`Predicate`]: equality queries over (dotted) field paths
//! - [`CollectionConfig`] and secondary indexes: unique constraints and
//!   indexed equality lookups
//! - Crash-safe slot storage that recovers to the last committed state
//!
//! ## Example
//!
//! ```rust
//! use hoardbase_core::{doc, Database};
//!
//! let db = Database::open_in_memory()?;
//! let users = db.create_collection("users")?;
//!
//! let inserted = users.insert_one(doc! { "name" => "test", "age" => 30 })?;
//! let found = users.find_one(doc! { "name" => "test" })?.unwrap();
//! assert_eq!(found.id, inserted.id);
//! assert_eq!(found.hash, inserted.hash);
//!
//! users.update_one(doc! { "name" => "test" }, &doc! { "age" => 31 }, false)?;
//! assert_eq!(users.count_documents(doc! { "age" => 31 })?, 1);
//! # Ok::<(), hoardbase_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod collection;
mod config;
mod cursor;
mod database;
mod engine;
mod error;
pub mod index;
pub mod query;
mod record;
mod stats;
pub mod store;
mod types;

pub use catalog::{validate_name, MAX_NAME_LEN};
pub use collection::{Collection, CollectionConfig};
pub use config::Config;
pub use cursor::{Cursor, FindOptions};
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use index::{IndexInfo, IndexSpec};
pub use query::{Condition, Predicate};
pub use record::{InsertResult, Record};
pub use stats::DatabaseStats;
pub use types::{CollectionId, DocumentId, Timestamp};

pub use hoardbase_codec::{doc, ContentHash, Document, Value};
