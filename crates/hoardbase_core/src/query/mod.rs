//! Equality predicates over document fields.
//!
//! A predicate is written as a document: `{"name": "test"}` matches records
//! whose `name` field equals `"test"`. Keys may be dotted paths
//! (`"address.city"`), and nested maps descend the same way, so
//! `{"address": {"city": "London"}}` is the same predicate as
//! `{"address.city": "London"}`.

mod matcher;
mod predicate;

pub use matcher::matches;
pub(crate) use matcher::resolve;
pub use predicate::{Condition, Predicate};
