//! # HoardBase Testkit
//!
//! Test utilities for HoardBase.
//!
//! This crate provides:
//! - Test fixtures and database helpers
//! - Property-based test generators using proptest
//! - A model-checking harness for collection workloads
//! - Crash simulation and recovery checks
//! - Single-write fault injection with reopen checks
//!
//! ## Usage
//!
//! ```rust
//! use hoardbase_testkit::prelude::*;
//!
//! with_temp_db(|db| {
//!     let users = db.create_collection("users").unwrap();
//!     assert_eq!(db.list_collections().unwrap(), vec!["users"]);
//!     drop(users);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::{crash_and_recover, CrashableBackend, Step};
    pub use crate::faults::{fail_once_and_reopen, FaultyBackend};
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
