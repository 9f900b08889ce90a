//! # HoardBase Storage
//!
//! Random-access byte stores for HoardBase.
//!
//! Backends are **opaque byte stores**: they read, overwrite, append,
//! truncate and sync bytes, and know nothing about the slot layout that
//! `hoardbase_core` writes into them.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and throwaway databases
//! - [`FileBackend`] - A single OS file, exclusively locked while open
//!
//! ## Example
//!
//! ```rust
//! use hoardbase_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! backend.write_at(offset, b"HELLO").unwrap();
//! assert_eq!(backend.read_at(offset, 11).unwrap(), b"HELLO world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::{FileBackend, OpenMode};
pub use memory::InMemoryBackend;
