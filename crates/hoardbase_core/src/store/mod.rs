//! The single-file page store.
//!
//! ```text
//! offset 0    FileHeader (64 bytes)
//! offset 64   record area: slot, slot, slot, ...
//! ```
//!
//! Every slot starts with a [`SlotHeader`]; directory entries and
//! documents share the record area.

mod checksum;
mod header;
mod record_store;
mod slot;

pub use header::{FileHeader, FORMAT_VERSION, HEADER_LEN, MAGIC};
pub use record_store::{LiveSlot, RecordStore, SpaceStats};
pub use slot::{Location, SlotHeader, SlotKind, SlotState, SLOT_HEADER_LEN};
