//! Slot headers: the unit of allocation in the record area.
//!
//! ```text
//! capacity  4  total slot size including this header
//! state     1  Free / Pending / Live
//! kind      1  Directory / Document
//! reserved  2
//! counter   8  next id to assign (directory entries only)
//! body_len  4
//! body_crc  4  crc32 over the body
//! ```

use super::checksum::crc32;

/// Size of an encoded slot header.
pub const SLOT_HEADER_LEN: usize = 24;

/// Slot capacities are multiples of this.
pub const SLOT_ALIGN: u32 = 8;

/// Offset of the state byte within a slot.
pub(crate) const STATE_OFFSET: u64 = 4;

/// Offset of the counter within a slot.
pub(crate) const COUNTER_OFFSET: u64 = 8;

/// Lifecycle state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotState {
    /// Reusable space.
    Free = 0,
    /// Written but not yet committed; reclaimed at open.
    Pending = 1,
    /// Committed and visible.
    Live = 2,
}

impl SlotState {
    /// Parses a state byte.
    #[must_use]
    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Free),
            1 => Some(Self::Pending),
            2 => Some(Self::Live),
            _ => None,
        }
    }
}

/// What a live slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotKind {
    /// Not in use (free space).
    Unused = 0,
    /// A collection directory entry.
    Directory = 1,
    /// A stored document.
    Document = 2,
}

impl SlotKind {
    /// Parses a kind byte.
    #[must_use]
    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Unused),
            1 => Some(Self::Directory),
            2 => Some(Self::Document),
            _ => None,
        }
    }
}

/// Position and size of a slot in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    /// File offset of the slot header.
    pub offset: u64,
    /// Total slot size in bytes, header included.
    pub capacity: u32,
}

impl Location {
    /// Offset one past the end of the slot.
    #[must_use]
    pub const fn end(self) -> u64 {
        self.offset + self.capacity as u64
    }

    /// Largest body this slot can hold.
    #[must_use]
    pub const fn max_body_len(self) -> usize {
        self.capacity as usize - SLOT_HEADER_LEN
    }
}

/// Decoded slot header.
///
/// `state` and `kind` stay raw bytes here so that the scanner can report
/// unknown values with their offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotHeader {
    /// Total slot size including the header.
    pub capacity: u32,
    /// Raw state byte.
    pub state: u8,
    /// Raw kind byte.
    pub kind: u8,
    /// Directory id counter; zero for documents.
    pub counter: u64,
    /// Length of the body.
    pub body_len: u32,
    /// CRC-32 of the body.
    pub body_crc: u32,
}

impl SlotHeader {
    /// Builds the header for a body about to be written.
    #[must_use]
    pub fn for_body(capacity: u32, state: SlotState, kind: SlotKind, counter: u64, body: &[u8]) -> Self {
        Self {
            capacity,
            state: state as u8,
            kind: kind as u8,
            counter,
            body_len: body.len() as u32,
            body_crc: crc32(body),
        }
    }

    /// Header of an empty free slot.
    #[must_use]
    pub fn free(capacity: u32) -> Self {
        Self::for_body(capacity, SlotState::Free, SlotKind::Unused, 0, &[])
    }

    /// Encodes the header.
    pub fn encode(&self) -> [u8; SLOT_HEADER_LEN] {
        let mut buf = [0u8; SLOT_HEADER_LEN];
        buf[0..4].copy_from_slice(&self.capacity.to_le_bytes());
        buf[4] = self.state;
        buf[5] = self.kind;
        buf[8..16].copy_from_slice(&self.counter.to_le_bytes());
        buf[16..20].copy_from_slice(&self.body_len.to_le_bytes());
        buf[20..24].copy_from_slice(&self.body_crc.to_le_bytes());
        buf
    }

    /// Decodes a header. The caller guarantees `data` holds at least
    /// [`SLOT_HEADER_LEN`] bytes.
    pub fn decode(data: &[u8; SLOT_HEADER_LEN]) -> Self {
        let mut counter = [0u8; 8];
        counter.copy_from_slice(&data[8..16]);
        Self {
            capacity: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            state: data[4],
            kind: data[5],
            counter: u64::from_le_bytes(counter),
            body_len: u32::from_le_bytes([data[16], data[17], data[18], data[19]]),
            body_crc: u32::from_le_bytes([data[20], data[21], data[22], data[23]]),
        }
    }

    /// Returns true if `body` matches the stored checksum.
    #[must_use]
    pub fn body_matches(&self, body: &[u8]) -> bool {
        crc32(body) == self.body_crc
    }
}

/// Rounds a body length up to the slot capacity that holds it.
///
/// Returns `None` if the slot would not fit in a `u32`.
pub fn capacity_for(body_len: usize) -> Option<u32> {
    let raw = u32::try_from(SLOT_HEADER_LEN.checked_add(body_len)?).ok()?;
    raw.checked_next_multiple_of(SLOT_ALIGN)
}
