//! Slot allocation and crash-safe slot writes over a storage backend.

use super::header::{FileHeader, HEADER_LEN};
use super::slot::{
    capacity_for, Location, SlotHeader, SlotKind, SlotState, COUNTER_OFFSET, SLOT_HEADER_LEN,
    SLOT_ALIGN, STATE_OFFSET,
};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use hoardbase_storage::StorageBackend;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// A committed slot found while scanning the record area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSlot {
    /// Where the slot lives.
    pub location: Location,
    /// What the slot holds.
    pub kind: SlotKind,
    /// The header counter (directory entries only).
    pub counter: u64,
    /// The slot body.
    pub body: Vec<u8>,
}

/// Space accounting for [`RecordStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpaceStats {
    /// Total file size in bytes.
    pub file_size: u64,
    /// Number of free slots.
    pub free_slots: usize,
    /// Bytes held by free slots.
    pub free_bytes: u64,
}

/// Allocates, writes, reads and frees slots in the record area.
///
/// A slot becomes visible only when its state byte flips from `Pending`
/// to `Live`, which happens after the whole slot has been written. At
/// most one allocation may be outstanding: every `allocate` must be
/// followed by `write` or `release` before the next `allocate`.
pub struct RecordStore {
    backend: Box<dyn StorageBackend>,
    header: FileHeader,
    /// Free slots keyed by (capacity, offset) for best-fit lookup.
    free: BTreeSet<(u32, u64)>,
    sync_on_write: bool,
    min_split_size: u32,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("header", &self.header)
            .field("free_slots", &self.free.len())
            .field("sync_on_write", &self.sync_on_write)
            .finish_non_exhaustive()
    }
}

impl RecordStore {
    /// Initializes an empty backend with a fresh header.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the backend is not empty, or an I/O error.
    pub fn create(
        mut backend: Box<dyn StorageBackend>,
        header: FileHeader,
        config: &Config,
    ) -> CoreResult<Self> {
        if backend.size()? != 0 {
            return Err(CoreError::invalid_format("cannot create over existing data"));
        }
        backend.append(&header.encode())?;
        backend.flush()?;
        backend.sync()?;

        Ok(Self {
            backend,
            header,
            free: BTreeSet::new(),
            sync_on_write: config.sync_on_write,
            min_split_size: config.min_split_size,
        })
    }

    /// Opens an existing store and scans its record area.
    ///
    /// Free and pending slots go to the free list, a torn trailing slot is
    /// truncated away, and every live slot is returned in file order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` for a bad header, `CorruptRecord` for a
    /// damaged live slot, or an I/O error.
    pub fn open(
        backend: Box<dyn StorageBackend>,
        config: &Config,
    ) -> CoreResult<(Self, Vec<LiveSlot>)> {
        let size = backend.size()?;
        if size < HEADER_LEN as u64 {
            return Err(CoreError::invalid_format(format!(
                "file too short for header ({size} bytes)"
            )));
        }
        let header = FileHeader::decode(&backend.read_at(0, HEADER_LEN)?)?;

        let mut store = Self {
            backend,
            header,
            free: BTreeSet::new(),
            sync_on_write: config.sync_on_write,
            min_split_size: config.min_split_size,
        };
        let live = store.scan(size)?;
        Ok((store, live))
    }

    fn scan(&mut self, size: u64) -> CoreResult<Vec<LiveSlot>> {
        let mut live = Vec::new();
        let mut offset = HEADER_LEN as u64;
        let mut reclaimed = 0usize;

        while offset < size {
            if size - offset < SLOT_HEADER_LEN as u64 {
                break;
            }
            let header = self.read_header(offset)?;
            if (header.capacity as usize) < SLOT_HEADER_LEN || header.capacity % SLOT_ALIGN != 0 {
                return Err(CoreError::corrupt(
                    offset,
                    format!("invalid slot capacity {}", header.capacity),
                ));
            }
            let location = Location {
                offset,
                capacity: header.capacity,
            };
            if location.end() > size {
                break;
            }

            match SlotState::from_byte(header.state) {
                Some(SlotState::Free) => {
                    self.free.insert((location.capacity, location.offset));
                }
                Some(SlotState::Pending) => {
                    self.backend
                        .write_at(offset + STATE_OFFSET, &[SlotState::Free as u8])?;
                    self.free.insert((location.capacity, location.offset));
                    reclaimed += 1;
                }
                Some(SlotState::Live) => {
                    let kind = match SlotKind::from_byte(header.kind) {
                        Some(kind @ (SlotKind::Directory | SlotKind::Document)) => kind,
                        _ => {
                            return Err(CoreError::corrupt(
                                offset,
                                format!("unknown slot kind {}", header.kind),
                            ))
                        }
                    };
                    let body = self.read_body(location, &header)?;
                    live.push(LiveSlot {
                        location,
                        kind,
                        counter: header.counter,
                        body,
                    });
                }
                None => {
                    return Err(CoreError::corrupt(
                        offset,
                        format!("unknown slot state {}", header.state),
                    ))
                }
            }
            offset = location.end();
        }

        if reclaimed > 0 {
            warn!(reclaimed, "reclaimed pending slots left by an interrupted write");
            self.sync_if_configured()?;
        }
        if offset < size {
            warn!(offset, size, "truncating torn trailing slot");
            self.backend.truncate(offset)?;
        }
        debug!(
            live = live.len(),
            free = self.free.len(),
            "record area scanned"
        );
        Ok(live)
    }

    /// The file header.
    #[must_use]
    pub fn header(&self) -> FileHeader {
        self.header
    }

    /// Reserves a slot large enough for a body of `body_len` bytes.
    ///
    /// Picks the smallest free slot that fits, splitting off the remainder
    /// when it is at least `min_split_size` bytes, or else places the slot
    /// at the end of the file.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the body is too large for a slot, or an I/O
    /// error while writing a split remainder.
    pub fn allocate(&mut self, body_len: usize) -> CoreResult<Location> {
        let needed = capacity_for(body_len)
            .ok_or_else(|| CoreError::validation(format!("record of {body_len} bytes is too large")))?;

        if let Some(&(capacity, offset)) = self.free.range((needed, 0)..).next() {
            self.free.remove(&(capacity, offset));
            let spare = capacity - needed;

            if spare >= self.min_split_size.max(SLOT_HEADER_LEN as u32) {
                let rest = Location {
                    offset: offset + u64::from(needed),
                    capacity: spare,
                };
                let head = Location {
                    offset,
                    capacity: needed,
                };
                // The remainder header must be durable before a shorter
                // header at `offset` can be. Until `head` is written the
                // old header still spans both halves.
                if let Err(e) = self
                    .write_free_header(rest)
                    .and_then(|()| self.write_free_header(head))
                {
                    self.free.insert((capacity, offset));
                    return Err(e);
                }
                self.free.insert((rest.capacity, rest.offset));
                return Ok(head);
            }

            return Ok(Location { offset, capacity });
        }

        Ok(Location {
            offset: self.backend.size()?,
            capacity: needed,
        })
    }

    /// Gives back a slot from [`allocate`](Self::allocate) whose
    /// [`write`](Self::write) failed.
    ///
    /// A slot inside the file is marked free on disk with its allocated
    /// capacity and returned to the free list. A partly appended slot is
    /// cut off the end of the file, and one that never reached the file
    /// is dropped.
    ///
    /// # Errors
    ///
    /// Returns an I/O error. The slot is then `Free` or `Pending` on disk,
    /// or a torn tail, all of which the scan at open reclaims.
    pub fn release(&mut self, location: Location) -> CoreResult<()> {
        let size = self.backend.size()?;
        if location.offset >= size {
            return Ok(());
        }
        if location.end() > size {
            self.backend.truncate(location.offset)?;
            return self.sync_if_configured();
        }
        self.free.insert((location.capacity, location.offset));
        self.write_free_header(location)
    }

    /// Writes a slot body and commits it.
    ///
    /// The slot is written as `Pending`, then its state byte is flipped to
    /// `Live`; with `sync_on_write` the backend is synced after each step.
    ///
    /// # Errors
    ///
    /// Returns an I/O error; the slot is then not visible.
    pub fn write(
        &mut self,
        location: Location,
        kind: SlotKind,
        counter: u64,
        body: &[u8],
    ) -> CoreResult<()> {
        if body.len() > location.max_body_len() {
            return Err(CoreError::validation(format!(
                "body of {} bytes does not fit slot of {}",
                body.len(),
                location.capacity
            )));
        }

        let header = SlotHeader::for_body(location.capacity, SlotState::Pending, kind, counter, body);
        let mut bytes = Vec::with_capacity(location.capacity as usize);
        bytes.extend_from_slice(&header.encode());
        bytes.extend_from_slice(body);

        let size = self.backend.size()?;
        if location.offset >= size {
            if location.offset != size {
                return Err(CoreError::corrupt(
                    location.offset,
                    "allocation is no longer at the end of the file",
                ));
            }
            bytes.resize(location.capacity as usize, 0);
            self.backend.append(&bytes)?;
        } else {
            self.backend.write_at(location.offset, &bytes)?;
        }
        self.sync_if_configured()?;

        self.set_state(location, SlotState::Live)
    }

    /// Reads and verifies the body of a live slot of the given kind.
    ///
    /// # Errors
    ///
    /// Returns `CorruptRecord` if the slot is not a live slot of that kind
    /// or its checksum does not match, or an I/O error.
    pub fn read(&self, location: Location, kind: SlotKind) -> CoreResult<Vec<u8>> {
        let header = self.read_header(location.offset)?;
        if header.state != SlotState::Live as u8
            || header.kind != kind as u8
            || header.capacity != location.capacity
        {
            return Err(CoreError::corrupt(
                location.offset,
                "slot does not hold the expected live record",
            ));
        }
        self.read_body(location, &header)
    }

    /// Overwrites the counter field of a live slot.
    ///
    /// # Errors
    ///
    /// Returns an I/O error.
    pub fn set_counter(&mut self, location: Location, counter: u64) -> CoreResult<()> {
        self.backend
            .write_at(location.offset + COUNTER_OFFSET, &counter.to_le_bytes())?;
        self.sync_if_configured()
    }

    /// Marks a live slot free and makes its space reusable.
    ///
    /// # Errors
    ///
    /// Returns an I/O error; the slot then stays live.
    pub fn free(&mut self, location: Location) -> CoreResult<()> {
        self.set_state(location, SlotState::Free)?;
        self.free.insert((location.capacity, location.offset));
        Ok(())
    }

    /// Flushes and syncs the backend.
    ///
    /// # Errors
    ///
    /// Returns an I/O error.
    pub fn sync(&mut self) -> CoreResult<()> {
        self.backend.flush()?;
        self.backend.sync()?;
        Ok(())
    }

    /// Current space usage.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file size cannot be read.
    pub fn space(&self) -> CoreResult<SpaceStats> {
        Ok(SpaceStats {
            file_size: self.backend.size()?,
            free_slots: self.free.len(),
            free_bytes: self.free.iter().map(|&(cap, _)| u64::from(cap)).sum(),
        })
    }

    fn set_state(&mut self, location: Location, state: SlotState) -> CoreResult<()> {
        self.backend
            .write_at(location.offset + STATE_OFFSET, &[state as u8])?;
        self.sync_if_configured()
    }

    fn write_free_header(&mut self, location: Location) -> CoreResult<()> {
        self.backend
            .write_at(location.offset, &SlotHeader::free(location.capacity).encode())?;
        self.sync_if_configured()
    }

    fn sync_if_configured(&mut self) -> CoreResult<()> {
        if self.sync_on_write {
            self.backend.flush()?;
            self.backend.sync()?;
        }
        Ok(())
    }

    fn read_header(&self, offset: u64) -> CoreResult<SlotHeader> {
        let raw = self.backend.read_at(offset, SLOT_HEADER_LEN)?;
        let raw: [u8; SLOT_HEADER_LEN] = raw
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::corrupt(offset, "short slot header"))?;
        Ok(SlotHeader::decode(&raw))
    }

    fn read_body(&self, location: Location, header: &SlotHeader) -> CoreResult<Vec<u8>> {
        let body_len = header.body_len as usize;
        if body_len > location.max_body_len() {
            return Err(CoreError::corrupt(
                location.offset,
                format!(
                    "body length {body_len} exceeds slot capacity {}",
                    location.capacity
                ),
            ));
        }
        let body = self
            .backend
            .read_at(location.offset + SLOT_HEADER_LEN as u64, body_len)?;
        if !header.body_matches(&body) {
            return Err(CoreError::corrupt(location.offset, "body checksum mismatch"));
        }
        Ok(body)
    }
}
