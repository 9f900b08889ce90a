//! The fixed header at offset 0 of every database file.

use super::checksum::crc32;
use crate::error::{CoreError, CoreResult};
use crate::types::Timestamp;

/// Magic bytes identifying a HoardBase file.
pub const MAGIC: [u8; 8] = *b"HOARDDB\0";

/// Format version written by this build.
pub const FORMAT_VERSION: (u16, u16) = (1, 0);

/// Size of the header; the record area starts right after it.
pub const HEADER_LEN: usize = 64;

/// Decoded file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Format version (major, minor).
    pub version: (u16, u16),
    /// When the file was created.
    pub created_at: Timestamp,
}

impl FileHeader {
    /// Creates a header for a new file.
    #[must_use]
    pub fn new(created_at: Timestamp) -> Self {
        Self {
            version: FORMAT_VERSION,
            created_at,
        }
    }

    /// Encodes the header to its fixed 64-byte form.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..8].copy_from_slice(&MAGIC);
        buf[8..10].copy_from_slice(&self.version.0.to_le_bytes());
        buf[10..12].copy_from_slice(&self.version.1.to_le_bytes());
        buf[12..16].copy_from_slice(&(HEADER_LEN as u32).to_le_bytes());
        buf[16..24].copy_from_slice(&self.created_at.as_micros().to_le_bytes());
        // 24..60 reserved
        let crc = crc32(&buf[..60]);
        buf[60..64].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decodes and validates a header.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` on a short buffer, wrong magic, unsupported
    /// major version, unexpected header length or checksum mismatch.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(CoreError::invalid_format("file too short for header"));
        }
        if data[0..8] != MAGIC {
            return Err(CoreError::invalid_format("not a HoardBase file"));
        }

        let stored_crc = u32::from_le_bytes([data[60], data[61], data[62], data[63]]);
        let actual_crc = crc32(&data[..60]);
        if stored_crc != actual_crc {
            return Err(CoreError::invalid_format(format!(
                "header checksum mismatch: expected {stored_crc:08x}, got {actual_crc:08x}"
            )));
        }

        let major = u16::from_le_bytes([data[8], data[9]]);
        let minor = u16::from_le_bytes([data[10], data[11]]);
        if major != FORMAT_VERSION.0 {
            return Err(CoreError::invalid_format(format!(
                "unsupported format version {major}.{minor}"
            )));
        }

        let header_len = u32::from_le_bytes([data[12], data[13], data[14], data[15]]);
        if header_len as usize != HEADER_LEN {
            return Err(CoreError::invalid_format(format!(
                "unexpected header length {header_len}"
            )));
        }

        let mut created = [0u8; 8];
        created.copy_from_slice(&data[16..24]);

        Ok(Self {
            version: (major, minor),
            created_at: Timestamp::from_micros(i64::from_le_bytes(created)),
        })
    }
}
