//! Collection directory entries.
//!
//! Each collection is described by one live directory slot whose header
//! counter holds the next document id to assign. The body carries the
//! name, the collection settings and the secondary index definitions.

use crate::collection::CollectionConfig;
use crate::error::{CoreError, CoreResult};
use crate::index::IndexSpec;
use crate::types::{CollectionId, Timestamp};

/// Longest collection name, in UTF-8 bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Checks a collection name.
///
/// # Errors
///
/// Returns `Validation` for an empty name or one longer than
/// [`MAX_NAME_LEN`] bytes.
pub fn validate_name(name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::validation("collection name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(CoreError::validation(format!(
            "collection name is {} bytes, limit is {MAX_NAME_LEN}",
            name.len()
        )));
    }
    Ok(())
}

/// Directory slot body:
/// `collection_id u32 | last_modified i64 | flags u8 | name_len u16 | name |
/// index_count u16 | index*`, each index being
/// `unique u8 | path_len u16 | path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DirectoryEntry {
    pub collection: CollectionId,
    pub last_modified: Timestamp,
    pub config: CollectionConfig,
    pub name: String,
    pub indexes: Vec<IndexSpec>,
}

impl DirectoryEntry {
    const PREFIX_LEN: usize = 4 + 8 + 1;

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::PREFIX_LEN + 4 + self.name.len());
        buf.extend_from_slice(&self.collection.as_u32().to_le_bytes());
        buf.extend_from_slice(&self.last_modified.as_micros().to_le_bytes());
        buf.push(self.config.to_flags());
        put_str(&mut buf, &self.name);
        let count = u16::try_from(self.indexes.len()).unwrap_or(u16::MAX);
        buf.extend_from_slice(&count.to_le_bytes());
        for spec in self.indexes.iter().take(usize::from(count)) {
            buf.push(u8::from(spec.unique));
            put_str(&mut buf, &spec.path);
        }
        buf
    }

    pub(crate) fn decode(offset: u64, data: &[u8]) -> CoreResult<Self> {
        let mut reader = Reader { offset, data };
        let collection = u32::from_le_bytes(reader.array()?);
        let modified = i64::from_le_bytes(reader.array()?);
        let [flags] = reader.array()?;
        let config = CollectionConfig::from_flags(offset, flags)?;
        let name = reader.string()?;

        let count = u16::from_le_bytes(reader.array()?);
        let mut indexes = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let [unique] = reader.array()?;
            let path = reader.string()?;
            indexes.push(IndexSpec {
                path,
                unique: unique != 0,
            });
        }
        if !reader.data.is_empty() {
            return Err(CoreError::corrupt(
                offset,
                format!("{} trailing bytes after directory entry", reader.data.len()),
            ));
        }

        Ok(Self {
            collection: CollectionId::new(collection),
            last_modified: Timestamp::from_micros(modified),
            config,
            name,
            indexes,
        })
    }
}

/// Names and paths are bounded well below `u16::MAX` by validation.
fn put_str(buf: &mut Vec<u8>, s: &str) {
    let len = u16::try_from(s.len()).unwrap_or(u16::MAX);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&s.as_bytes()[..usize::from(len)]);
}

struct Reader<'a> {
    offset: u64,
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> CoreResult<&'a [u8]> {
        if self.data.len() < len {
            return Err(CoreError::corrupt(self.offset, "directory entry too short"));
        }
        let (head, rest) = self.data.split_at(len);
        self.data = rest;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> CoreResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn string(&mut self) -> CoreResult<String> {
        let len = usize::from(u16::from_le_bytes(self.array()?));
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| CoreError::corrupt(self.offset, "directory string is not UTF-8"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> DirectoryEntry {
        DirectoryEntry {
            collection: CollectionId::new(9),
            last_modified: Timestamp::from_micros(77),
            config: CollectionConfig::default(),
            name: name.to_string(),
            indexes: Vec::new(),
        }
    }

    #[test]
    fn entry_roundtrip() {
        let plain = entry("sensor_readings");
        assert_eq!(DirectoryEntry::decode(64, &plain.encode()).unwrap(), plain);

        let mut indexed = entry("users");
        indexed.config = CollectionConfig::new().hash_unique(true);
        indexed.indexes = vec![
            IndexSpec::new("email", true).unwrap(),
            IndexSpec::new("address.city", false).unwrap(),
        ];
        assert_eq!(DirectoryEntry::decode(64, &indexed.encode()).unwrap(), indexed);
    }

    #[test]
    fn trailing_bytes_are_corrupt() {
        let mut bytes = entry("users").encode();
        bytes.push(0);
        assert!(matches!(
            DirectoryEntry::decode(64, &bytes),
            Err(CoreError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn truncated_entry_is_corrupt() {
        let bytes = entry("users").encode();
        assert!(matches!(
            DirectoryEntry::decode(64, &bytes[..bytes.len() - 1]),
            Err(CoreError::CorruptRecord { .. })
        ));
        assert!(matches!(
            DirectoryEntry::decode(64, &bytes[..5]),
            Err(CoreError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn name_rules() {
        assert!(validate_name("users").is_ok());
        assert!(validate_name("a.b c").is_ok());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN)).is_ok());
        assert!(matches!(validate_name(""), Err(CoreError::Validation { .. })));
        assert!(matches!(
            validate_name(&"x".repeat(MAX_NAME_LEN + 1)),
            Err(CoreError::Validation { .. })
        ));
    }
}
