//! Per-collection settings.

use crate::error::{CoreError, CoreResult};

const HASH_UNIQUE: u8 = 0b0000_0001;

/// Settings chosen when a collection is created.
///
/// They are stored in the collection's directory entry, so they survive
/// reopen and rename.
///
/// # Example
///
/// ```rust
/// use hoardbase_core::{doc, CollectionConfig, CoreError, Database};
///
/// let db = Database::open_in_memory()?;
/// let tags = db.create_collection_with_config("tags", CollectionConfig::new().hash_unique(true))?;
/// tags.insert_one(doc! { "tag" => "rust" })?;
/// assert!(matches!(
///     tags.insert_one(doc! { "tag" => "rust" }),
///     Err(CoreError::UniqueViolation { .. })
/// ));
/// # Ok::<(), CoreError>(())
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionConfig {
    /// Reject a write whose content hash another document of the
    /// collection already has.
    pub hash_unique: bool,
}

impl CollectionConfig {
    /// Default settings: duplicate content is allowed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether equal documents are rejected.
    #[must_use]
    pub const fn hash_unique(mut self, unique: bool) -> Self {
        self.hash_unique = unique;
        self
    }

    pub(crate) fn to_flags(self) -> u8 {
        if self.hash_unique {
            HASH_UNIQUE
        } else {
            0
        }
    }

    pub(crate) fn from_flags(offset: u64, flags: u8) -> CoreResult<Self> {
        if flags & !HASH_UNIQUE != 0 {
            return Err(CoreError::corrupt(
                offset,
                format!("unknown collection flags {flags:#04x}"),
            ));
        }
        Ok(Self {
            hash_unique: flags & HASH_UNIQUE != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_roundtrip() {
        for config in [CollectionConfig::new(), CollectionConfig::new().hash_unique(true)] {
            assert_eq!(CollectionConfig::from_flags(0, config.to_flags()).unwrap(), config);
        }
    }

    #[test]
    fn unknown_flags_are_corrupt() {
        assert!(matches!(
            CollectionConfig::from_flags(64, 0x80),
            Err(CoreError::CorruptRecord { offset: 64, .. })
        ));
    }
}
