//! Stored documents and their slot body encoding.

use crate::error::{CoreError, CoreResult};
use crate::types::{CollectionId, DocumentId, Timestamp};
use hoardbase_codec::{decode_document, encode_document, fingerprint, ContentHash, Document};

/// A document as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Id within the collection.
    pub id: DocumentId,
    /// The document fields.
    pub data: Document,
    /// SHA-256 of the canonical encoding of `data`.
    pub hash: ContentHash,
    /// Time of the last write to this document.
    pub last_modified: Timestamp,
}

/// What a successful insert reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertResult {
    /// The assigned id.
    pub id: DocumentId,
    /// Fingerprint of the stored content.
    pub hash: ContentHash,
    /// Time of the write.
    pub last_modified: Timestamp,
}

impl From<&Record> for InsertResult {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id,
            hash: record.hash,
            last_modified: record.last_modified,
        }
    }
}

/// A validated document ready to be written.
#[derive(Debug, Clone)]
pub(crate) struct EncodedDocument {
    pub data: Document,
    pub payload: Vec<u8>,
    pub hash: ContentHash,
}

impl EncodedDocument {
    /// Validates and encodes caller input.
    pub(crate) fn new(data: Document) -> CoreResult<Self> {
        data.validate().map_err(CoreError::from_encode)?;
        let payload = encode_document(&data).map_err(CoreError::from_encode)?;
        let hash = fingerprint(&payload);
        Ok(Self {
            data,
            payload,
            hash,
        })
    }
}

/// Document slot body:
/// `collection_id u32 | doc_id u64 | last_modified i64 | hash [32] | payload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DocumentBody {
    pub collection: CollectionId,
    pub id: DocumentId,
    pub last_modified: Timestamp,
    pub hash: ContentHash,
    pub payload: Vec<u8>,
}

impl DocumentBody {
    const PREFIX_LEN: usize = 4 + 8 + 8 + ContentHash::LEN;

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::PREFIX_LEN + self.payload.len());
        buf.extend_from_slice(&self.collection.as_u32().to_le_bytes());
        buf.extend_from_slice(&self.id.as_u64().to_le_bytes());
        buf.extend_from_slice(&self.last_modified.as_micros().to_le_bytes());
        buf.extend_from_slice(self.hash.as_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decodes a body read from the slot at `offset`.
    pub(crate) fn decode(offset: u64, data: &[u8]) -> CoreResult<Self> {
        if data.len() < Self::PREFIX_LEN {
            return Err(CoreError::corrupt(offset, "document body too short"));
        }
        let mut id = [0u8; 8];
        id.copy_from_slice(&data[4..12]);
        let mut modified = [0u8; 8];
        modified.copy_from_slice(&data[12..20]);
        let mut hash = [0u8; ContentHash::LEN];
        hash.copy_from_slice(&data[20..Self::PREFIX_LEN]);

        Ok(Self {
            collection: CollectionId::new(u32::from_le_bytes([data[0], data[1], data[2], data[3]])),
            id: DocumentId::new(u64::from_le_bytes(id)),
            last_modified: Timestamp::from_micros(i64::from_le_bytes(modified)),
            hash: ContentHash::from_bytes(hash),
            payload: data[Self::PREFIX_LEN..].to_vec(),
        })
    }

    /// Decodes the payload into a [`Record`].
    pub(crate) fn into_record(self, offset: u64) -> CoreResult<Record> {
        let data = decode_document(&self.payload).map_err(|e| CoreError::from_decode(offset, e))?;
        Ok(Record {
            id: self.id,
            data,
            hash: self.hash,
            last_modified: self.last_modified,
        })
    }
}
