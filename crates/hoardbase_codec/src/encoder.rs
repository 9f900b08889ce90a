//! Canonical CBOR encoder.

use crate::cbor::{self, key_order, shortest_arg};
use crate::document::Document;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Encode a value to canonical CBOR bytes (RFC 8949 section 4.2.1).
///
/// Map keys are written in length-first order, integers and lengths in
/// their shortest form, floats as 64-bit doubles, and every item with a
/// definite length.
///
/// # Errors
///
/// Returns an error if the value contains a NaN float.
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// Encode a document to canonical CBOR bytes.
///
/// Equal documents always produce equal bytes.
///
/// # Errors
///
/// Returns an error if the document contains a NaN float.
pub fn encode_document(document: &Document) -> CodecResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.write_map(document)?;
    Ok(encoder.into_bytes())
}

/// Appends canonical CBOR items to a buffer.
#[derive(Debug, Default)]
pub struct CanonicalEncoder {
    out: Vec<u8>,
}

impl CanonicalEncoder {
    /// Create an empty encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value contains a NaN float. Bytes written
    /// before the NaN stay in the buffer.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Null => self.out.push(cbor::NULL),
            Value::Bool(b) => self.out.push(if *b { cbor::TRUE } else { cbor::FALSE }),
            Value::Integer(n) => self.write_integer(*n),
            Value::Float(f) => {
                if f.is_nan() {
                    return Err(CodecError::NaNForbidden);
                }
                self.out.push(cbor::FLOAT64);
                self.out.extend_from_slice(&f.to_be_bytes());
            }
            Value::Bytes(bytes) => self.write_slice(cbor::BYTES, bytes),
            Value::Text(text) => self.write_slice(cbor::TEXT, text.as_bytes()),
            Value::Array(items) => {
                self.write_head(cbor::ARRAY, items.len() as u64);
                for item in items {
                    self.encode(item)?;
                }
            }
            Value::Map(document) => self.write_map(document)?,
        }
        Ok(())
    }

    /// Consume the encoder and return the bytes written so far.
    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_head(&mut self, major: u8, arg: u64) {
        let major = major << 5;
        match shortest_arg(arg) {
            None => self.out.push(major | arg as u8),
            Some((info, width)) => {
                self.out.push(major | info);
                self.out.extend_from_slice(&arg.to_be_bytes()[8 - width..]);
            }
        }
    }

    #[allow(clippy::cast_sign_loss)]
    fn write_integer(&mut self, n: i64) {
        // Negative n is stored as -1 - n, which always fits in a u64
        if n < 0 {
            self.write_head(cbor::NEGATIVE, !n as u64);
        } else {
            self.write_head(cbor::UNSIGNED, n as u64);
        }
    }

    fn write_slice(&mut self, major: u8, bytes: &[u8]) {
        self.write_head(major, bytes.len() as u64);
        self.out.extend_from_slice(bytes);
    }

    fn write_map(&mut self, document: &Document) -> CodecResult<()> {
        let mut fields: Vec<_> = document.iter().collect();
        fields.sort_unstable_by(|(a, _), (b, _)| key_order(a, b));

        self.write_head(cbor::MAP, fields.len() as u64);
        for (key, value) in fields {
            self.write_slice(cbor::TEXT, key.as_bytes());
            self.encode(value)?;
        }
        Ok(())
    }
}
