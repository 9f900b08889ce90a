//! Canonical CBOR decoder.
//!
//! Only the subset written by the encoder is accepted: anything a
//! canonical encoder could not have produced is rejected rather than
//! normalized, so stored bytes always re-encode to themselves.

use crate::cbor::{self, key_order, ARG_WIDTHS};
use crate::document::{Document, MAX_DEPTH};
use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::cmp::Ordering;

/// Largest element count accepted for an array or map.
const MAX_ELEMENTS: u64 = 16 * 1024 * 1024;

/// Largest byte or text string accepted.
const MAX_STRING_LEN: u64 = 256 * 1024 * 1024;

/// Decode a single value from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not canonical CBOR as produced by
/// [`crate::to_canonical_cbor`], or if bytes remain after the value.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = CanonicalDecoder::new(bytes);
    let value = decoder.decode()?;
    decoder.finish()?;
    Ok(value)
}

/// Decode a document from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not a canonical CBOR map with text
/// keys, or if bytes remain after it.
pub fn decode_document(bytes: &[u8]) -> CodecResult<Document> {
    match from_cbor(bytes)? {
        Value::Map(document) => Ok(document),
        other => Err(CodecError::invalid_structure(format!(
            "expected a map, found {}",
            other.type_name()
        ))),
    }
}

/// Reads canonical CBOR items from a byte slice.
#[derive(Debug)]
pub struct CanonicalDecoder<'a> {
    input: &'a [u8],
    depth: usize,
}

impl<'a> CanonicalDecoder<'a> {
    /// Create a decoder positioned at the start of `input`.
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, depth: 0 }
    }

    /// Decode the next item.
    ///
    /// # Errors
    ///
    /// Returns an error for truncated, non-canonical or unsupported input.
    pub fn decode(&mut self) -> CodecResult<Value> {
        let initial = self.take_byte()?;
        let (major, info) = (initial >> 5, initial & 0x1f);

        match major {
            cbor::UNSIGNED => self.read_arg(info).and_then(|n| {
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::invalid_structure("integer out of range"))
            }),
            cbor::NEGATIVE => self.read_arg(info).and_then(|n| {
                i64::try_from(n)
                    .map(|n| Value::Integer(!n))
                    .map_err(|_| CodecError::invalid_structure("integer out of range"))
            }),
            cbor::BYTES => Ok(Value::Bytes(self.read_string(info)?.to_vec())),
            cbor::TEXT => self.read_text(info).map(Value::Text),
            cbor::ARRAY => self.nested(|d| d.read_array(info)),
            cbor::MAP => self.nested(|d| d.read_map(info)),
            cbor::TAG => Err(CodecError::unsupported_type("tagged value")),
            cbor::SIMPLE => self.read_simple(info),
            _ => Err(CodecError::invalid_structure("invalid major type")),
        }
    }

    /// Check that the whole input was consumed.
    ///
    /// # Errors
    ///
    /// Returns an error naming the number of trailing bytes.
    pub fn finish(&self) -> CodecResult<()> {
        match self.input.len() {
            0 => Ok(()),
            n => Err(CodecError::invalid_structure(format!("{n} trailing bytes"))),
        }
    }

    /// Bytes not decoded yet.
    pub fn remaining(&self) -> &'a [u8] {
        self.input
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> CodecResult<T>) -> CodecResult<T> {
        if self.depth >= MAX_DEPTH {
            return Err(CodecError::TooDeep { max: MAX_DEPTH });
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        if len > self.input.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let (head, rest) = self.input.split_at(len);
        self.input = rest;
        Ok(head)
    }

    fn take_byte(&mut self) -> CodecResult<u8> {
        self.take(1).map(|b| b[0])
    }

    fn take_u64(&mut self, width: usize) -> CodecResult<u64> {
        let mut raw = [0u8; 8];
        raw[8 - width..].copy_from_slice(self.take(width)?);
        Ok(u64::from_be_bytes(raw))
    }

    /// Reads a head argument, rejecting any wider than necessary.
    fn read_arg(&mut self, info: u8) -> CodecResult<u64> {
        match info {
            0..=23 => Ok(u64::from(info)),
            24..=27 => {
                let width = ARG_WIDTHS
                    .iter()
                    .find(|(i, _)| *i == info)
                    .map_or(8, |&(_, width)| width);
                let value = self.take_u64(width)?;
                if cbor::shortest_arg(value).map(|(_, w)| w) != Some(width) {
                    return Err(CodecError::invalid_structure(
                        "non-canonical: value could be encoded in fewer bytes",
                    ));
                }
                Ok(value)
            }
            28..=30 => Err(CodecError::invalid_structure("reserved additional info")),
            _ => Err(CodecError::IndefiniteLengthForbidden),
        }
    }

    fn read_len(&mut self, info: u8, limit: u64) -> CodecResult<usize> {
        let claimed = self.read_arg(info)?;
        let exceeded = CodecError::SizeLimitExceeded {
            claimed,
            max_allowed: limit,
        };
        if claimed > limit {
            return Err(exceeded);
        }
        usize::try_from(claimed).map_err(|_| exceeded)
    }

    fn read_string(&mut self, info: u8) -> CodecResult<&'a [u8]> {
        let len = self.read_len(info, MAX_STRING_LEN)?;
        self.take(len)
    }

    fn read_text(&mut self, info: u8) -> CodecResult<String> {
        let bytes = self.read_string(info)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    fn read_array(&mut self, info: u8) -> CodecResult<Value> {
        let len = self.read_len(info, MAX_ELEMENTS)?;
        // Each element needs at least one byte, so never reserve more
        let mut items = Vec::with_capacity(len.min(self.input.len()));
        for _ in 0..len {
            items.push(self.decode()?);
        }
        Ok(Value::Array(items))
    }

    fn read_map(&mut self, info: u8) -> CodecResult<Value> {
        let len = self.read_len(info, MAX_ELEMENTS)?;
        let mut document = Document::new();
        let mut previous: Option<String> = None;

        for _ in 0..len {
            let key_head = self.take_byte()?;
            if key_head >> 5 != cbor::TEXT {
                return Err(CodecError::invalid_structure("map keys must be text"));
            }
            let key = self.read_text(key_head & 0x1f)?;
            if previous
                .as_deref()
                .is_some_and(|prev| key_order(prev, &key) != Ordering::Less)
            {
                return Err(CodecError::invalid_structure(
                    "non-canonical: map keys not in sorted order",
                ));
            }

            let value = self.decode()?;
            document.insert(key.as_str(), value);
            previous = Some(key);
        }

        Ok(Value::Map(document))
    }

    fn read_simple(&mut self, info: u8) -> CodecResult<Value> {
        match 0xe0 | info {
            cbor::FALSE => Ok(Value::Bool(false)),
            cbor::TRUE => Ok(Value::Bool(true)),
            cbor::NULL => Ok(Value::Null),
            cbor::FLOAT64 => {
                let value = f64::from_bits(self.take_u64(8)?);
                if value.is_nan() {
                    return Err(CodecError::NaNForbidden);
                }
                Ok(Value::Float(value))
            }
            0xf9 | 0xfa => Err(CodecError::invalid_structure(
                "non-canonical: floats must be 64-bit",
            )),
            0xfc..=0xfe => Err(CodecError::invalid_structure("reserved additional info")),
            0xff => Err(CodecError::invalid_structure("break without indefinite")),
            _ => Err(CodecError::unsupported_type(format!("simple value {info}"))),
        }
    }
}
