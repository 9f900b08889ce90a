//! # HoardBase Codec
//!
//! Document values and their canonical CBOR encoding.
//!
//! Every document stored by HoardBase is encoded with the rules below, so
//! equal documents always produce equal bytes and therefore equal
//! fingerprints:
//!
//! - Map keys are text, sorted length-first then bytewise
//! - Integers use the shortest encoding
//! - Floats are always 64-bit doubles; NaN is rejected
//! - Strings must be UTF-8
//! - No indefinite-length items and no tags
//!
//! ## Usage
//!
//! ```
//! use hoardbase_codec::{decode_document, doc, encode_document, fingerprint};
//!
//! let document = doc! { "name" => "test", "count" => 2 };
//! let bytes = encode_document(&document).unwrap();
//! assert_eq!(decode_document(&bytes).unwrap(), document);
//!
//! let hash = fingerprint(&bytes);
//! assert_eq!(hash.to_string().len(), 64);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod decoder;
mod document;
mod encoder;
mod error;
mod hash;
mod value;

pub use decoder::{decode_document, from_cbor, CanonicalDecoder};
pub use document::{Document, MAX_DEPTH, PATH_SEPARATOR};
pub use encoder::{encode_document, to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use hash::{fingerprint, ContentHash};
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use proptest::prelude::*;

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            any::<f64>()
                .prop_filter("NaN is not storable", |f| !f.is_nan())
                .prop_map(Value::Float),
            prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
            "[a-z0-9 ]{0,12}".prop_map(Value::Text),
        ];
        leaf.prop_recursive(4, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..6)
                    .prop_map(|fields| Value::Map(fields.into_iter().collect())),
            ]
        })
    }

    fn arb_document() -> impl Strategy<Value = Document> {
        prop::collection::btree_map("[a-z_]{1,8}", arb_value(), 0..8)
            .prop_map(|fields| fields.into_iter().collect())
    }

    #[test]
    fn roundtrip_nested() {
        let document = doc! {
            "users" => vec![
                doc! { "name" => "Alice", "age" => 30 },
                doc! { "name" => "Bob", "age" => 25 },
            ],
            "count" => 2,
        };
        let bytes = encode_document(&document).unwrap();
        assert_eq!(decode_document(&bytes).unwrap(), document);
    }

    #[test]
    fn insertion_order_does_not_change_hash() {
        let a = doc! { "b" => 1, "a" => 2 };
        let b = doc! { "a" => 2, "b" => 1 };
        assert_eq!(
            fingerprint(&encode_document(&a).unwrap()),
            fingerprint(&encode_document(&b).unwrap())
        );
    }

    proptest! {
        #[test]
        fn prop_document_roundtrip(document in arb_document()) {
            let bytes = encode_document(&document).unwrap();
            prop_assert_eq!(decode_document(&bytes).unwrap(), document);
        }

        #[test]
        fn prop_value_roundtrip(value in arb_value()) {
            let bytes = to_canonical_cbor(&value).unwrap();
            prop_assert_eq!(from_cbor(&bytes).unwrap(), value);
        }

        #[test]
        fn prop_hash_equal_iff_data_equal(a in arb_document(), b in arb_document()) {
            let ha = fingerprint(&encode_document(&a).unwrap());
            let hb = fingerprint(&encode_document(&b).unwrap());
            prop_assert_eq!(ha == hb, a == b);
        }
    }
}
