//! CBOR constants shared by the encoder and decoder.

use std::cmp::Ordering;

pub(crate) const UNSIGNED: u8 = 0;
pub(crate) const NEGATIVE: u8 = 1;
pub(crate) const BYTES: u8 = 2;
pub(crate) const TEXT: u8 = 3;
pub(crate) const ARRAY: u8 = 4;
pub(crate) const MAP: u8 = 5;
pub(crate) const TAG: u8 = 6;
pub(crate) const SIMPLE: u8 = 7;

pub(crate) const FALSE: u8 = 0xf4;
pub(crate) const TRUE: u8 = 0xf5;
pub(crate) const NULL: u8 = 0xf6;
pub(crate) const FLOAT64: u8 = 0xfb;

/// Additional-info values that announce 1, 2, 4 or 8 argument bytes.
pub(crate) const ARG_WIDTHS: [(u8, usize); 4] = [(24, 1), (25, 2), (26, 4), (27, 8)];

/// Argument byte count for `value` in the shortest form, and the
/// additional-info value announcing it (`None` when it fits in the head).
pub(crate) fn shortest_arg(value: u64) -> Option<(u8, usize)> {
    match value {
        0..=23 => None,
        24..=0xff => Some(ARG_WIDTHS[0]),
        0x100..=0xffff => Some(ARG_WIDTHS[1]),
        0x1_0000..=0xffff_ffff => Some(ARG_WIDTHS[2]),
        _ => Some(ARG_WIDTHS[3]),
    }
}

/// Canonical map key order: shorter keys first, then bytewise.
///
/// For text keys this equals ordering their encoded forms, since the
/// head grows with the length.
pub(crate) fn key_order(a: &str, b: &str) -> Ordering {
    a.len()
        .cmp(&b.len())
        .then_with(|| a.as_bytes().cmp(b.as_bytes()))
}
