//! Decoder for the packed `mintInfo` status word.
//!
//! The contract packs a position's maturity state into one 256-bit integer
//! (bit 0 is least significant):
//!
//! ```text
//! 255      240 239          176 175        48 47   32 31   16 15    8 7      0
//! |   term   | maturity ts    |    rank     | amp   | eaa   | class | redeemed |
//! ```
//!
//! Decoding is total: every input yields a record.

use serde::{Deserialize, Serialize};

/// A 256-bit unsigned integer stored as two 128-bit halves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PackedStatus {
    hi: u128,
    lo: u128,
}

impl PackedStatus {
    pub const ZERO: Self = Self { hi: 0, lo: 0 };

    pub const fn from_parts(hi: u128, lo: u128) -> Self {
        Self { hi, lo }
    }

    /// Builds the word from its 32-byte big-endian ABI encoding.
    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        let mut hi = [0u8; 16];
        let mut lo = [0u8; 16];
        hi.copy_from_slice(&bytes[..16]);
        lo.copy_from_slice(&bytes[16..]);
        Self {
            hi: u128::from_be_bytes(hi),
            lo: u128::from_be_bytes(lo),
        }
    }

    pub fn to_be_bytes(self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[..16].copy_from_slice(&self.hi.to_be_bytes());
        out[16..].copy_from_slice(&self.lo.to_be_bytes());
        out
    }
}

impl From<u128> for PackedStatus {
    fn from(lo: u128) -> Self {
        Self { hi: 0, lo }
    }
}

/// Structured view of a [PackedStatus].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaturityRecord {
    /// Term length in days.
    pub term: u16,
    /// Unix seconds after which the position may be claimed.
    pub maturity_ts: u64,
    pub rank: u128,
    pub amplifier: u16,
    pub extra_amplifier_amount: u16,
    /// Low six bits of the class byte.
    pub class_code: u8,
    pub is_apex: bool,
    pub is_limited: bool,
    pub redeemed: bool,
}

const RANK_HI_BITS: u32 = 48;

pub fn decode_maturity(packed: PackedStatus) -> MaturityRecord {
    let PackedStatus { hi, lo } = packed;

    // bits 128..=175 live in the low 48 bits of `hi` and form the top of rank.
    let rank_hi = hi & ((1u128 << RANK_HI_BITS) - 1);
    let rank = (lo >> 48) | (rank_hi << 80);

    let class_byte = ((lo >> 8) & 0xFF) as u8;
    let redeemed_byte = (lo & 0xFF) as u8;

    MaturityRecord {
        term: ((hi >> 112) & 0xFFFF) as u16,
        maturity_ts: ((hi >> 48) & 0xFFFF_FFFF_FFFF_FFFF) as u64,
        rank,
        amplifier: ((lo >> 32) & 0xFFFF) as u16,
        extra_amplifier_amount: ((lo >> 16) & 0xFFFF) as u16,
        class_code: class_byte & 0x3F,
        is_apex: class_byte & 0x80 != 0,
        is_limited: class_byte & 0x40 != 0,
        redeemed: redeemed_byte == 1,
    }
}
