//! Pure decoders for on-chain position data.

pub mod bitfield;
pub mod document;

pub use bitfield::{decode_maturity, MaturityRecord, PackedStatus};
pub use document::{decode_document, is_due, parse_due_date, PositionMetadata};
