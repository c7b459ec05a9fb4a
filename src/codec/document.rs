//! Decoding of a position's `tokenURI` descriptor document.
//!
//! The document is a `data:` URI carrying base64 JSON. Attribute 7 holds the
//! due date and attribute 8 the term; a top-level `redeemed` flag may be
//! present. The due date is a fixed-format string and is parsed strictly.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::MetadataParseError;

const DUE_DATE_ATTRIBUTE: usize = 7;
const TERM_ATTRIBUTE: usize = 8;
const DUE_DATE_FORMAT: &str = "%b %d, %Y %H:%M";

/// Descriptive fields taken from the descriptor document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PositionMetadata {
    pub term: u16,
    /// Raw due-date string, kept verbatim for the cache.
    pub due_date: String,
    pub redeemed: bool,
}

impl PositionMetadata {
    pub fn due_at(&self) -> Result<DateTime<Utc>, MetadataParseError> {
        parse_due_date(&self.due_date)
    }
}

#[derive(Deserialize)]
struct RawDocument {
    #[serde(default)]
    attributes: Vec<RawAttribute>,
    #[serde(default)]
    redeemed: Option<bool>,
}

#[derive(Deserialize)]
struct RawAttribute {
    #[serde(default)]
    value: Value,
}

pub fn decode_document(uri: &str) -> Result<PositionMetadata, MetadataParseError> {
    let (header, payload) = uri
        .split_once(',')
        .ok_or(MetadataParseError::NotDataUri)?;
    if !header.starts_with("data:") {
        return Err(MetadataParseError::NotDataUri);
    }
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| MetadataParseError::Base64(e.to_string()))?;
    let doc: RawDocument =
        serde_json::from_slice(&bytes).map_err(|e| MetadataParseError::Json(e.to_string()))?;

    let due_date = attribute_text(&doc, DUE_DATE_ATTRIBUTE)?;
    let term_text = attribute_text(&doc, TERM_ATTRIBUTE)?;
    let term = parse_term(&term_text)?;
    // Reject drifted formats here rather than later in the batch.
    parse_due_date(&due_date)?;

    Ok(PositionMetadata {
        term,
        due_date,
        redeemed: doc.redeemed.unwrap_or(false),
    })
}

fn attribute_text(doc: &RawDocument, index: usize) -> Result<String, MetadataParseError> {
    match doc.attributes.get(index).map(|a| &a.value) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(MetadataParseError::MissingAttribute(index)),
    }
}

pub fn parse_term(text: &str) -> Result<u16, MetadataParseError> {
    text.trim()
        .parse::<u16>()
        .map_err(|_| MetadataParseError::Term(text.to_string()))
}

/// Parses `"<Mon> <Day>, <Year> <HH>:<MM> <TZ>"`. Only `UTC`/`GMT` are accepted.
pub fn parse_due_date(text: &str) -> Result<DateTime<Utc>, MetadataParseError> {
    let fail = |reason: &str| MetadataParseError::DueDate {
        value: text.to_string(),
        reason: reason.to_string(),
    };
    let trimmed = text.trim();
    let (stamp, zone) = trimmed
        .rsplit_once(' ')
        .ok_or_else(|| fail("missing time zone"))?;
    if !matches!(zone, "UTC" | "GMT") {
        return Err(fail("time zone must be UTC"));
    }
    let naive = NaiveDateTime::parse_from_str(stamp, DUE_DATE_FORMAT)
        .map_err(|e| fail(&e.to_string()))?;
    Ok(naive.and_utc())
}

/// True once `due_date` is at or before `now`.
pub fn is_due(due_date: &str, now: DateTime<Utc>) -> Result<bool, MetadataParseError> {
    Ok(parse_due_date(due_date)? <= now)
}

/// Builds a descriptor document in the contract's format. Used by
/// [crate::gateway::MockGateway] to serve realistic documents.
pub fn encode_document(term: &str, due_date: &str, redeemed: Option<bool>) -> String {
    let mut attributes: Vec<Value> = (0..TERM_ATTRIBUTE + 1)
        .map(|i| serde_json::json!({ "trait_type": format!("t{i}"), "value": "" }))
        .collect();
    attributes[DUE_DATE_ATTRIBUTE] = serde_json::json!({ "trait_type": "Maturity DateTime", "value": due_date });
    attributes[TERM_ATTRIBUTE] = serde_json::json!({ "trait_type": "Term", "value": term });
    let mut doc = serde_json::json!({ "name": "XENFT", "attributes": attributes });
    if let Some(flag) = redeemed {
        doc["redeemed"] = Value::Bool(flag);
    }
    format!("data:application/json;base64,{}", STANDARD.encode(doc.to_string()))
}
