//! Error types for the claimer.
//!
//! [ClaimError] is fatal to a run (enumeration, storage, configuration).
//! Per-position failures never surface here; the claim engine turns them into
//! [crate::engine::ClaimOutcome] values so the batch can continue.

use thiserror::Error;

use crate::gateway::GatewayError;

/// Failure decoding a position's descriptor document or its due date.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataParseError {
    #[error("document is not a data URI")]
    NotDataUri,
    #[error("document payload is not valid base64: {0}")]
    Base64(String),
    #[error("document payload is not valid JSON: {0}")]
    Json(String),
    #[error("document has no attribute at index {0}")]
    MissingAttribute(usize),
    #[error("term value {0:?} is not a number of days")]
    Term(String),
    #[error("due date {value:?} does not match \"<Mon> <Day>, <Year> <HH>:<MM> UTC\": {reason}")]
    DueDate { value: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("failed to enumerate owned positions after {attempts} attempts: {source}")]
    Enumeration {
        attempts: usize,
        #[source]
        source: GatewayError,
    },
    #[error("position cache {path}: {message}")]
    Storage { path: String, message: String },
    #[error("metadata: {0}")]
    MetadataParse(#[from] MetadataParseError),
    #[error("configuration: {0}")]
    Config(String),
    #[error("gateway: {0}")]
    Gateway(#[from] GatewayError),
}

impl ClaimError {
    pub(crate) fn storage(path: impl AsRef<std::path::Path>, e: impl std::fmt::Display) -> Self {
        ClaimError::Storage {
            path: path.as_ref().display().to_string(),
            message: e.to_string(),
        }
    }
}
