//! Ledger access behind the [ChainGateway] trait.
//!
//! The claim engine and batch driver only see this trait. [JsonRpcGateway]
//! talks to a node over JSON-RPC; [MockGateway] is a scripted in-memory
//! implementation for tests.

pub mod abi;
pub mod mock;
pub mod rpc;
pub mod signer;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::PackedStatus;

pub use mock::{MockGateway, SubmitBehavior};
pub use rpc::JsonRpcGateway;
pub use signer::SigningKey;

/// Token ID of one mint record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for PositionId {
    fn from(v: u64) -> Self {
        PositionId(v)
    }
}

/// 20-byte account or contract address.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; 20]);

impl FromStr for Address {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(digits)
            .map_err(|e| GatewayError::Decode(format!("address {s:?}: {e}")))?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| GatewayError::Decode(format!("address {s:?}: expected 20 bytes")))?;
        Ok(Address(arr))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Transaction hash returned on submission.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl FromStr for TxHash {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| GatewayError::Decode(format!("tx hash {s:?}: {e}")))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| GatewayError::Decode(format!("tx hash {s:?}: expected 32 bytes")))?;
        Ok(TxHash(arr))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Failure,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub status: ReceiptStatus,
}

/// Fields of a legacy transaction before signing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: u128,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("sequence number conflict: {0}")]
    SequenceConflict(String),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("signing failed: {0}")]
    Signing(String),
}

impl GatewayError {
    /// Nonce races are resolved by refreshing the sequence number and resubmitting.
    pub fn is_sequence_conflict(&self) -> bool {
        match self {
            GatewayError::SequenceConflict(_) => true,
            GatewayError::Rpc { message, .. } => is_sequence_conflict_message(message),
            _ => false,
        }
    }
}

pub(crate) fn is_sequence_conflict_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("nonce")
        || lower.contains("replacement transaction underpriced")
        || lower.contains("already known")
}

/// Read/write access to the ledger for one claim contract.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Position IDs owned by `account`, in acquisition order.
    async fn owned_positions(&self, account: &Address) -> Result<Vec<PositionId>, GatewayError>;

    /// The position's `tokenURI` descriptor document.
    async fn position_document(&self, id: PositionId) -> Result<String, GatewayError>;

    /// The position's packed `mintInfo` status word.
    async fn packed_status(&self, id: PositionId) -> Result<PackedStatus, GatewayError>;

    async fn fee_rate(&self) -> Result<u128, GatewayError>;

    async fn sequence_number(&self, account: &Address) -> Result<u64, GatewayError>;

    /// Signs `tx` with `key` and broadcasts it.
    async fn submit_signed(
        &self,
        tx: &UnsignedTransaction,
        key: &SigningKey,
    ) -> Result<TxHash, GatewayError>;

    /// `None` until the transaction is mined.
    async fn receipt(&self, tx_hash: &TxHash) -> Result<Option<Receipt>, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parses_with_and_without_prefix() {
        let a: Address = "0xd638e3657a4000b944AC517BD3aFe2Ba964E3B92".parse().unwrap();
        let b: Address = "d638e3657a4000b944ac517bd3afe2ba964e3b92".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "0xd638e3657a4000b944ac517bd3afe2ba964e3b92");
    }

    #[test]
    fn address_rejects_wrong_length() {
        assert!("0x1234".parse::<Address>().is_err());
        assert!("not-hex".parse::<Address>().is_err());
    }

    #[test]
    fn nonce_errors_are_sequence_conflicts() {
        let low = GatewayError::Rpc {
            code: -32000,
            message: "nonce too low".into(),
        };
        assert!(low.is_sequence_conflict());
        let underpriced = GatewayError::Rpc {
            code: -32000,
            message: "replacement transaction underpriced".into(),
        };
        assert!(underpriced.is_sequence_conflict());
        let funds = GatewayError::Rpc {
            code: -32000,
            message: "insufficient funds for gas * price + value".into(),
        };
        assert!(!funds.is_sequence_conflict());
        assert!(!GatewayError::Transport("reset".into()).is_sequence_conflict());
    }
}
