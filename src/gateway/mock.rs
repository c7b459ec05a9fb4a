//! Scripted in-memory [ChainGateway].
//!
//! Positions, documents and submission outcomes are configured up front; every
//! call is counted so tests can assert which chain operations were (not) made.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::codec::document::encode_document;
use crate::codec::PackedStatus;

use super::abi::keccak256;
use super::{
    Address, ChainGateway, GatewayError, PositionId, Receipt, ReceiptStatus, SigningKey, TxHash,
    UnsignedTransaction,
};

/// What happens when a claim for a position is submitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitBehavior {
    /// Accepted and mined successfully.
    Confirm,
    /// Accepted and mined with a failed status.
    Revert,
    /// Accepted but never mined.
    NeverMined,
    /// Rejected with a nonce error.
    SequenceConflict,
    /// Rejected with any other RPC error.
    Reject(String),
}

/// Per-operation call counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub owned_positions: usize,
    pub position_document: usize,
    pub packed_status: usize,
    pub fee_rate: usize,
    pub sequence_number: usize,
    pub submit_signed: usize,
    pub receipt: usize,
}

impl CallCounts {
    /// All calls that only read chain state.
    pub fn reads(&self) -> usize {
        self.owned_positions
            + self.position_document
            + self.packed_status
            + self.fee_rate
            + self.sequence_number
            + self.receipt
    }

    pub fn writes(&self) -> usize {
        self.submit_signed
    }
}

#[derive(Default)]
struct MockState {
    owned: Vec<PositionId>,
    enumeration_failures: usize,
    documents: HashMap<PositionId, String>,
    statuses: HashMap<PositionId, PackedStatus>,
    scripts: HashMap<PositionId, VecDeque<SubmitBehavior>>,
    mined: HashMap<TxHash, Option<ReceiptStatus>>,
    nonce: u64,
    fee_rate: u128,
    calls: CallCounts,
    submissions: Vec<UnsignedTransaction>,
}

#[derive(Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

/// Reads the token id back out of `bulkClaimMintReward` call data.
fn claimed_position(data: &[u8]) -> Option<PositionId> {
    let word = data.get(4..36)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[24..]);
    Some(PositionId(u64::from_be_bytes(buf)))
}

impl MockGateway {
    pub fn new() -> Self {
        let gw = Self::default();
        gw.state().fee_rate = 1_000_000_000;
        gw
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sets the enumeration result, in acquisition order.
    pub fn with_owned(self, ids: &[u64]) -> Self {
        self.state().owned = ids.iter().copied().map(PositionId).collect();
        self
    }

    /// Registers a well-formed document and an unredeemed status word.
    pub fn with_position(self, id: u64, term: u16, due_date: &str) -> Self {
        {
            let mut state = self.state();
            state.documents.insert(
                PositionId(id),
                encode_document(&term.to_string(), due_date, None),
            );
            state.statuses.insert(PositionId(id), PackedStatus::ZERO);
        }
        self
    }

    pub fn with_document(self, id: u64, document: impl Into<String>) -> Self {
        self.state().documents.insert(PositionId(id), document.into());
        self
    }

    pub fn with_packed_status(self, id: u64, status: PackedStatus) -> Self {
        self.state().statuses.insert(PositionId(id), status);
        self
    }

    /// The first `n` enumeration calls fail with a transport error.
    pub fn fail_enumeration(self, n: usize) -> Self {
        self.state().enumeration_failures = n;
        self
    }

    /// Outcomes for successive submissions for `id`; once exhausted, submissions confirm.
    pub fn script_submissions(self, id: u64, behaviors: Vec<SubmitBehavior>) -> Self {
        self.state()
            .scripts
            .insert(PositionId(id), behaviors.into_iter().collect());
        self
    }

    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    pub fn submissions(&self) -> Vec<UnsignedTransaction> {
        self.state().submissions.clone()
    }
}

#[async_trait]
impl ChainGateway for MockGateway {
    async fn owned_positions(&self, _account: &Address) -> Result<Vec<PositionId>, GatewayError> {
        let mut state = self.state();
        state.calls.owned_positions += 1;
        if state.enumeration_failures > 0 {
            state.enumeration_failures -= 1;
            return Err(GatewayError::Transport("connection reset".into()));
        }
        Ok(state.owned.clone())
    }

    async fn position_document(&self, id: PositionId) -> Result<String, GatewayError> {
        let mut state = self.state();
        state.calls.position_document += 1;
        state.documents.get(&id).cloned().ok_or(GatewayError::Rpc {
            code: 3,
            message: "execution reverted: ERC721: invalid token ID".into(),
        })
    }

    async fn packed_status(&self, id: PositionId) -> Result<PackedStatus, GatewayError> {
        let mut state = self.state();
        state.calls.packed_status += 1;
        Ok(state.statuses.get(&id).copied().unwrap_or_default())
    }

    async fn fee_rate(&self) -> Result<u128, GatewayError> {
        let mut state = self.state();
        state.calls.fee_rate += 1;
        Ok(state.fee_rate)
    }

    async fn sequence_number(&self, _account: &Address) -> Result<u64, GatewayError> {
        let mut state = self.state();
        state.calls.sequence_number += 1;
        Ok(state.nonce)
    }

    async fn submit_signed(
        &self,
        tx: &UnsignedTransaction,
        _key: &SigningKey,
    ) -> Result<TxHash, GatewayError> {
        let mut state = self.state();
        state.calls.submit_signed += 1;
        state.submissions.push(tx.clone());

        let behavior = claimed_position(&tx.data)
            .and_then(|id| state.scripts.get_mut(&id))
            .and_then(VecDeque::pop_front)
            .unwrap_or(SubmitBehavior::Confirm);

        let receipt_status = match behavior {
            SubmitBehavior::SequenceConflict => {
                return Err(GatewayError::SequenceConflict("nonce too low".into()))
            }
            SubmitBehavior::Reject(message) => {
                return Err(GatewayError::Rpc {
                    code: -32000,
                    message,
                })
            }
            SubmitBehavior::Confirm => Some(ReceiptStatus::Success),
            SubmitBehavior::Revert => Some(ReceiptStatus::Failure),
            SubmitBehavior::NeverMined => None,
        };

        let mut preimage = tx.nonce.to_be_bytes().to_vec();
        preimage.extend_from_slice(&tx.data);
        let hash = TxHash(keccak256(&preimage));
        state.nonce += 1;
        state.mined.insert(hash, receipt_status);
        Ok(hash)
    }

    async fn receipt(&self, tx_hash: &TxHash) -> Result<Option<Receipt>, GatewayError> {
        let mut state = self.state();
        state.calls.receipt += 1;
        Ok(state
            .mined
            .get(tx_hash)
            .copied()
            .flatten()
            .map(|status| Receipt {
                tx_hash: *tx_hash,
                status,
            }))
    }
}
