//! Per-position claim state machine.
//!
//! `attempt_claim` walks check → build → submit → confirm → record, stopping at
//! the first terminal outcome. Every failure is reported as a [ClaimOutcome];
//! nothing here aborts the batch.

use std::collections::HashSet;
use std::fmt;

use chrono::Utc;
use tokio::time::sleep;

use crate::codec::{decode_document, decode_maturity};
use crate::config::ClaimerConfig;
use crate::gateway::{abi, Address, ChainGateway, PositionId, SigningKey, TxHash, UnsignedTransaction};

use super::confirm::{await_confirmation, Confirmation, PollConfig};
use super::retry::RetryPolicy;

/// Positions confirmed claimed during the current run. Only grows; never persisted.
#[derive(Debug, Default)]
pub struct RedeemedSet {
    ids: HashSet<PositionId>,
}

impl RedeemedSet {
    pub fn contains(&self, id: PositionId) -> bool {
        self.ids.contains(&id)
    }

    pub(crate) fn record(&mut self, id: PositionId) {
        self.ids.insert(id);
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed { tx_hash: TxHash },
    NotDue,
    AlreadyRedeemed,
    Failed { reason: String },
    /// Every submission hit a sequence-number conflict.
    RetriesExhausted { attempts: usize },
}

impl ClaimOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed { .. })
    }

    fn failed(reason: impl fmt::Display) -> Self {
        ClaimOutcome::Failed {
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for ClaimOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimOutcome::Claimed { tx_hash } => write!(f, "claimed in {tx_hash}"),
            ClaimOutcome::NotDue => f.write_str("not due for claiming yet"),
            ClaimOutcome::AlreadyRedeemed => f.write_str("already redeemed"),
            ClaimOutcome::Failed { reason } => write!(f, "failed: {reason}"),
            ClaimOutcome::RetriesExhausted { attempts } => {
                write!(f, "gave up after {attempts} sequence-number conflicts")
            }
        }
    }
}

pub struct ClaimEngine<'g, G: ?Sized> {
    gateway: &'g G,
    contract: Address,
    chain_id: u64,
    gas_ceiling: u64,
    poll: PollConfig,
    conflict_retry: RetryPolicy,
}

impl<'g, G> ClaimEngine<'g, G>
where
    G: ChainGateway + ?Sized,
{
    pub fn new(gateway: &'g G, config: &ClaimerConfig) -> Self {
        Self {
            gateway,
            contract: config.contract_address,
            chain_id: config.chain_id,
            gas_ceiling: config.gas_ceiling,
            poll: config.poll.clone(),
            conflict_retry: config.conflict_retry.clone(),
        }
    }

    pub async fn attempt_claim(
        &self,
        id: PositionId,
        account: &Address,
        key: &SigningKey,
        redeemed: &mut RedeemedSet,
    ) -> ClaimOutcome {
        if redeemed.contains(id) {
            return ClaimOutcome::AlreadyRedeemed;
        }

        let document = match self.gateway.position_document(id).await {
            Ok(doc) => doc,
            Err(e) => return ClaimOutcome::failed(format!("fetching document: {e}")),
        };
        let metadata = match decode_document(&document) {
            Ok(m) => m,
            Err(e) => return ClaimOutcome::failed(e),
        };
        if metadata.redeemed {
            log::info!("position {id} is redeemed according to its document");
            return ClaimOutcome::AlreadyRedeemed;
        }
        match metadata.due_at() {
            Ok(due) if due > Utc::now() => return ClaimOutcome::NotDue,
            Ok(_) => {}
            Err(e) => return ClaimOutcome::failed(e),
        }

        let packed = match self.gateway.packed_status(id).await {
            Ok(p) => p,
            Err(e) => return ClaimOutcome::failed(format!("fetching mint info: {e}")),
        };
        let record = decode_maturity(packed);
        log::info!("decoded mint info for position {id}: {record:?}");
        if record.redeemed {
            log::info!("position {id} is redeemed according to its mint info");
            return ClaimOutcome::AlreadyRedeemed;
        }

        let data = abi::claim_call(id, account);
        self.submit_until_settled(id, account, key, data, redeemed)
            .await
    }

    async fn submit_until_settled(
        &self,
        id: PositionId,
        account: &Address,
        key: &SigningKey,
        data: Vec<u8>,
        redeemed: &mut RedeemedSet,
    ) -> ClaimOutcome {
        let mut conflicts = 0;
        loop {
            // Fee and nonce are re-read every pass: a failed attempt may have consumed a nonce.
            let gas_price = match self.gateway.fee_rate().await {
                Ok(p) => p,
                Err(e) => return ClaimOutcome::failed(format!("fetching fee rate: {e}")),
            };
            let nonce = match self.gateway.sequence_number(account).await {
                Ok(n) => n,
                Err(e) => return ClaimOutcome::failed(format!("fetching nonce: {e}")),
            };
            let tx = UnsignedTransaction {
                nonce,
                gas_price,
                gas_limit: self.gas_ceiling,
                to: self.contract,
                value: 0,
                data: data.clone(),
                chain_id: self.chain_id,
            };

            match self.gateway.submit_signed(&tx, key).await {
                Ok(tx_hash) => {
                    log::info!("submitted claim for position {id}: {tx_hash} (nonce {nonce})");
                    return match await_confirmation(self.gateway, &tx_hash, &self.poll).await {
                        Confirmation::Confirmed => {
                            redeemed.record(id);
                            ClaimOutcome::Claimed { tx_hash }
                        }
                        Confirmation::Reverted => {
                            ClaimOutcome::failed(format!("transaction {tx_hash} reverted"))
                        }
                        Confirmation::TimedOut => ClaimOutcome::failed(format!(
                            "transaction {tx_hash} not confirmed within {}s",
                            self.poll.timeout.as_secs()
                        )),
                    };
                }
                Err(e) if e.is_sequence_conflict() => {
                    conflicts += 1;
                    log::warn!(
                        "position {id}: sequence conflict {conflicts}/{}: {e}",
                        self.conflict_retry.max_attempts
                    );
                    if conflicts >= self.conflict_retry.max_attempts {
                        return ClaimOutcome::RetriesExhausted {
                            attempts: conflicts,
                        };
                    }
                    sleep(self.conflict_retry.delay_for(conflicts - 1)).await;
                }
                Err(e) => return ClaimOutcome::failed(format!("sending transaction: {e}")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PackedStatus;
    use crate::gateway::{MockGateway, SubmitBehavior};
    use secrecy::SecretString;

    const FUTURE: &str = "Jan 1, 2099 00:00 UTC";
    const PAST: &str = "Jan 1, 2020 00:00 UTC";

    fn key() -> SigningKey {
        SigningKey::new(SecretString::from("46".repeat(32))).unwrap()
    }

    fn account() -> Address {
        Address([0xAA; 20])
    }

    async fn claim(gateway: &MockGateway, id: u64, redeemed: &mut RedeemedSet) -> ClaimOutcome {
        let config = ClaimerConfig::default();
        ClaimEngine::new(gateway, &config)
            .attempt_claim(PositionId(id), &account(), &key(), redeemed)
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn already_recorded_position_makes_no_chain_calls() {
        let gateway = MockGateway::new().with_position(1, 100, PAST);
        let mut redeemed = RedeemedSet::default();
        redeemed.record(PositionId(1));
        assert_eq!(claim(&gateway, 1, &mut redeemed).await, ClaimOutcome::AlreadyRedeemed);
        assert_eq!(gateway.calls().reads(), 0);
        assert_eq!(gateway.calls().writes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn future_due_date_is_not_due_and_never_writes() {
        let gateway = MockGateway::new().with_position(1, 100, FUTURE);
        let mut redeemed = RedeemedSet::default();
        assert_eq!(claim(&gateway, 1, &mut redeemed).await, ClaimOutcome::NotDue);
        assert_eq!(gateway.calls().writes(), 0);
        assert_eq!(gateway.calls().packed_status, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn document_redeemed_flag_short_circuits() {
        let doc = crate::codec::document::encode_document("100", PAST, Some(true));
        let gateway = MockGateway::new().with_document(1, doc);
        let mut redeemed = RedeemedSet::default();
        assert_eq!(claim(&gateway, 1, &mut redeemed).await, ClaimOutcome::AlreadyRedeemed);
        assert_eq!(gateway.calls().packed_status, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn mint_info_redeemed_short_circuits() {
        let gateway = MockGateway::new()
            .with_position(1, 100, PAST)
            .with_packed_status(1, PackedStatus::from(1u128));
        let mut redeemed = RedeemedSet::default();
        assert_eq!(claim(&gateway, 1, &mut redeemed).await, ClaimOutcome::AlreadyRedeemed);
        assert_eq!(gateway.calls().writes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_claim_is_recorded() {
        let gateway = MockGateway::new().with_position(7, 100, PAST);
        let mut redeemed = RedeemedSet::default();
        let outcome = claim(&gateway, 7, &mut redeemed).await;
        assert!(outcome.is_claimed());
        assert!(redeemed.contains(PositionId(7)));

        let subs = gateway.submissions();
        assert_eq!(subs.len(), 1);
        let tx = &subs[0];
        let config = ClaimerConfig::default();
        assert_eq!(tx.chain_id, 4003);
        assert_eq!(tx.gas_limit, 7_000_000);
        assert_eq!(tx.to, config.contract_address);
        assert_eq!(tx.value, 0);
        assert_eq!(tx.data, abi::claim_call(PositionId(7), &account()));

        // Second attempt in the same run is answered locally.
        let reads_before = gateway.calls().reads();
        assert_eq!(claim(&gateway, 7, &mut redeemed).await, ClaimOutcome::AlreadyRedeemed);
        assert_eq!(gateway.calls().reads(), reads_before);
    }

    #[tokio::test(start_paused = true)]
    async fn sequence_conflict_refreshes_nonce_and_resubmits() {
        let gateway = MockGateway::new()
            .with_position(3, 100, PAST)
            .script_submissions(
                3,
                vec![SubmitBehavior::SequenceConflict, SubmitBehavior::SequenceConflict],
            );
        let mut redeemed = RedeemedSet::default();
        assert!(claim(&gateway, 3, &mut redeemed).await.is_claimed());
        let calls = gateway.calls();
        assert_eq!(calls.submit_signed, 3);
        assert_eq!(calls.sequence_number, 3);
        assert_eq!(calls.fee_rate, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_sequence_conflicts_exhaust_retries() {
        let gateway = MockGateway::new()
            .with_position(3, 100, PAST)
            .script_submissions(3, vec![SubmitBehavior::SequenceConflict; 10]);
        let mut redeemed = RedeemedSet::default();
        let started = tokio::time::Instant::now();
        let outcome = claim(&gateway, 3, &mut redeemed).await;
        let max = ClaimerConfig::default().conflict_retry.max_attempts;
        assert_eq!(outcome, ClaimOutcome::RetriesExhausted { attempts: max });
        assert_eq!(gateway.calls().submit_signed, max);
        // Backoff doubles from 1s between the five attempts; no sleep after the last.
        assert_eq!(started.elapsed(), std::time::Duration::from_secs(1 + 2 + 4 + 8));
        assert!(redeemed.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn other_submission_errors_fail_without_retry() {
        let gateway = MockGateway::new().with_position(4, 100, PAST).script_submissions(
            4,
            vec![SubmitBehavior::Reject("insufficient funds for gas * price + value".into())],
        );
        let mut redeemed = RedeemedSet::default();
        let outcome = claim(&gateway, 4, &mut redeemed).await;
        assert!(matches!(outcome, ClaimOutcome::Failed { .. }));
        assert_eq!(gateway.calls().submit_signed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_transaction_fails_without_resubmitting() {
        let gateway = MockGateway::new()
            .with_position(5, 100, PAST)
            .script_submissions(5, vec![SubmitBehavior::NeverMined]);
        let mut redeemed = RedeemedSet::default();
        let outcome = claim(&gateway, 5, &mut redeemed).await;
        assert!(matches!(outcome, ClaimOutcome::Failed { .. }));
        assert_eq!(gateway.calls().submit_signed, 1);
        assert_eq!(gateway.calls().receipt, 24);
        assert!(redeemed.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn drifted_document_fails_closed() {
        let doc = crate::codec::document::encode_document("100", "2020-01-01T00:00:00Z", None);
        let gateway = MockGateway::new().with_document(6, doc);
        let mut redeemed = RedeemedSet::default();
        let outcome = claim(&gateway, 6, &mut redeemed).await;
        assert!(matches!(outcome, ClaimOutcome::Failed { .. }));
        assert_eq!(gateway.calls().writes(), 0);
    }
}
