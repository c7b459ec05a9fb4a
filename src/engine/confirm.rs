//! Receipt polling after submission.

use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::gateway::{ChainGateway, ReceiptStatus, TxHash};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Reverted,
    TimedOut,
}

/// Polls for `tx_hash`'s receipt every `poll.interval` until one arrives or
/// `poll.timeout` elapses. Query errors are logged and polling continues.
pub async fn await_confirmation<G>(gateway: &G, tx_hash: &TxHash, poll: &PollConfig) -> Confirmation
where
    G: ChainGateway + ?Sized,
{
    let started = Instant::now();
    while started.elapsed() < poll.timeout {
        match gateway.receipt(tx_hash).await {
            Ok(Some(receipt)) => {
                return match receipt.status {
                    ReceiptStatus::Success => Confirmation::Confirmed,
                    ReceiptStatus::Failure => Confirmation::Reverted,
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("error checking receipt for {tx_hash}: {e}"),
        }
        sleep(poll.interval).await;
    }
    Confirmation::TimedOut
}
