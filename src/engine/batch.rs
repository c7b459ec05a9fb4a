//! Batch driver: enumerate, hydrate the cache, filter by maturity, claim.

use std::fmt;

use chrono::Utc;

use crate::cache::{CachedPosition, PositionCache};
use crate::codec::{decode_document, is_due};
use crate::config::ClaimerConfig;
use crate::error::ClaimError;
use crate::gateway::{Address, ChainGateway, PositionId, SigningKey};

use super::claim::{ClaimEngine, ClaimOutcome, RedeemedSet};

const DELIMITER: &str = "______________________________________________________________";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total_owned: usize,
    pub due_count: usize,
    pub claimed_count: usize,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total NFTs processed: {}", self.total_owned)?;
        writeln!(f, "Total NFTs due for claiming: {}", self.due_count)?;
        write!(f, "Total NFTs successfully claimed: {}", self.claimed_count)
    }
}

pub struct BatchDriver<G> {
    gateway: G,
    config: ClaimerConfig,
}

impl<G: ChainGateway> BatchDriver<G> {
    pub fn new(gateway: G, config: ClaimerConfig) -> Self {
        Self { gateway, config }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Claims every matured position owned by `account`.
    ///
    /// Enumeration and cache-load failures abort the run; anything that goes
    /// wrong with a single position is reported and the batch moves on.
    pub async fn run_batch(
        &self,
        account: &Address,
        key: &SigningKey,
    ) -> Result<Summary, ClaimError> {
        let retry = &self.config.enumeration_retry;
        let owned = retry
            .retry_async("enumerate owned positions", |_| {
                self.gateway.owned_positions(account)
            })
            .await
            .map_err(|source| ClaimError::Enumeration {
                attempts: retry.max_attempts,
                source,
            })?;
        println!("Total owned NFTs: {}", owned.len());

        let mut cache = PositionCache::open(&self.config.cache_path)?;
        let mut redeemed = RedeemedSet::default();
        let engine = ClaimEngine::new(&self.gateway, &self.config);
        let mut summary = Summary {
            total_owned: owned.len(),
            ..Summary::default()
        };

        // Newest positions first.
        for (index, &id) in owned.iter().rev().enumerate() {
            println!(
                "Processing NFT {}/{}: Token ID {}",
                index + 1,
                owned.len(),
                id
            );

            if !cache.contains(id) {
                match self.fetch_metadata(id).await {
                    Ok(entry) => cache.append(entry),
                    Err(e) => {
                        println!("Failed to fetch metadata for NFT {id}: {e}");
                        continue;
                    }
                }
            }
            let Some(entry) = cache.get(id) else {
                continue;
            };

            match is_due(&entry.due_date, Utc::now()) {
                Ok(true) => {}
                Ok(false) => {
                    println!("NFT {id} is not due for claiming yet.");
                    continue;
                }
                Err(e) => {
                    println!("Error with date format for NFT {id}: {e}");
                    continue;
                }
            }

            summary.due_count += 1;
            let outcome = engine
                .attempt_claim(id, account, key, &mut redeemed)
                .await;
            match &outcome {
                ClaimOutcome::Claimed { tx_hash } => {
                    summary.claimed_count += 1;
                    println!("Successfully claimed reward for NFT {id} ({tx_hash})");
                }
                other => println!("Failed to claim reward for NFT {id}: {other}"),
            }
            println!("{DELIMITER}");
        }

        println!("{DELIMITER}");
        log::info!(
            "batch finished: {} owned, {} due, {} claimed",
            summary.total_owned,
            summary.due_count,
            summary.claimed_count
        );
        Ok(summary)
    }

    async fn fetch_metadata(&self, id: PositionId) -> Result<CachedPosition, ClaimError> {
        let document = self.gateway.position_document(id).await?;
        let metadata = decode_document(&document)?;
        Ok(CachedPosition {
            position_id: id,
            term: metadata.term,
            due_date: metadata.due_date,
        })
    }
}
