//! # mintclaim
//!
//! Batch claimer for time-locked mint-record NFTs.
//!
//! The flow for one run:
//!
//! 1. [BatchDriver] enumerates the account's positions through a [ChainGateway],
//!    retrying transient failures.
//! 2. Descriptive metadata (term, due date) is read from the local
//!    [PositionCache], or fetched once and appended to it.
//! 3. Matured positions go to the [ClaimEngine], which re-checks redemption state
//!    on chain, submits `bulkClaimMintReward`, and polls for the receipt.
//!
//! Positions already claimed in this run are tracked in a [RedeemedSet]; across
//! runs the on-chain redemption flags are the source of truth.

pub mod cache;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;

pub use cache::{CachedPosition, PositionCache};
pub use codec::{decode_maturity, MaturityRecord, PackedStatus, PositionMetadata};
pub use config::ClaimerConfig;
pub use engine::{BatchDriver, ClaimEngine, ClaimOutcome, RedeemedSet, Summary};
pub use error::{ClaimError, MetadataParseError};
pub use gateway::{Address, ChainGateway, GatewayError, JsonRpcGateway, PositionId, SigningKey};
