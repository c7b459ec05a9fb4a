//! Claim orchestration: retry policy, confirmation polling, the per-position
//! claim state machine and the batch driver that ties them together.

pub mod batch;
pub mod claim;
pub mod confirm;
pub mod retry;

pub use batch::{BatchDriver, Summary};
pub use claim::{ClaimEngine, ClaimOutcome, RedeemedSet};
pub use confirm::{await_confirmation, Confirmation, PollConfig};
pub use retry::RetryPolicy;
