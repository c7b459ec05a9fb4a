//! Runtime configuration for one claim deployment.
//!
//! Defaults target the X1 fastnet XENFT deployment. Any field with an
//! environment variable below can be overridden at start-up.

use std::path::PathBuf;
use std::time::Duration;

use crate::engine::{PollConfig, RetryPolicy};
use crate::error::ClaimError;
use crate::gateway::Address;

pub const ENV_RPC_URL: &str = "MINTCLAIM_RPC_URL";
pub const ENV_CONTRACT: &str = "MINTCLAIM_CONTRACT";
pub const ENV_CHAIN_ID: &str = "MINTCLAIM_CHAIN_ID";
pub const ENV_GAS_LIMIT: &str = "MINTCLAIM_GAS_LIMIT";
pub const ENV_CACHE_PATH: &str = "MINTCLAIM_CACHE_PATH";
pub const ENV_ACCOUNT: &str = "MINTCLAIM_ACCOUNT";

const DEFAULT_ENDPOINT: &str = "https://x1-fastnet.infrafc.org";
/// 0xd638e3657a4000b944AC517BD3aFe2Ba964E3B92
const DEFAULT_CONTRACT: Address = Address([
    0xd6, 0x38, 0xe3, 0x65, 0x7a, 0x40, 0x00, 0xb9, 0x44, 0xac, 0x51, 0x7b, 0xd3, 0xaf, 0xe2,
    0xba, 0x96, 0x4e, 0x3b, 0x92,
]);
const DEFAULT_CHAIN_ID: u64 = 4003;
const DEFAULT_GAS_CEILING: u64 = 7_000_000;
const DEFAULT_CACHE_PATH: &str = "xenft_data.csv";

#[derive(Clone, Debug)]
pub struct ClaimerConfig {
    pub endpoint: String,
    pub contract_address: Address,
    pub chain_id: u64,
    /// Gas limit attached to every claim transaction.
    pub gas_ceiling: u64,
    pub cache_path: PathBuf,
    pub enumeration_retry: RetryPolicy,
    pub poll: PollConfig,
    pub conflict_retry: RetryPolicy,
}

impl Default for ClaimerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            contract_address: DEFAULT_CONTRACT,
            chain_id: DEFAULT_CHAIN_ID,
            gas_ceiling: DEFAULT_GAS_CEILING,
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            enumeration_retry: RetryPolicy::fixed(3, Duration::from_secs(5)),
            poll: PollConfig::default(),
            conflict_retry: RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(16)),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ClaimError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ClaimError::Config(format!("{key}={raw:?}: {e}")))
}

impl ClaimerConfig {
    pub fn from_env() -> Result<Self, ClaimError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup` on top of the defaults and validates the result.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClaimError> {
        let mut config = Self::default();
        if let Some(v) = lookup(ENV_RPC_URL) {
            config.endpoint = v.trim().to_string();
        }
        if let Some(v) = lookup(ENV_CONTRACT) {
            config.contract_address = parse_env(ENV_CONTRACT, &v)?;
        }
        if let Some(v) = lookup(ENV_CHAIN_ID) {
            config.chain_id = parse_env(ENV_CHAIN_ID, &v)?;
        }
        if let Some(v) = lookup(ENV_GAS_LIMIT) {
            config.gas_ceiling = parse_env(ENV_GAS_LIMIT, &v)?;
        }
        if let Some(v) = lookup(ENV_CACHE_PATH) {
            config.cache_path = PathBuf::from(v);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn endpoint_url(&self) -> Result<url::Url, ClaimError> {
        let url = url::Url::parse(&self.endpoint)
            .map_err(|e| ClaimError::Config(format!("endpoint {:?}: {e}", self.endpoint)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ClaimError::Config(format!(
                "endpoint {:?}: unsupported scheme {other}",
                self.endpoint
            ))),
        }
    }

    pub fn validate(&self) -> Result<(), ClaimError> {
        self.endpoint_url()?;
        if self.gas_ceiling == 0 {
            return Err(ClaimError::Config("gas ceiling must be positive".into()));
        }
        if self.poll.interval.is_zero() {
            return Err(ClaimError::Config("poll interval must be positive".into()));
        }
        Ok(())
    }
}
