use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GovernanceError, Result};
use crate::types::DEFAULT_DECIMALS;

// Defaults
pub const DEFAULT_CHAIN_ID: u64 = 1;
pub const DEFAULT_MAX_DELEGATION_DEPTH: usize = 10;
pub const DEFAULT_FALLBACK_TRANSITIVE_LEVELS: usize = 1;
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_LOG_TIMEOUT_MS: u64 = 8_000;
pub const DEFAULT_QUERY_DEADLINE_MS: u64 = 10_000;
pub const DEFAULT_LOOKBACK_BLOCKS: u64 = 50_000;
const MAX_SUPPORTED_DECIMALS: u8 = 36;

/// Tunables for every query pipeline. Missing fields fall back to the defaults above.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub chain_id: u64,
    pub token_decimals: u8,
    pub max_delegation_depth: usize,
    /// Extra delegator levels summed by the local voting power path.
    pub fallback_transitive_levels: usize,
    pub call_timeout_ms: u64,
    pub log_timeout_ms: u64,
    pub query_deadline_ms: u64,
    pub vote_log_lookback_blocks: u64,
    pub holder_log_lookback_blocks: u64,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            token_decimals: DEFAULT_DECIMALS,
            max_delegation_depth: DEFAULT_MAX_DELEGATION_DEPTH,
            fallback_transitive_levels: DEFAULT_FALLBACK_TRANSITIVE_LEVELS,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            log_timeout_ms: DEFAULT_LOG_TIMEOUT_MS,
            query_deadline_ms: DEFAULT_QUERY_DEADLINE_MS,
            vote_log_lookback_blocks: DEFAULT_LOOKBACK_BLOCKS,
            holder_log_lookback_blocks: DEFAULT_LOOKBACK_BLOCKS,
        }
    }
}

impl GovernanceConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: GovernanceConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_delegation_depth == 0 {
            return Err(GovernanceError::Config("max_delegation_depth must be at least 1".into()));
        }
        if self.token_decimals > MAX_SUPPORTED_DECIMALS {
            return Err(GovernanceError::Config(format!(
                "token_decimals cannot exceed {}",
                MAX_SUPPORTED_DECIMALS
            )));
        }
        if self.call_timeout_ms == 0 || self.log_timeout_ms == 0 || self.query_deadline_ms == 0 {
            return Err(GovernanceError::Config("timeouts must be non-zero".into()));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn log_timeout(&self) -> Duration {
        Duration::from_millis(self.log_timeout_ms)
    }

    pub fn query_deadline(&self) -> Duration {
        Duration::from_millis(self.query_deadline_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = GovernanceConfig::from_json(r#"{ "chain_id": 11155111, "max_delegation_depth": 8 }"#).unwrap();
        assert_eq!(config.chain_id, 11155111);
        assert_eq!(config.max_delegation_depth, 8);
        assert_eq!(config.token_decimals, 18);
        assert_eq!(config.query_deadline(), Duration::from_secs(10));
    }

    #[test]
    fn test_validation_rejects_zero_depth() {
        let result = GovernanceConfig::from_json(r#"{ "max_delegation_depth": 0 }"#);
        assert!(matches!(result, Err(GovernanceError::Config(_))));
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let config = GovernanceConfig { call_timeout_ms: 0, ..GovernanceConfig::default() };
        assert!(config.validate().is_err());
    }
}
