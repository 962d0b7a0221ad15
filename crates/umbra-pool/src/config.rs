//! pool configuration
//!
//! loaded from toml by the cli, amounts as decimal token strings:
//!
//! ```toml
//! tree_height = 20
//! root_history_size = 100
//! maximum_deposit_amount = "1"
//! minimal_withdrawal_amount = "0.05"
//! ```

use serde::{Deserialize, Serialize};

use crate::commitment::MAX_TREE_HEIGHT;
use crate::ledger::AccountId;
use crate::value::{Amount, UNIT};

pub const DEFAULT_TREE_HEIGHT: usize = 20;
pub const DEFAULT_ROOT_HISTORY_SIZE: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub tree_height: usize,
    /// superseded roots that remain valid proof anchors
    pub root_history_size: usize,
    /// cap on a single deposit
    pub maximum_deposit_amount: Amount,
    /// floor on a single l1 withdrawal
    pub minimal_withdrawal_amount: Amount,
    /// shielded token
    pub token: AccountId,
    /// account holding the pool's funds
    pub pool_account: AccountId,
    /// l2 side of the bridge, the only caller of `on_token_bridged`
    pub bridge_account: AccountId,
    /// l1 escrow that locks deposits and pays out bridged withdrawals
    pub l1_unwrapper: AccountId,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            tree_height: DEFAULT_TREE_HEIGHT,
            root_history_size: DEFAULT_ROOT_HISTORY_SIZE,
            maximum_deposit_amount: Amount(UNIT),
            minimal_withdrawal_amount: Amount(UNIT / 20),
            token: AccountId::derive("token"),
            pool_account: AccountId::derive("pool"),
            bridge_account: AccountId::derive("bridge"),
            l1_unwrapper: AccountId::derive("l1-unwrapper"),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tree_height == 0 || self.tree_height > MAX_TREE_HEIGHT {
            return Err(ConfigError::InvalidTreeHeight(self.tree_height));
        }
        if self.root_history_size == 0 {
            return Err(ConfigError::InvalidRootHistorySize);
        }
        if self.maximum_deposit_amount > Amount::MAX {
            return Err(ConfigError::DepositCapTooLarge);
        }
        if self.pool_account == self.bridge_account {
            return Err(ConfigError::SharedAccount);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("tree height must be in 1..={MAX_TREE_HEIGHT}, got {0}")]
    InvalidTreeHeight(usize),
    #[error("root history size must be at least 1")]
    InvalidRootHistorySize,
    #[error("maximum deposit amount exceeds the supported range")]
    DepositCapTooLarge,
    #[error("pool and bridge must be different accounts")]
    SharedAccount,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let config = PoolConfig::default();
        config.validate().unwrap();
        assert_eq!(config.maximum_deposit_amount.to_string(), "1");
        assert_eq!(config.minimal_withdrawal_amount.to_string(), "0.05");
    }

    #[test]
    fn test_validate_rejects() {
        let bad = PoolConfig {
            tree_height: 0,
            ..Default::default()
        };
        assert_eq!(bad.validate(), Err(ConfigError::InvalidTreeHeight(0)));

        let bad = PoolConfig {
            tree_height: 33,
            ..Default::default()
        };
        assert_eq!(bad.validate(), Err(ConfigError::InvalidTreeHeight(33)));

        let bad = PoolConfig {
            root_history_size: 0,
            ..Default::default()
        };
        assert_eq!(bad.validate(), Err(ConfigError::InvalidRootHistorySize));
    }
}
