use ember_ledger::FeePolicy;
use ember_types::AccountId;
use serde::{Deserialize, Serialize};

/// Economy-wide settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EconomyConfig {
    /// Transfer fee policy.
    pub fee: FeePolicy,
    /// Reserved account whose incoming transfers are presented as destroyed.
    /// Mechanics are unchanged; only the receipt is flagged.
    pub sink_account: Option<AccountId>,
    /// Attempts at a conflicted sign-in write before reporting a
    /// persistence failure.
    pub max_signin_attempts: u32,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            fee: FeePolicy::default(),
            sink_account: None,
            max_signin_attempts: 3,
        }
    }
}
