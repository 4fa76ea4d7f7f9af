use chrono::Duration;
use ember_ledger::LedgerError;
use ember_storage::StorageError;
use ember_types::{AccountId, Decimal};
use thiserror::Error;

/// Typed outcomes of economy operations that are not successes.
///
/// Everything except `Persistence` is user-facing and recoverable; nothing
/// crosses this boundary as an unstructured fault.
#[derive(Debug, Error)]
pub enum EconomyError {
    /// The account already signed in today; carries the time left until the
    /// next calendar day begins.
    #[error(
        "already signed in today; {}h{:02}m until the next day",
        .remaining.num_hours(),
        .remaining.num_minutes() % 60
    )]
    AlreadySigned { remaining: Duration },

    /// The account has never signed in; not an error state, just no data.
    #[error("no sign-in record yet")]
    NoRecord,

    #[error("insufficient funds: available {available}, guard at {required}")]
    InsufficientFunds {
        available: Decimal,
        required: Decimal,
    },

    #[error("receiver {0} is not eligible in this scope")]
    InvalidReceiver(AccountId),

    /// Storage unavailable or conflict retries exhausted. Logged at the
    /// call site; surfaced as a generic failure.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<StorageError> for EconomyError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::InsufficientBalance {
                available,
                required,
            } => Self::InsufficientFunds {
                available,
                required,
            },
            other => Self::Persistence(other.to_string()),
        }
    }
}

impl From<LedgerError> for EconomyError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::InsufficientFunds {
                available,
                required,
            } => Self::InsufficientFunds {
                available,
                required,
            },
            LedgerError::Storage(message) => Self::Persistence(message),
        }
    }
}
