use std::collections::HashSet;

use async_trait::async_trait;
use ember_storage::StorageResult;
use ember_types::AccountId;

/// Receiver-eligibility lookup, backed by the host platform's member list.
///
/// The platform service resolving chat identities to accounts is a black box
/// to the economy; this trait is the only question it gets asked.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Whether `account` is a valid transfer receiver in the caller's scope.
    async fn contains(&self, account: &AccountId) -> StorageResult<bool>;
}

/// Directory admitting every account.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenDirectory;

#[async_trait]
impl Directory for OpenDirectory {
    async fn contains(&self, _account: &AccountId) -> StorageResult<bool> {
        Ok(true)
    }
}

/// Fixed member roster, for tests and single-scope deployments.
#[derive(Clone, Debug, Default)]
pub struct RosterDirectory {
    members: HashSet<AccountId>,
}

impl RosterDirectory {
    pub fn new(members: impl IntoIterator<Item = AccountId>) -> Self {
        Self {
            members: members.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Directory for RosterDirectory {
    async fn contains(&self, account: &AccountId) -> StorageResult<bool> {
        Ok(self.members.contains(account))
    }
}
