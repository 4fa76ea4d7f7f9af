use serde::{Deserialize, Serialize};

/// Canonical economic identity.
///
/// Derived from a platform tag plus the platform-specific user id, so the
/// same balance follows a user regardless of which chat surface the request
/// came through. The id is opaque to every other component.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Canonical id for a platform-scoped user.
    pub fn from_platform(platform: &str, user_id: &str) -> Self {
        Self(format!("{platform}:{user_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_ids_are_scoped() {
        let a = AccountId::from_platform("qq", "1000");
        let b = AccountId::from_platform("irc", "1000");
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "qq:1000");
    }

    #[test]
    fn display_matches_inner() {
        assert_eq!(format!("{}", AccountId::new("acc-1")), "acc-1");
    }
}
