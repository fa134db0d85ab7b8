use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Identity-provider subject (`sub` claim).
///
/// Stable and unique per user; the only identifier the app should key on.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct Subject(pub String);

impl Subject {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Application role derived from identity-provider groups.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct Role(pub String);

impl Role {
    /// Role reported when no group is recognized.
    pub const NONE: &'static str = "none";

    #[must_use]
    pub fn none() -> Self {
        Self(Self::NONE.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        self.0 == Self::NONE
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
