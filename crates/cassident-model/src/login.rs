//! External login binding.

use serde::{Deserialize, Serialize};

/// A login issued by an external provider, e.g. `("google", "g-key")`.
///
/// A `(login_provider, provider_key)` pair belongs to at most one user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserLoginInfo {
    /// Provider name.
    pub login_provider: String,
    /// Key issued by the provider for this user.
    pub provider_key: String,
}

impl UserLoginInfo {
    /// Creates a new login binding.
    #[must_use]
    pub fn new(login_provider: impl Into<String>, provider_key: impl Into<String>) -> Self {
        Self {
            login_provider: login_provider.into(),
            provider_key: provider_key.into(),
        }
    }
}

impl std::fmt::Display for UserLoginInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.login_provider, self.provider_key)
    }
}
