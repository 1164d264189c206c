//! User claims.

use serde::{Deserialize, Serialize};

/// A `(type, value)` pair attached to a user.
///
/// Claims are not unique by construction; storing the same pair twice is
/// up to the store (the wide-column store collapses it into one row).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    /// Claim type, e.g. `"role"`.
    pub claim_type: String,
    /// Claim value.
    pub value: String,
    /// Issuer. Not persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

impl Claim {
    /// Creates a claim without an issuer.
    #[must_use]
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
            issuer: None,
        }
    }

    /// Sets the issuer.
    #[must_use]
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }
}
