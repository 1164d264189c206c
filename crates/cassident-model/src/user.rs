//! User account entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user account.
///
/// Only `id`, `username`, `password_hash` and `security_stamp` are
/// persisted. The remaining fields back the in-memory capability groups
/// (email, phone, lockout, two-factor) and are lost on reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    // === Persisted ===
    /// Identity key (UUID v7). Immutable after creation.
    pub id: Uuid,
    /// Alternate lookup key. Treated as immutable after creation: there is
    /// no rename path for the by-username projection.
    pub username: String,
    /// Opaque password hash; `None` means no password is set.
    pub password_hash: Option<String>,
    /// Opaque stamp rotated whenever credentials change.
    pub security_stamp: Option<String>,

    // === In-memory only ===
    /// Email address.
    pub email: Option<String>,
    /// When the email address was confirmed.
    pub email_confirmed_on: Option<DateTime<Utc>>,
    /// Phone number.
    pub phone_number: Option<String>,
    /// When the phone number was confirmed.
    pub phone_number_confirmed_on: Option<DateTime<Utc>>,
    /// Whether two-factor authentication is enabled.
    pub two_factor_enabled: bool,
    /// Whether lockout applies to this account.
    pub lockout_enabled: bool,
    /// End of the current lockout window, if one was ever set.
    pub lockout_end_date: Option<DateTime<Utc>>,
    /// Consecutive failed access attempts.
    pub access_failed_count: u32,
}

impl User {
    /// Creates a user with a fresh identity key and no credentials.
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self::with_id(Uuid::now_v7(), username)
    }

    /// Creates a user with an explicit identity key.
    #[must_use]
    pub fn with_id(id: Uuid, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            password_hash: None,
            security_stamp: None,
            email: None,
            email_confirmed_on: None,
            phone_number: None,
            phone_number_confirmed_on: None,
            two_factor_enabled: false,
            lockout_enabled: false,
            lockout_end_date: None,
            access_failed_count: 0,
        }
    }

    /// Sets the password hash.
    #[must_use]
    pub fn password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = Some(hash.into());
        self
    }

    /// Sets the security stamp.
    #[must_use]
    pub fn security_stamp(mut self, stamp: impl Into<String>) -> Self {
        self.security_stamp = Some(stamp.into());
        self
    }

    /// Compares only the fields that survive a store round trip.
    #[must_use]
    pub fn same_persisted_fields(&self, other: &Self) -> bool {
        self.id == other.id
            && self.username == other.username
            && self.password_hash == other.password_hash
            && self.security_stamp == other.security_stamp
    }
}
