//! Identity capability traits.
//!
//! The contract an identity framework expects from its backing store is
//! split into independent capability groups. A store implements only the
//! groups it actually supports; a missing capability is a missing trait
//! impl, not a silently no-op method.
//!
//! | Trait                      | Persisted | Implemented by                   |
//! |----------------------------|-----------|----------------------------------|
//! | [`UserStore`]              | yes       | `CassandraUserStore`             |
//! | [`UserLoginStore`]         | yes       | `CassandraUserStore`             |
//! | [`UserClaimStore`]         | yes       | `CassandraUserStore`             |
//! | [`UserPasswordStore`]      | on update | `CassandraUserStore`             |
//! | [`UserSecurityStampStore`] | on update | `CassandraUserStore`             |
//! | [`UserEmailStore`]         | no        | `InMemoryUserFields`             |
//! | [`UserPhoneNumberStore`]   | no        | `InMemoryUserFields`             |
//! | [`UserLockoutStore`]       | no        | `InMemoryUserFields`             |
//! | [`UserTwoFactorStore`]     | no        | `InMemoryUserFields`             |
//!
//! Field capabilities are synchronous: they only mutate the `User` they
//! are given and perform no I/O.

use async_trait::async_trait;
use cassident_model::{Claim, User, UserLoginInfo};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreResult;

// ═══════════════════════════════════════════════════════════════════════
//  Persisted capabilities
// ═══════════════════════════════════════════════════════════════════════

/// User account CRUD.
///
/// Each mutation writes both the by-id and the by-username projection in
/// one batch. The batch applies all-or-nothing but readers may observe it
/// half applied, and two concurrent mutations of the same user resolve
/// last-writer-wins per projection, so the projections can disagree.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a new user into both projections. Username uniqueness is
    /// not checked.
    async fn create(&self, user: &User) -> StoreResult<()>;

    /// Writes the password hash and security stamp to both projections.
    /// The username is assumed unchanged since creation.
    async fn update(&self, user: &User) -> StoreResult<()>;

    /// Removes the user from both projections. Logins and claims are kept.
    async fn delete(&self, user: &User) -> StoreResult<()>;

    /// Point read on the by-id projection.
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    /// Point read on the by-username projection.
    async fn find_by_name(&self, username: &str) -> StoreResult<Option<User>>;
}

/// External login bindings.
#[async_trait]
pub trait UserLoginStore: Send + Sync {
    /// Binds `login` to `user` in both login projections.
    async fn add_login(&self, user: &User, login: &UserLoginInfo) -> StoreResult<()>;

    /// Unbinds `login` from both login projections.
    async fn remove_login(&self, user: &User, login: &UserLoginInfo) -> StoreResult<()>;

    /// Every login bound to `user`, in no particular order.
    async fn get_logins(&self, user: &User) -> StoreResult<Vec<UserLoginInfo>>;

    /// Resolves `login` to its owning user. The two reads are not atomic
    /// with respect to a concurrent delete.
    async fn find_user_by_login(&self, login: &UserLoginInfo) -> StoreResult<Option<User>>;
}

/// User claims.
#[async_trait]
pub trait UserClaimStore: Send + Sync {
    /// Every claim attached to `user`, in no particular order.
    async fn get_claims(&self, user: &User) -> StoreResult<Vec<Claim>>;

    /// Attaches `claim` to `user`.
    async fn add_claim(&self, user: &User, claim: &Claim) -> StoreResult<()>;

    /// Detaches `claim` from `user`.
    async fn remove_claim(&self, user: &User, claim: &Claim) -> StoreResult<()>;
}

// ═══════════════════════════════════════════════════════════════════════
//  Field capabilities
// ═══════════════════════════════════════════════════════════════════════

/// Password hash field. Persisted by the next [`UserStore::update`].
pub trait UserPasswordStore {
    fn set_password_hash(&self, user: &mut User, password_hash: String);

    fn password_hash<'a>(&self, user: &'a User) -> Option<&'a str>;

    /// Whether a non-empty hash is set.
    fn has_password(&self, user: &User) -> bool;
}

/// Security stamp field. Persisted by the next [`UserStore::update`].
pub trait UserSecurityStampStore {
    fn set_security_stamp(&self, user: &mut User, stamp: String);

    fn security_stamp<'a>(&self, user: &'a User) -> Option<&'a str>;
}

/// Email address and confirmation. Not persisted.
pub trait UserEmailStore {
    fn set_email(&self, user: &mut User, email: String);

    fn email<'a>(&self, user: &'a User) -> Option<&'a str>;

    fn email_confirmed(&self, user: &User) -> bool;

    /// Confirming stamps the current time; unconfirming clears it.
    fn set_email_confirmed(&self, user: &mut User, confirmed: bool);
}

/// Phone number and confirmation. Not persisted.
pub trait UserPhoneNumberStore {
    fn set_phone_number(&self, user: &mut User, phone_number: String);

    fn phone_number<'a>(&self, user: &'a User) -> Option<&'a str>;

    fn phone_number_confirmed(&self, user: &User) -> bool;

    /// Confirming stamps the current time; unconfirming clears it.
    fn set_phone_number_confirmed(&self, user: &mut User, confirmed: bool);
}

/// Lockout bookkeeping. Not persisted.
pub trait UserLockoutStore {
    /// Fails with `InvalidState` if no end date was ever set.
    fn lockout_end_date(&self, user: &User) -> StoreResult<DateTime<Utc>>;

    fn set_lockout_end_date(&self, user: &mut User, end: DateTime<Utc>);

    /// Returns the new count.
    fn increment_access_failed_count(&self, user: &mut User) -> u32;

    fn reset_access_failed_count(&self, user: &mut User);

    fn access_failed_count(&self, user: &User) -> u32;

    fn lockout_enabled(&self, user: &User) -> bool;

    fn set_lockout_enabled(&self, user: &mut User, enabled: bool);
}

/// Two-factor flag. Not persisted.
pub trait UserTwoFactorStore {
    fn two_factor_enabled(&self, user: &User) -> bool;

    fn set_two_factor_enabled(&self, user: &mut User, enabled: bool);
}
