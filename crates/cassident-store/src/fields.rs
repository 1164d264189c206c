//! Field capabilities that mutate a `User` in memory.
//!
//! Password hash and security stamp live in both user projections and are
//! written by the next `update`. Email, phone, lockout and two-factor
//! fields have no column in any projection: [`InMemoryUserFields`] keeps
//! them on the in-memory entity only and they are lost on reload.

use cassident_model::User;
use chrono::{DateTime, Utc};

use crate::error::{StoreError, StoreResult};
use crate::traits::{
    UserEmailStore, UserLockoutStore, UserPasswordStore, UserPhoneNumberStore,
    UserSecurityStampStore, UserTwoFactorStore,
};
use crate::user_store::CassandraUserStore;

// ═══════════════════════════════════════════════════════════════════════
//  Credentials (persisted on update)
// ═══════════════════════════════════════════════════════════════════════

impl UserPasswordStore for CassandraUserStore {
    fn set_password_hash(&self, user: &mut User, password_hash: String) {
        user.password_hash = Some(password_hash);
    }

    fn password_hash<'a>(&self, user: &'a User) -> Option<&'a str> {
        user.password_hash.as_deref()
    }

    fn has_password(&self, user: &User) -> bool {
        user.password_hash.as_deref().is_some_and(|h| !h.is_empty())
    }
}

impl UserSecurityStampStore for CassandraUserStore {
    fn set_security_stamp(&self, user: &mut User, stamp: String) {
        user.security_stamp = Some(stamp);
    }

    fn security_stamp<'a>(&self, user: &'a User) -> Option<&'a str> {
        user.security_stamp.as_deref()
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Partial capabilities (never persisted)
// ═══════════════════════════════════════════════════════════════════════

/// Email, phone, lockout and two-factor capabilities backed only by the
/// fields of the `User` passed in.
///
/// This is an incomplete implementation of those capability groups: no
/// projection stores these fields, so `update` drops them and a reload
/// returns defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryUserFields;

impl UserEmailStore for InMemoryUserFields {
    fn set_email(&self, user: &mut User, email: String) {
        user.email = Some(email);
    }

    fn email<'a>(&self, user: &'a User) -> Option<&'a str> {
        user.email.as_deref()
    }

    fn email_confirmed(&self, user: &User) -> bool {
        user.email_confirmed_on.is_some()
    }

    fn set_email_confirmed(&self, user: &mut User, confirmed: bool) {
        user.email_confirmed_on = confirmed.then(Utc::now);
    }
}

impl UserPhoneNumberStore for InMemoryUserFields {
    fn set_phone_number(&self, user: &mut User, phone_number: String) {
        user.phone_number = Some(phone_number);
    }

    fn phone_number<'a>(&self, user: &'a User) -> Option<&'a str> {
        user.phone_number.as_deref()
    }

    fn phone_number_confirmed(&self, user: &User) -> bool {
        user.phone_number_confirmed_on.is_some()
    }

    fn set_phone_number_confirmed(&self, user: &mut User, confirmed: bool) {
        user.phone_number_confirmed_on = confirmed.then(Utc::now);
    }
}

impl UserLockoutStore for InMemoryUserFields {
    fn lockout_end_date(&self, user: &User) -> StoreResult<DateTime<Utc>> {
        user.lockout_end_date
            .ok_or_else(|| StoreError::InvalidState("lockout end date has no value".into()))
    }

    fn set_lockout_end_date(&self, user: &mut User, end: DateTime<Utc>) {
        user.lockout_end_date = Some(end);
    }

    fn increment_access_failed_count(&self, user: &mut User) -> u32 {
        user.access_failed_count = user.access_failed_count.saturating_add(1);
        user.access_failed_count
    }

    fn reset_access_failed_count(&self, user: &mut User) {
        user.access_failed_count = 0;
    }

    fn access_failed_count(&self, user: &User) -> u32 {
        user.access_failed_count
    }

    fn lockout_enabled(&self, user: &User) -> bool {
        user.lockout_enabled
    }

    fn set_lockout_enabled(&self, user: &mut User, enabled: bool) {
        user.lockout_enabled = enabled;
    }
}

impl UserTwoFactorStore for InMemoryUserFields {
    fn two_factor_enabled(&self, user: &User) -> bool {
        user.two_factor_enabled
    }

    fn set_two_factor_enabled(&self, user: &mut User, enabled: bool) {
        user.two_factor_enabled = enabled;
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::config::StoreConfig;
    use crate::memory::MemorySession;

    fn store() -> (Arc<MemorySession>, CassandraUserStore) {
        let session = Arc::new(MemorySession::for_config(&StoreConfig::default()));
        let store = CassandraUserStore::new(session.clone());
        (session, store)
    }

    #[test]
    fn password_hash_set_and_get_without_io() {
        let (session, store) = store();
        let mut user = User::new("alice");

        assert!(!store.has_password(&user));
        store.set_password_hash(&mut user, "h1".into());

        assert_eq!(store.password_hash(&user), Some("h1"));
        assert!(store.has_password(&user));
        assert_eq!(session.stats().total(), 0);
    }

    #[test]
    fn empty_hash_is_no_password() {
        let (_, store) = store();
        let mut user = User::new("alice");
        store.set_password_hash(&mut user, String::new());
        assert!(!store.has_password(&user));
    }

    #[test]
    fn security_stamp_set_and_get() {
        let (session, store) = store();
        let mut user = User::new("alice");

        assert_eq!(store.security_stamp(&user), None);
        store.set_security_stamp(&mut user, "s1".into());
        assert_eq!(store.security_stamp(&user), Some("s1"));
        assert_eq!(session.stats().total(), 0);
    }

    #[test]
    fn email_confirmation_stamps_and_clears() {
        let fields = InMemoryUserFields;
        let mut user = User::new("alice");

        fields.set_email(&mut user, "alice@example.com".into());
        assert_eq!(fields.email(&user), Some("alice@example.com"));
        assert!(!fields.email_confirmed(&user));

        fields.set_email_confirmed(&mut user, true);
        assert!(fields.email_confirmed(&user));
        assert!(user.email_confirmed_on.is_some());

        fields.set_email_confirmed(&mut user, false);
        assert!(!fields.email_confirmed(&user));
    }

    #[test]
    fn phone_confirmation_stamps_and_clears() {
        let fields = InMemoryUserFields;
        let mut user = User::new("alice");

        fields.set_phone_number(&mut user, "+15550100".into());
        fields.set_phone_number_confirmed(&mut user, true);
        assert_eq!(fields.phone_number(&user), Some("+15550100"));
        assert!(fields.phone_number_confirmed(&user));

        fields.set_phone_number_confirmed(&mut user, false);
        assert!(user.phone_number_confirmed_on.is_none());
    }

    #[test]
    fn lockout_end_date_before_set_is_invalid_state() {
        let fields = InMemoryUserFields;
        let mut user = User::new("alice");

        let err = fields.lockout_end_date(&user).unwrap_err();
        assert!(matches!(err, StoreError::InvalidState(_)));

        let end = Utc::now() + Duration::minutes(5);
        fields.set_lockout_end_date(&mut user, end);
        assert_eq!(fields.lockout_end_date(&user).unwrap(), end);
    }

    #[test]
    fn access_failed_count_increments_and_resets() {
        let fields = InMemoryUserFields;
        let mut user = User::new("alice");

        assert_eq!(fields.increment_access_failed_count(&mut user), 1);
        assert_eq!(fields.increment_access_failed_count(&mut user), 2);
        assert_eq!(fields.access_failed_count(&user), 2);

        fields.reset_access_failed_count(&mut user);
        assert_eq!(fields.access_failed_count(&user), 0);
    }

    #[test]
    fn lockout_and_two_factor_flags() {
        let fields = InMemoryUserFields;
        let mut user = User::new("alice");

        fields.set_lockout_enabled(&mut user, true);
        fields.set_two_factor_enabled(&mut user, true);
        assert!(fields.lockout_enabled(&user));
        assert!(fields.two_factor_enabled(&user));

        fields.set_two_factor_enabled(&mut user, false);
        assert!(!fields.two_factor_enabled(&user));
    }
}
