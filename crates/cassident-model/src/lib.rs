//! # cassident-model
//!
//! Identity entities persisted by Cassident.
//!
//! - [`User`] -- an account, addressed by its immutable identity key and
//!   by its username.
//! - [`UserLoginInfo`] -- an external login binding `(provider, key)`.
//! - [`Claim`] -- a `(type, value)` pair attached to a user.
//!
//! This crate performs no I/O. The store crate decides which fields are
//! persisted and into which projections.

pub mod claim;
pub mod login;
pub mod user;

pub use claim::Claim;
pub use login::UserLoginInfo;
pub use user::User;
