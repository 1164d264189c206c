//! Error types for the cassident-store crate.
//!
//! Store operations return [`StoreError`] via [`StoreResult`]. Failures
//! raised by the backing session are wrapped transparently in
//! [`StoreError::Session`] and never retried or reclassified.

use thiserror::Error;

use crate::session::SessionError;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the identity store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A required argument was missing or empty. Raised before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An optional value was read before it was ever set.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The backing session failed to prepare, bind or execute.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A row could not be mapped back into an entity.
    #[error("invalid data in {table}: {message}")]
    InvalidData { table: String, message: String },

    /// A unique-key read returned more than one row and the store is
    /// configured to reject ambiguous results.
    #[error("{count} rows in {table} for a key expected to be unique")]
    AmbiguousRows { table: String, count: usize },

    /// The statement cache does not hold the template shape an operation
    /// needs. Indicates a bug in the store, not bad input or bad data.
    #[error("statement catalog error: {0}")]
    Catalog(String),

    /// The store was used after [`close`](crate::CassandraUserStore::close).
    #[error("store is closed")]
    Closed,

    /// Configuration could not be loaded or is inconsistent.
    #[error("config error: {0}")]
    Config(String),
}

impl StoreError {
    /// Shorthand for an [`InvalidArgument`](Self::InvalidArgument) error.
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Checks if this error was raised by argument validation.
    #[must_use]
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    /// Checks if this error came from the backing session.
    #[must_use]
    pub const fn is_session(&self) -> bool {
        matches!(self, Self::Session(_))
    }
}

impl From<toml::de::Error> for StoreError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
