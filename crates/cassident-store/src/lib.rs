//! # cassident-store
//!
//! Identity persistence over a partitioned wide-column database.
//!
//! Users, external logins and claims are stored in query-shaped tables.
//! Every alternate lookup path is a denormalized projection written in the
//! same batch as its primary, and every statement is prepared once per
//! store and reused.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Capability traits (UserStore, Logins, ...)  │
//! ├──────────────────────────────────────────────┤
//! │  CassandraUserStore   (projection pairs)     │
//! │  InMemoryUserFields   (never persisted)      │
//! ├──────────────────────────────────────────────┤
//! │  StatementCache  (OnceCell per operation)    │
//! │  Schema          (tables + query templates)  │
//! ├──────────────────────────────────────────────┤
//! │  Session trait   (prepare / execute / batch) │
//! │  MemorySession   (in-process backend)        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use cassident_model::User;
//! use cassident_store::{CassandraUserStore, MemorySession, StoreConfig, UserStore};
//!
//! let config = StoreConfig::load("cassident.toml")?;
//! let session = Arc::new(MemorySession::for_config(&config));
//! let store = CassandraUserStore::with_config(session, config)?;
//!
//! let user = User::new("alice").password_hash("h1");
//! store.create(&user).await?;
//! let found = store.find_by_name("alice").await?;
//! ```

pub mod config;
pub mod error;
pub mod fields;
pub mod memory;
pub mod schema;
pub mod session;
pub mod statements;
pub mod traits;
pub mod user_store;

// ── re-exports ───────────────────────────────────────────────────────

pub use config::{DuplicateRowPolicy, StoreConfig, TableNames};
pub use error::{StoreError, StoreResult};
pub use fields::InMemoryUserFields;
pub use memory::{MemorySession, SessionStats};
pub use schema::{Operation, Schema, TableDef};
pub use session::{
    Batch, BatchKind, BoundStatement, PreparedId, PreparedStatement, Query, QueryShape, Row,
    RowSet, Session, SessionError, Value,
};
pub use statements::{PrepareStats, Prepared, StatementCache};
pub use traits::{
    UserClaimStore, UserEmailStore, UserLockoutStore, UserLoginStore, UserPasswordStore,
    UserPhoneNumberStore, UserSecurityStampStore, UserStore, UserTwoFactorStore,
};
pub use user_store::CassandraUserStore;
