//! Store configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty document is
//! a valid configuration:
//!
//! ```toml
//! keyspace = "identity"
//! duplicate_rows = "reject_ambiguous"
//! batch_kind = "logged"
//!
//! [tables]
//! users = "users"
//! users_by_username = "users_by_username"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::session::BatchKind;

/// What a unique-key read does when the store returns more than one row.
///
/// The projections are keyed by the lookup attribute, so more than one row
/// means the denormalization invariant was broken elsewhere.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateRowPolicy {
    /// Log a warning and use the first row.
    #[default]
    TakeFirst,
    /// Fail with [`StoreError::AmbiguousRows`].
    RejectAmbiguous,
}

/// Physical table names for each projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableNames {
    /// Users keyed by identity key.
    pub users: String,
    /// Users keyed by username.
    pub users_by_username: String,
    /// Logins keyed by owning user.
    pub logins: String,
    /// Logins keyed by `(provider, key)`.
    pub logins_by_provider: String,
    /// Claims keyed by owning user.
    pub claims: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            users: "users".into(),
            users_by_username: "users_by_username".into(),
            logins: "logins".into(),
            logins_by_provider: "logins_by_provider".into(),
            claims: "claims".into(),
        }
    }
}

/// Configuration for [`CassandraUserStore`](crate::CassandraUserStore).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Keyspace prefix for table names. Empty uses the session's keyspace.
    pub keyspace: String,
    /// Table names.
    pub tables: TableNames,
    /// Policy for unique-key reads that return several rows.
    pub duplicate_rows: DuplicateRowPolicy,
    /// Log mode for the two-projection writes.
    pub batch_kind: BatchKind,
}

impl StoreConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading store config");
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Rejects empty table names and projection pairs that share a table.
    pub fn validate(&self) -> StoreResult<()> {
        let t = &self.tables;
        let names = [
            ("users", &t.users),
            ("users_by_username", &t.users_by_username),
            ("logins", &t.logins),
            ("logins_by_provider", &t.logins_by_provider),
            ("claims", &t.claims),
        ];
        for (field, name) in names {
            if name.trim().is_empty() {
                return Err(StoreError::Config(format!(
                    "table name `{field}` must not be empty"
                )));
            }
        }
        if t.users == t.users_by_username {
            return Err(StoreError::Config(
                "users and users_by_username must be different tables".into(),
            ));
        }
        if t.logins == t.logins_by_provider {
            return Err(StoreError::Config(
                "logins and logins_by_provider must be different tables".into(),
            ));
        }
        Ok(())
    }

    /// Table name qualified with the keyspace, if one is set.
    pub fn qualified(&self, table: &str) -> String {
        if self.keyspace.is_empty() {
            table.to_string()
        } else {
            format!("{}.{table}", self.keyspace)
        }
    }
}
