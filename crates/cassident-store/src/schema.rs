//! Table layout and query templates.
//!
//! Every logical entity is written to a primary projection keyed by the
//! owning user's identity key and, where an alternate lookup is needed,
//! to a second projection keyed by that attribute:
//!
//! | Table                | Primary key                               |
//! |----------------------|-------------------------------------------|
//! | `users`              | `userid`                                  |
//! | `users_by_username`  | `username`                                |
//! | `logins`             | `userid, login_provider, provider_key`    |
//! | `logins_by_provider` | `login_provider, provider_key`            |
//! | `claims`             | `userid, type, value`                     |
//!
//! Templates for the two sides of a projection pair are always listed
//! primary first, alternate second.

use std::fmt;

use crate::config::StoreConfig;
use crate::session::Query;

// ── columns ──────────────────────────────────────────────────────────

pub const USER_ID: &str = "userid";
pub const USERNAME: &str = "username";
pub const PASSWORD_HASH: &str = "password_hash";
pub const SECURITY_STAMP: &str = "security_stamp";
pub const LOGIN_PROVIDER: &str = "login_provider";
pub const PROVIDER_KEY: &str = "provider_key";
pub const CLAIM_TYPE: &str = "type";
pub const CLAIM_VALUE: &str = "value";

// ── operations ───────────────────────────────────────────────────────

/// A logical store operation with its own set of prepared templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateUser,
    UpdateUser,
    DeleteUser,
    FindById,
    FindByName,
    AddLogin,
    RemoveLogin,
    GetLogins,
    FindLogin,
    GetClaims,
    AddClaim,
    RemoveClaim,
}

impl Operation {
    /// Every operation, in declaration order.
    pub const ALL: [Self; 12] = [
        Self::CreateUser,
        Self::UpdateUser,
        Self::DeleteUser,
        Self::FindById,
        Self::FindByName,
        Self::AddLogin,
        Self::RemoveLogin,
        Self::GetLogins,
        Self::FindLogin,
        Self::GetClaims,
        Self::AddClaim,
        Self::RemoveClaim,
    ];

    /// Snake-case name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateUser => "create_user",
            Self::UpdateUser => "update_user",
            Self::DeleteUser => "delete_user",
            Self::FindById => "find_by_id",
            Self::FindByName => "find_by_name",
            Self::AddLogin => "add_login",
            Self::RemoveLogin => "remove_login",
            Self::GetLogins => "get_logins",
            Self::FindLogin => "find_login",
            Self::GetClaims => "get_claims",
            Self::AddClaim => "add_claim",
            Self::RemoveClaim => "remove_claim",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── table definitions ────────────────────────────────────────────────

/// Physical layout of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    /// Qualified table name.
    pub name: String,
    /// Primary key columns: partition key first, then clustering columns.
    pub primary_key: Vec<&'static str>,
    /// All columns, key columns included.
    pub columns: Vec<&'static str>,
}

/// Resolved table names and the templates built from them.
#[derive(Debug, Clone)]
pub struct Schema {
    users: String,
    users_by_username: String,
    logins: String,
    logins_by_provider: String,
    claims: String,
}

impl Schema {
    /// Resolves qualified table names from the configuration.
    pub fn new(config: &StoreConfig) -> Self {
        let t = &config.tables;
        Self {
            users: config.qualified(&t.users),
            users_by_username: config.qualified(&t.users_by_username),
            logins: config.qualified(&t.logins),
            logins_by_provider: config.qualified(&t.logins_by_provider),
            claims: config.qualified(&t.claims),
        }
    }

    pub fn users(&self) -> &str {
        &self.users
    }

    pub fn users_by_username(&self) -> &str {
        &self.users_by_username
    }

    pub fn logins(&self) -> &str {
        &self.logins
    }

    pub fn logins_by_provider(&self) -> &str {
        &self.logins_by_provider
    }

    pub fn claims(&self) -> &str {
        &self.claims
    }

    /// Templates for `op`. Pair operations return two, primary first.
    pub fn queries(&self, op: Operation) -> Vec<Query> {
        const CREDENTIALS: [&str; 2] = [PASSWORD_HASH, SECURITY_STAMP];
        const LOGIN_KEY: [&str; 2] = [LOGIN_PROVIDER, PROVIDER_KEY];

        match op {
            Operation::CreateUser => vec![
                Query::insert(
                    &self.users,
                    &[USER_ID, USERNAME, PASSWORD_HASH, SECURITY_STAMP],
                ),
                Query::insert(
                    &self.users_by_username,
                    &[USERNAME, USER_ID, PASSWORD_HASH, SECURITY_STAMP],
                ),
            ],
            Operation::UpdateUser => vec![
                Query::update(&self.users, &CREDENTIALS, &[USER_ID]),
                Query::update(&self.users_by_username, &CREDENTIALS, &[USERNAME]),
            ],
            Operation::DeleteUser => vec![
                Query::delete(&self.users, &[USER_ID]),
                Query::delete(&self.users_by_username, &[USERNAME]),
            ],
            Operation::FindById => vec![Query::select(&self.users, &[USER_ID])],
            Operation::FindByName => vec![Query::select(&self.users_by_username, &[USERNAME])],
            Operation::AddLogin => vec![
                Query::insert(&self.logins, &[USER_ID, LOGIN_PROVIDER, PROVIDER_KEY]),
                Query::insert(
                    &self.logins_by_provider,
                    &[LOGIN_PROVIDER, PROVIDER_KEY, USER_ID],
                ),
            ],
            Operation::RemoveLogin => vec![
                Query::delete(&self.logins, &[USER_ID, LOGIN_PROVIDER, PROVIDER_KEY]),
                Query::delete(&self.logins_by_provider, &LOGIN_KEY),
            ],
            Operation::GetLogins => vec![Query::select(&self.logins, &[USER_ID])],
            Operation::FindLogin => vec![Query::select(&self.logins_by_provider, &LOGIN_KEY)],
            Operation::GetClaims => vec![Query::select(&self.claims, &[USER_ID])],
            Operation::AddClaim => vec![Query::insert(
                &self.claims,
                &[USER_ID, CLAIM_TYPE, CLAIM_VALUE],
            )],
            Operation::RemoveClaim => vec![Query::delete(
                &self.claims,
                &[USER_ID, CLAIM_TYPE, CLAIM_VALUE],
            )],
        }
    }

    /// Layout of every table the templates address.
    pub fn table_defs(&self) -> Vec<TableDef> {
        let user_columns = vec![USER_ID, USERNAME, PASSWORD_HASH, SECURITY_STAMP];
        vec![
            TableDef {
                name: self.users.clone(),
                primary_key: vec![USER_ID],
                columns: user_columns.clone(),
            },
            TableDef {
                name: self.users_by_username.clone(),
                primary_key: vec![USERNAME],
                columns: user_columns,
            },
            TableDef {
                name: self.logins.clone(),
                primary_key: vec![USER_ID, LOGIN_PROVIDER, PROVIDER_KEY],
                columns: vec![USER_ID, LOGIN_PROVIDER, PROVIDER_KEY],
            },
            TableDef {
                name: self.logins_by_provider.clone(),
                primary_key: vec![LOGIN_PROVIDER, PROVIDER_KEY],
                columns: vec![LOGIN_PROVIDER, PROVIDER_KEY, USER_ID],
            },
            TableDef {
                name: self.claims.clone(),
                primary_key: vec![USER_ID, CLAIM_TYPE, CLAIM_VALUE],
                columns: vec![USER_ID, CLAIM_TYPE, CLAIM_VALUE],
            },
        ]
    }
}
