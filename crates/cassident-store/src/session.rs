//! Backing-store protocol.
//!
//! The wide-column driver is an external collaborator. The store only
//! needs four things from it: prepare a query once, bind ordered values
//! to the prepared handle, execute a bound statement or a batch, and close
//! the shared connection. [`Session`] is that seam; connection pooling,
//! consistency levels, retries and wire serialization all live behind it.
//!
//! A [`Query`] carries the CQL text a real driver sends to the cluster
//! plus a structured [`QueryShape`], so backends that do not parse CQL
//! (such as [`MemorySession`](crate::memory::MemorySession)) can execute
//! the same templates.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════
//  Errors
// ═══════════════════════════════════════════════════════════════════════

/// Failures reported by a backing session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No replica could serve the request.
    #[error("backing store unavailable: {0}")]
    Unavailable(String),

    /// The cluster rejected the query text.
    #[error("invalid query: {0}")]
    Syntax(String),

    /// Bound values do not match the prepared template.
    #[error("bind error: expected {expected} values, got {actual}")]
    Bind { expected: usize, actual: usize },

    /// The statement reached the cluster but failed there.
    #[error("execution failed: {0}")]
    Execution(String),

    /// The session was disposed.
    #[error("session is closed")]
    Closed,
}

// ═══════════════════════════════════════════════════════════════════════
//  Values and rows
// ═══════════════════════════════════════════════════════════════════════

/// A typed column value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    /// Unset column, or a write that clears it.
    Null,
    /// `uuid` column.
    Uuid(Uuid),
    /// `text` column.
    Text(String),
}

impl From<Uuid> for Value {
    fn from(id: Uuid) -> Self {
        Self::Uuid(id)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Option<&str>> for Value {
    fn from(s: Option<&str>) -> Self {
        s.map_or(Self::Null, |s| Self::Text(s.to_string()))
    }
}

/// A single result row, addressed by column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    /// Builds a row from `(column, value)` pairs. `Null` values are dropped.
    pub fn from_columns<I, K>(columns: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut row = Self::default();
        for (name, value) in columns {
            row.set(name, value);
        }
        row
    }

    /// Sets a column. Writing `Null` removes it.
    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        let column = column.into();
        if value == Value::Null {
            self.columns.remove(&column);
        } else {
            self.columns.insert(column, value);
        }
    }

    /// Raw column value, if present.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// `uuid` column value.
    pub fn get_uuid(&self, column: &str) -> Option<Uuid> {
        match self.columns.get(column) {
            Some(Value::Uuid(id)) => Some(*id),
            _ => None,
        }
    }

    /// `text` column value.
    pub fn get_text(&self, column: &str) -> Option<&str> {
        match self.columns.get(column) {
            Some(Value::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Iterates over the non-null columns.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Rows returned by a read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSet {
    rows: Vec<Row>,
}

impl RowSet {
    /// Wraps a list of rows.
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// An empty result, as returned by writes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the result has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Borrow the rows.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

impl IntoIterator for RowSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Queries
// ═══════════════════════════════════════════════════════════════════════

/// Structure of a query template. Placeholders are bound in the order
/// the columns are listed (`set` before `keys` for updates).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryShape {
    /// `INSERT INTO table (columns...) VALUES (?...)`
    Insert { table: String, columns: Vec<String> },
    /// `UPDATE table SET set... WHERE keys...`
    Update {
        table: String,
        set: Vec<String>,
        keys: Vec<String>,
    },
    /// `DELETE FROM table WHERE keys...`
    Delete { table: String, keys: Vec<String> },
    /// `SELECT * FROM table WHERE keys...`
    Select { table: String, keys: Vec<String> },
}

impl QueryShape {
    /// Table the query addresses.
    pub fn table(&self) -> &str {
        match self {
            Self::Insert { table, .. }
            | Self::Update { table, .. }
            | Self::Delete { table, .. }
            | Self::Select { table, .. } => table,
        }
    }

    /// Every column the query names, in placeholder order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        let none: &[String] = &[];
        let (first, second) = match self {
            Self::Insert { columns, .. } => (columns.as_slice(), none),
            Self::Update { set, keys, .. } => (set.as_slice(), keys.as_slice()),
            Self::Delete { keys, .. } | Self::Select { keys, .. } => (keys.as_slice(), none),
        };
        first.iter().chain(second).map(String::as_str)
    }

    /// Number of `?` placeholders.
    pub fn param_count(&self) -> usize {
        match self {
            Self::Insert { columns, .. } => columns.len(),
            Self::Update { set, keys, .. } => set.len() + keys.len(),
            Self::Delete { keys, .. } | Self::Select { keys, .. } => keys.len(),
        }
    }
}

/// A parameterized query template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    cql: String,
    shape: QueryShape,
}

impl Query {
    /// `INSERT INTO {table} ({columns}) VALUES ({?..})`
    pub fn insert(table: &str, columns: &[&str]) -> Self {
        let placeholders = vec!["?"; columns.len()].join(", ");
        let cql = format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            columns.join(", ")
        );
        Self {
            cql,
            shape: QueryShape::Insert {
                table: table.to_string(),
                columns: owned(columns),
            },
        }
    }

    /// `UPDATE {table} SET {set = ?..} WHERE {keys = ?..}`
    pub fn update(table: &str, set: &[&str], keys: &[&str]) -> Self {
        let cql = format!(
            "UPDATE {table} SET {} WHERE {}",
            assignments(set, ", "),
            assignments(keys, " AND ")
        );
        Self {
            cql,
            shape: QueryShape::Update {
                table: table.to_string(),
                set: owned(set),
                keys: owned(keys),
            },
        }
    }

    /// `DELETE FROM {table} WHERE {keys = ?..}`
    pub fn delete(table: &str, keys: &[&str]) -> Self {
        let cql = format!("DELETE FROM {table} WHERE {}", assignments(keys, " AND "));
        Self {
            cql,
            shape: QueryShape::Delete {
                table: table.to_string(),
                keys: owned(keys),
            },
        }
    }

    /// `SELECT * FROM {table} WHERE {keys = ?..}`
    pub fn select(table: &str, keys: &[&str]) -> Self {
        let cql = format!("SELECT * FROM {table} WHERE {}", assignments(keys, " AND "));
        Self {
            cql,
            shape: QueryShape::Select {
                table: table.to_string(),
                keys: owned(keys),
            },
        }
    }

    /// CQL text sent to the cluster.
    pub fn cql(&self) -> &str {
        &self.cql
    }

    /// Structured form of the template.
    pub fn shape(&self) -> &QueryShape {
        &self.shape
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cql)
    }
}

fn owned(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| (*c).to_string()).collect()
}

fn assignments(columns: &[&str], separator: &str) -> String {
    columns
        .iter()
        .map(|c| format!("{c} = ?"))
        .collect::<Vec<_>>()
        .join(separator)
}

// ═══════════════════════════════════════════════════════════════════════
//  Prepared and bound statements
// ═══════════════════════════════════════════════════════════════════════

/// Handle issued by the backing store for a prepared template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreparedId(pub u64);

/// A reusable, server-side prepared template.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    id: PreparedId,
    query: Arc<Query>,
}

impl PreparedStatement {
    /// Wraps a handle issued by a session.
    pub fn new(id: PreparedId, query: Query) -> Self {
        Self {
            id,
            query: Arc::new(query),
        }
    }

    /// Backend handle.
    pub fn id(&self) -> PreparedId {
        self.id
    }

    /// Template this handle was prepared from.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Binds ordered values into an executable statement.
    pub fn bind(&self, values: Vec<Value>) -> Result<BoundStatement, SessionError> {
        let expected = self.query.shape().param_count();
        if values.len() != expected {
            return Err(SessionError::Bind {
                expected,
                actual: values.len(),
            });
        }
        Ok(BoundStatement {
            prepared: self.clone(),
            values,
        })
    }
}

/// A prepared template with its values bound.
#[derive(Debug, Clone)]
pub struct BoundStatement {
    prepared: PreparedStatement,
    values: Vec<Value>,
}

impl BoundStatement {
    /// The prepared template.
    pub fn prepared(&self) -> &PreparedStatement {
        &self.prepared
    }

    /// Bound values, in placeholder order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Batches
// ═══════════════════════════════════════════════════════════════════════

/// Batch log mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    /// Written to the batch log first: all statements eventually apply or
    /// none do. Readers may still observe a partially applied batch.
    #[default]
    Logged,
    /// No batch log; statements apply independently.
    Unlogged,
}

/// Statements submitted together.
#[derive(Debug, Clone)]
pub struct Batch {
    kind: BatchKind,
    statements: Vec<BoundStatement>,
}

impl Batch {
    /// Creates an empty batch.
    pub fn new(kind: BatchKind) -> Self {
        Self {
            kind,
            statements: Vec::new(),
        }
    }

    /// Appends a statement.
    pub fn add(&mut self, statement: BoundStatement) {
        self.statements.push(statement);
    }

    /// Log mode.
    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    /// Statements in submission order.
    pub fn statements(&self) -> &[BoundStatement] {
        &self.statements
    }

    /// Number of statements.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Session trait
// ═══════════════════════════════════════════════════════════════════════

/// A long-lived connection to the wide-column store.
///
/// One session is shared by every operation of a store and by its
/// statement cache. Implementations must be safe for concurrent use.
#[async_trait]
pub trait Session: Send + Sync {
    /// Prepares a query template on the cluster.
    async fn prepare(&self, query: &Query) -> Result<PreparedStatement, SessionError>;

    /// Executes a single bound statement.
    async fn execute(&self, statement: BoundStatement) -> Result<RowSet, SessionError>;

    /// Executes a batch of bound statements.
    async fn batch(&self, batch: Batch) -> Result<(), SessionError>;

    /// Disposes the connection. Every later call fails.
    async fn close(&self) -> Result<(), SessionError>;
}
