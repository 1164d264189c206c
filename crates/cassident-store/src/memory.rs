//! In-memory wide-column session.
//!
//! [`MemorySession`] executes the store's templates against tables held
//! in RAM, with the write semantics of a wide-column store:
//!
//! - `INSERT` and `UPDATE` are both upserts keyed by the full primary key;
//! - writing `NULL` clears a column;
//! - `DELETE` and `SELECT` match rows by equality on the `WHERE` columns;
//! - a logged batch is validated up front and applied under one write
//!   lock, an unlogged batch applies statement by statement and stops at
//!   the first failure.
//!
//! Call counters and prepare fault injection make it usable as the fake
//! backing store in tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::schema::{Schema, TableDef};
use crate::session::{
    Batch, BatchKind, BoundStatement, PreparedId, PreparedStatement, Query, QueryShape, Row,
    RowSet, Session, SessionError, Value,
};

// ── stats ────────────────────────────────────────────────────────────

/// Snapshot of the calls a [`MemorySession`] has received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub prepare_calls: u64,
    pub execute_calls: u64,
    pub batch_calls: u64,
}

impl SessionStats {
    /// Calls of any kind.
    pub fn total(&self) -> u64 {
        self.prepare_calls + self.execute_calls + self.batch_calls
    }
}

// ── tables ───────────────────────────────────────────────────────────

struct MemTable {
    def: TableDef,
    rows: BTreeMap<Vec<Value>, Row>,
}

/// A validated write, ready to apply.
enum Mutation {
    Upsert {
        table: String,
        key: Vec<Value>,
        columns: Vec<(String, Value)>,
    },
    Delete {
        table: String,
        filter: Vec<(String, Value)>,
    },
}

type Tables = HashMap<String, MemTable>;

// ── session ──────────────────────────────────────────────────────────

/// A [`Session`] backed by in-process tables.
pub struct MemorySession {
    tables: RwLock<Tables>,
    next_id: AtomicU64,
    prepare_calls: AtomicU64,
    execute_calls: AtomicU64,
    batch_calls: AtomicU64,
    failing_prepares: AtomicU32,
    prepare_delay: Option<Duration>,
    closed: AtomicBool,
}

impl MemorySession {
    /// Creates a session with the given empty tables.
    pub fn new(defs: Vec<TableDef>) -> Self {
        let tables = defs
            .into_iter()
            .map(|def| {
                (
                    def.name.clone(),
                    MemTable {
                        def,
                        rows: BTreeMap::new(),
                    },
                )
            })
            .collect();
        debug!("opening in-memory session");
        Self {
            tables: RwLock::new(tables),
            next_id: AtomicU64::new(1),
            prepare_calls: AtomicU64::new(0),
            execute_calls: AtomicU64::new(0),
            batch_calls: AtomicU64::new(0),
            failing_prepares: AtomicU32::new(0),
            prepare_delay: None,
            closed: AtomicBool::new(false),
        }
    }

    /// Creates a session with every table the store's schema addresses.
    pub fn for_config(config: &StoreConfig) -> Self {
        Self::new(Schema::new(config).table_defs())
    }

    /// Delays every prepare, to widen race windows in tests.
    #[must_use]
    pub fn with_prepare_delay(mut self, delay: Duration) -> Self {
        self.prepare_delay = Some(delay);
        self
    }

    /// Makes the next `n` prepare calls fail with
    /// [`SessionError::Unavailable`].
    pub fn fail_next_prepares(&self, n: u32) {
        self.failing_prepares.store(n, Ordering::SeqCst);
    }

    /// Calls received so far.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            prepare_calls: self.prepare_calls.load(Ordering::SeqCst),
            execute_calls: self.execute_calls.load(Ordering::SeqCst),
            batch_calls: self.batch_calls.load(Ordering::SeqCst),
        }
    }

    /// Whether [`Session::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Rows of `table` in primary-key order. Empty for unknown tables.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .map(|tables| {
                tables
                    .get(table)
                    .map(|t| t.rows.values().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    fn read_tables(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, SessionError> {
        self.tables
            .read()
            .map_err(|e| SessionError::Execution(format!("table lock poisoned: {e}")))
    }

    fn write_tables(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, SessionError> {
        self.tables
            .write()
            .map_err(|e| SessionError::Execution(format!("table lock poisoned: {e}")))
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn prepare(&self, query: &Query) -> Result<PreparedStatement, SessionError> {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_open()?;

        if let Some(delay) = self.prepare_delay {
            tokio::time::sleep(delay).await;
        }

        let injected = self
            .failing_prepares
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(SessionError::Unavailable("injected prepare failure".into()));
        }

        {
            let tables = self.read_tables()?;
            let shape = query.shape();
            let Some(target) = tables.get(shape.table()) else {
                return Err(SessionError::Syntax(format!(
                    "unconfigured table {}",
                    shape.table()
                )));
            };
            if let Some(column) = shape
                .columns()
                .find(|c| !target.def.columns.iter().any(|d| d == c))
            {
                return Err(SessionError::Syntax(format!(
                    "undefined column name {column} in table {}",
                    target.def.name
                )));
            }
        }

        let id = PreparedId(self.next_id.fetch_add(1, Ordering::SeqCst));
        debug!(id = id.0, cql = %query, "prepared");
        Ok(PreparedStatement::new(id, query.clone()))
    }

    async fn execute(&self, statement: BoundStatement) -> Result<RowSet, SessionError> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_open()?;

        if let QueryShape::Select { .. } = statement.prepared().query().shape() {
            let tables = self.read_tables()?;
            return select(&tables, &statement);
        }

        let mut tables = self.write_tables()?;
        let mutation = plan(&tables, &statement)?;
        apply(&mut tables, mutation);
        Ok(RowSet::empty())
    }

    async fn batch(&self, batch: Batch) -> Result<(), SessionError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_open()?;

        match batch.kind() {
            BatchKind::Logged => {
                let mut tables = self.write_tables()?;
                let mutations = batch
                    .statements()
                    .iter()
                    .map(|s| plan(&tables, s))
                    .collect::<Result<Vec<_>, _>>()?;
                for mutation in mutations {
                    apply(&mut tables, mutation);
                }
            }
            BatchKind::Unlogged => {
                for statement in batch.statements() {
                    let mut tables = self.write_tables()?;
                    let mutation = plan(&tables, statement)?;
                    apply(&mut tables, mutation);
                }
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("in-memory session closed");
        }
        Ok(())
    }
}

// ── statement evaluation ─────────────────────────────────────────────

fn table<'a>(tables: &'a Tables, name: &str) -> Result<&'a MemTable, SessionError> {
    tables
        .get(name)
        .ok_or_else(|| SessionError::Execution(format!("unconfigured table {name}")))
}

fn pairs(columns: &[String], values: &[Value]) -> Vec<(String, Value)> {
    columns.iter().cloned().zip(values.iter().cloned()).collect()
}

fn primary_key(def: &TableDef, columns: &[(String, Value)]) -> Result<Vec<Value>, SessionError> {
    def.primary_key
        .iter()
        .map(|pk| {
            columns
                .iter()
                .find(|(c, v)| c.as_str() == *pk && *v != Value::Null)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| {
                    SessionError::Execution(format!(
                        "missing primary key column {pk} for {}",
                        def.name
                    ))
                })
        })
        .collect()
}

fn matches(row: &Row, filter: &[(String, Value)]) -> bool {
    filter.iter().all(|(c, v)| row.get(c) == Some(v))
}

fn plan(tables: &Tables, statement: &BoundStatement) -> Result<Mutation, SessionError> {
    let shape = statement.prepared().query().shape();
    let values = statement.values();
    let target = table(tables, shape.table())?;

    match shape {
        QueryShape::Insert { table, columns } => {
            let columns = pairs(columns, values);
            Ok(Mutation::Upsert {
                table: table.clone(),
                key: primary_key(&target.def, &columns)?,
                columns,
            })
        }
        QueryShape::Update { table, set, keys } => {
            let key_columns = pairs(keys, &values[set.len()..]);
            let key = primary_key(&target.def, &key_columns)?;
            let mut columns = key_columns;
            columns.extend(pairs(set, &values[..set.len()]));
            Ok(Mutation::Upsert {
                table: table.clone(),
                key,
                columns,
            })
        }
        QueryShape::Delete { table, keys } => {
            if let Some(col) = keys
                .iter()
                .find(|k| !target.def.primary_key.iter().any(|pk| *pk == k.as_str()))
            {
                return Err(SessionError::Execution(format!(
                    "non-key column {col} in DELETE on {table}"
                )));
            }
            Ok(Mutation::Delete {
                table: table.clone(),
                filter: pairs(keys, values),
            })
        }
        QueryShape::Select { table, .. } => Err(SessionError::Execution(format!(
            "SELECT on {table} cannot be written"
        ))),
    }
}

fn apply(tables: &mut Tables, mutation: Mutation) {
    match mutation {
        Mutation::Upsert {
            table,
            key,
            columns,
        } => {
            if let Some(t) = tables.get_mut(&table) {
                let row = t.rows.entry(key).or_default();
                for (column, value) in columns {
                    row.set(column, value);
                }
            }
        }
        Mutation::Delete { table, filter } => {
            if let Some(t) = tables.get_mut(&table) {
                t.rows.retain(|_, row| !matches(row, &filter));
            }
        }
    }
}

fn select(tables: &Tables, statement: &BoundStatement) -> Result<RowSet, SessionError> {
    let shape = statement.prepared().query().shape();
    let QueryShape::Select { table: name, keys } = shape else {
        return Err(SessionError::Execution(format!("not a SELECT: {shape:?}")));
    };
    let filter = pairs(keys, statement.values());
    let rows = table(tables, name)?
        .rows
        .values()
        .filter(|row| matches(row, &filter))
        .cloned()
        .collect();
    Ok(RowSet::new(rows))
}

// ── tests ────────────────────────────────────────────────────────────
