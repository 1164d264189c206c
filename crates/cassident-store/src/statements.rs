//! Prepared-statement cache.
//!
//! Each [`Operation`] owns one [`OnceCell`] holding its prepared
//! template(s). The first caller for an operation issues the prepare
//! round trip; concurrent first callers wait on the same cell instead of
//! preparing again, and every later caller reuses the handle.
//!
//! A failed preparation leaves the cell empty, so the next caller retries.
//! Nothing is memoized as a permanent failure.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::try_join_all;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::schema::{Operation, Schema};
use crate::session::{PreparedStatement, Session};

// ── prepared templates ───────────────────────────────────────────────

/// The template(s) prepared for one operation.
#[derive(Debug, Clone)]
pub enum Prepared {
    /// A single-table read or write.
    Single(PreparedStatement),
    /// The two sides of a denormalized write, primary projection first.
    Pair([PreparedStatement; 2]),
}

impl Prepared {
    fn from_vec(op: Operation, mut statements: Vec<PreparedStatement>) -> StoreResult<Self> {
        match statements.len() {
            1 => Ok(Self::Single(statements.remove(0))),
            2 => {
                let alternate = statements.remove(1);
                let primary = statements.remove(0);
                Ok(Self::Pair([primary, alternate]))
            }
            n => Err(StoreError::Catalog(format!(
                "operation {op} has {n} templates"
            ))),
        }
    }
}

// ── stats ────────────────────────────────────────────────────────────

/// Counters for cache effectiveness.
#[derive(Debug, Default)]
pub struct PrepareStats {
    hits: AtomicU64,
    preparations: AtomicU64,
    failures: AtomicU64,
}

impl PrepareStats {
    /// Lookups served from an already-populated entry.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Preparation attempts issued to the session (one per operation, not
    /// per template).
    pub fn preparations(&self) -> u64 {
        self.preparations.load(Ordering::Relaxed)
    }

    /// Preparation attempts that failed.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl fmt::Display for PrepareStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} preparations={} failures={}",
            self.hits(),
            self.preparations(),
            self.failures(),
        )
    }
}

// ── cache ────────────────────────────────────────────────────────────

/// Per-store cache of prepared templates, keyed by operation.
pub struct StatementCache {
    session: Arc<dyn Session>,
    schema: Schema,
    entries: HashMap<Operation, OnceCell<Prepared>>,
    stats: PrepareStats,
}

impl StatementCache {
    /// Creates an empty cache with one slot per operation. No I/O.
    pub fn new(session: Arc<dyn Session>, schema: Schema) -> Self {
        let entries = Operation::ALL
            .iter()
            .map(|op| (*op, OnceCell::new()))
            .collect();
        Self {
            session,
            schema,
            entries,
            stats: PrepareStats::default(),
        }
    }

    /// Returns the prepared template(s) for `op`, preparing them on first
    /// use.
    pub async fn get_or_prepare(&self, op: Operation) -> StoreResult<&Prepared> {
        let cell = self
            .entries
            .get(&op)
            .ok_or_else(|| StoreError::Catalog(format!("no cache slot for {op}")))?;

        if let Some(prepared) = cell.get() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(prepared);
        }

        cell.get_or_try_init(|| self.prepare(op)).await
    }

    /// Single-template operation.
    pub async fn single(&self, op: Operation) -> StoreResult<&PreparedStatement> {
        match self.get_or_prepare(op).await? {
            Prepared::Single(statement) => Ok(statement),
            Prepared::Pair(_) => Err(StoreError::Catalog(format!(
                "operation {op} prepares a projection pair"
            ))),
        }
    }

    /// Projection-pair operation: `[primary, alternate]`.
    pub async fn pair(&self, op: Operation) -> StoreResult<&[PreparedStatement; 2]> {
        match self.get_or_prepare(op).await? {
            Prepared::Pair(statements) => Ok(statements),
            Prepared::Single(_) => Err(StoreError::Catalog(format!(
                "operation {op} prepares a single template"
            ))),
        }
    }

    /// Prepares every operation up front.
    pub async fn warm_up(&self) -> StoreResult<()> {
        try_join_all(Operation::ALL.iter().map(|op| self.get_or_prepare(*op))).await?;
        debug!(stats = %self.stats, "statement cache warmed up");
        Ok(())
    }

    /// Whether `op` has been prepared.
    pub fn is_prepared(&self, op: Operation) -> bool {
        self.entries.get(&op).is_some_and(OnceCell::initialized)
    }

    /// Cache counters.
    pub fn stats(&self) -> &PrepareStats {
        &self.stats
    }

    /// Prepares every template of `op` concurrently. The entry is only
    /// published when all of them succeed.
    async fn prepare(&self, op: Operation) -> StoreResult<Prepared> {
        let queries = self.schema.queries(op);
        self.stats.preparations.fetch_add(1, Ordering::Relaxed);
        debug!(operation = %op, templates = queries.len(), "preparing statements");

        match try_join_all(queries.iter().map(|q| self.session.prepare(q))).await {
            Ok(statements) => Prepared::from_vec(op, statements),
            Err(err) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!(operation = %op, %err, "statement preparation failed");
                Err(err.into())
            }
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────
