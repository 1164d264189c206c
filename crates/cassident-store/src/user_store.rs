//! Identity store over a partitioned wide-column database.
//!
//! The database has no joins, no secondary indexes worth using and no
//! multi-table transactions, so every alternate lookup path is a
//! denormalized copy maintained by the application:
//!
//! - a user lives in `users` (by id) and `users_by_username`;
//! - a login lives in `logins` (by user) and `logins_by_provider`;
//! - claims live only in `claims` (by user).
//!
//! Each mutation of a projection pair is sent as one batch (logged by
//! default). That guarantees both sides eventually apply or neither does,
//! nothing more: readers can see a half-applied batch, and concurrent
//! mutations of the same user resolve last-writer-wins per projection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use cassident_model::{Claim, User, UserLoginInfo};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{DuplicateRowPolicy, StoreConfig};
use crate::error::{StoreError, StoreResult};
use crate::schema::{
    CLAIM_TYPE, CLAIM_VALUE, LOGIN_PROVIDER, Operation, PASSWORD_HASH, PROVIDER_KEY, SECURITY_STAMP,
    Schema, USER_ID, USERNAME,
};
use crate::session::{Batch, BoundStatement, Row, RowSet, Session, Value};
use crate::statements::StatementCache;
use crate::traits::{UserClaimStore, UserLoginStore, UserStore};

// ═══════════════════════════════════════════════════════════════════════
//  CassandraUserStore
// ═══════════════════════════════════════════════════════════════════════

/// User, login and claim persistence over a shared [`Session`].
///
/// Safe to share across tasks; holds no per-call locks.
pub struct CassandraUserStore {
    session: Arc<dyn Session>,
    statements: StatementCache,
    schema: Schema,
    config: StoreConfig,
    closed: AtomicBool,
    /// Set once `Session::close` has succeeded.
    disposed: Mutex<bool>,
}

impl CassandraUserStore {
    /// Create a store with the default configuration. No I/O: statements
    /// are prepared on first use.
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self::build(session, StoreConfig::default())
    }

    /// Create a store with an explicit configuration.
    pub fn with_config(session: Arc<dyn Session>, config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self::build(session, config))
    }

    fn build(session: Arc<dyn Session>, config: StoreConfig) -> Self {
        let schema = Schema::new(&config);
        let statements = StatementCache::new(Arc::clone(&session), schema.clone());
        info!(
            keyspace = %config.keyspace,
            batch_kind = ?config.batch_kind,
            duplicate_rows = ?config.duplicate_rows,
            "user store created"
        );
        Self {
            session,
            statements,
            schema,
            config,
            closed: AtomicBool::new(false),
            disposed: Mutex::new(false),
        }
    }

    /// The statement cache owned by this store.
    pub fn statements(&self) -> &StatementCache {
        &self.statements
    }

    /// The active configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Dispose the shared session. Every operation afterwards fails with
    /// [`StoreError::Closed`], even if disposal itself fails.
    ///
    /// The session is closed at most once successfully. After a failed
    /// attempt the next `close` tries again.
    pub async fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);

        let mut disposed = self.disposed.lock().await;
        if *disposed {
            return Ok(());
        }
        if let Err(err) = self.session.close().await {
            warn!(%err, "closing session failed");
            return Err(err.into());
        }
        *disposed = true;
        info!("user store closed");
        Ok(())
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // ── dispatch ─────────────────────────────────────────────────────

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Binds both sides of a projection pair and sends them as one batch.
    async fn write_pair(
        &self,
        op: Operation,
        primary: Vec<Value>,
        alternate: Vec<Value>,
    ) -> StoreResult<()> {
        let [primary_stmt, alternate_stmt] = self.statements.pair(op).await?;

        let mut batch = Batch::new(self.config.batch_kind);
        batch.add(primary_stmt.bind(primary)?);
        batch.add(alternate_stmt.bind(alternate)?);

        debug!(operation = %op, kind = ?batch.kind(), statements = batch.len(), "dispatching batch");
        self.session.batch(batch).await?;
        Ok(())
    }

    /// Binds and executes a single-template operation.
    async fn run(&self, op: Operation, values: Vec<Value>) -> StoreResult<RowSet> {
        let bound: BoundStatement = self.statements.single(op).await?.bind(values)?;
        let rows = self.session.execute(bound).await?;
        debug!(operation = %op, rows = rows.len(), "executed");
        Ok(rows)
    }

    /// At most one row from a read keyed by a unique attribute.
    fn unique_row(&self, table: &str, rows: RowSet) -> StoreResult<Option<Row>> {
        let count = rows.len();
        if count > 1 {
            warn!(table, count, "unique-key read returned several rows");
            if self.config.duplicate_rows == DuplicateRowPolicy::RejectAmbiguous {
                return Err(StoreError::AmbiguousRows {
                    table: table.to_string(),
                    count,
                });
            }
        }
        Ok(rows.into_iter().next())
    }

    async fn load_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let rows = self.run(Operation::FindById, vec![id.into()]).await?;
        self.unique_row(self.schema.users(), rows)?
            .map(|row| user_from_row(self.schema.users(), &row))
            .transpose()
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Validation
// ═══════════════════════════════════════════════════════════════════════

fn require_user(user: &User) -> StoreResult<()> {
    if user.id.is_nil() {
        return Err(StoreError::invalid_argument("user id must be set"));
    }
    require_text("username", &user.username)
}

fn require_text(field: &str, value: &str) -> StoreResult<()> {
    if value.trim().is_empty() {
        return Err(StoreError::invalid_argument(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}

fn require_login(login: &UserLoginInfo) -> StoreResult<()> {
    require_text("login provider", &login.login_provider)?;
    require_text("provider key", &login.provider_key)
}

fn require_claim(claim: &Claim) -> StoreResult<()> {
    require_text("claim type", &claim.claim_type)
}

// ═══════════════════════════════════════════════════════════════════════
//  Row mapping
// ═══════════════════════════════════════════════════════════════════════

fn missing(table: &str, column: &str) -> StoreError {
    StoreError::InvalidData {
        table: table.to_string(),
        message: format!("column {column} is null"),
    }
}

fn user_from_row(table: &str, row: &Row) -> StoreResult<User> {
    let id = row.get_uuid(USER_ID).ok_or_else(|| missing(table, USER_ID))?;
    let username = row
        .get_text(USERNAME)
        .ok_or_else(|| missing(table, USERNAME))?;

    let mut user = User::with_id(id, username);
    user.password_hash = row.get_text(PASSWORD_HASH).map(str::to_owned);
    user.security_stamp = row.get_text(SECURITY_STAMP).map(str::to_owned);
    Ok(user)
}

fn login_from_row(table: &str, row: &Row) -> StoreResult<UserLoginInfo> {
    let provider = row
        .get_text(LOGIN_PROVIDER)
        .ok_or_else(|| missing(table, LOGIN_PROVIDER))?;
    let key = row
        .get_text(PROVIDER_KEY)
        .ok_or_else(|| missing(table, PROVIDER_KEY))?;
    Ok(UserLoginInfo::new(provider, key))
}

fn claim_from_row(table: &str, row: &Row) -> StoreResult<Claim> {
    let claim_type = row
        .get_text(CLAIM_TYPE)
        .ok_or_else(|| missing(table, CLAIM_TYPE))?;
    let value = row
        .get_text(CLAIM_VALUE)
        .ok_or_else(|| missing(table, CLAIM_VALUE))?;
    Ok(Claim::new(claim_type, value))
}

// ═══════════════════════════════════════════════════════════════════════
//  Users
// ═══════════════════════════════════════════════════════════════════════

#[async_trait]
impl UserStore for CassandraUserStore {
    #[instrument(skip(self, user), fields(user_id = %user.id, username = %user.username))]
    async fn create(&self, user: &User) -> StoreResult<()> {
        require_user(user)?;
        self.ensure_open()?;

        let hash = Value::from(user.password_hash.as_deref());
        let stamp = Value::from(user.security_stamp.as_deref());

        self.write_pair(
            Operation::CreateUser,
            vec![
                user.id.into(),
                user.username.as_str().into(),
                hash.clone(),
                stamp.clone(),
            ],
            vec![user.username.as_str().into(), user.id.into(), hash, stamp],
        )
        .await?;

        debug!("user created");
        Ok(())
    }

    #[instrument(skip(self, user), fields(user_id = %user.id, username = %user.username))]
    async fn update(&self, user: &User) -> StoreResult<()> {
        require_user(user)?;
        self.ensure_open()?;

        let hash = Value::from(user.password_hash.as_deref());
        let stamp = Value::from(user.security_stamp.as_deref());

        // Keyed by the current username; a renamed user leaves the old
        // by-username row behind.
        self.write_pair(
            Operation::UpdateUser,
            vec![hash.clone(), stamp.clone(), user.id.into()],
            vec![hash, stamp, user.username.as_str().into()],
        )
        .await?;

        debug!("user updated");
        Ok(())
    }

    #[instrument(skip(self, user), fields(user_id = %user.id, username = %user.username))]
    async fn delete(&self, user: &User) -> StoreResult<()> {
        require_user(user)?;
        self.ensure_open()?;

        self.write_pair(
            Operation::DeleteUser,
            vec![user.id.into()],
            vec![user.username.as_str().into()],
        )
        .await?;

        debug!("user deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        if id.is_nil() {
            return Err(StoreError::invalid_argument("user id must be set"));
        }
        self.ensure_open()?;
        self.load_user(id).await
    }

    #[instrument(skip(self))]
    async fn find_by_name(&self, username: &str) -> StoreResult<Option<User>> {
        require_text("username", username)?;
        self.ensure_open()?;

        let table = self.schema.users_by_username();
        let rows = self.run(Operation::FindByName, vec![username.into()]).await?;
        self.unique_row(table, rows)?
            .map(|row| user_from_row(table, &row))
            .transpose()
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Logins
// ═══════════════════════════════════════════════════════════════════════

#[async_trait]
impl UserLoginStore for CassandraUserStore {
    #[instrument(skip(self, user, login), fields(user_id = %user.id, login = %login))]
    async fn add_login(&self, user: &User, login: &UserLoginInfo) -> StoreResult<()> {
        require_user(user)?;
        require_login(login)?;
        self.ensure_open()?;

        let provider = login.login_provider.as_str();
        let key = login.provider_key.as_str();
        self.write_pair(
            Operation::AddLogin,
            vec![user.id.into(), provider.into(), key.into()],
            vec![provider.into(), key.into(), user.id.into()],
        )
        .await
    }

    #[instrument(skip(self, user, login), fields(user_id = %user.id, login = %login))]
    async fn remove_login(&self, user: &User, login: &UserLoginInfo) -> StoreResult<()> {
        require_user(user)?;
        require_login(login)?;
        self.ensure_open()?;

        let provider = login.login_provider.as_str();
        let key = login.provider_key.as_str();
        self.write_pair(
            Operation::RemoveLogin,
            vec![user.id.into(), provider.into(), key.into()],
            vec![provider.into(), key.into()],
        )
        .await
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn get_logins(&self, user: &User) -> StoreResult<Vec<UserLoginInfo>> {
        require_user(user)?;
        self.ensure_open()?;

        let table = self.schema.logins();
        self.run(Operation::GetLogins, vec![user.id.into()])
            .await?
            .into_iter()
            .map(|row| login_from_row(table, &row))
            .collect()
    }

    #[instrument(skip(self, login), fields(login = %login))]
    async fn find_user_by_login(&self, login: &UserLoginInfo) -> StoreResult<Option<User>> {
        require_login(login)?;
        self.ensure_open()?;

        let table = self.schema.logins_by_provider();
        let rows = self
            .run(
                Operation::FindLogin,
                vec![
                    login.login_provider.as_str().into(),
                    login.provider_key.as_str().into(),
                ],
            )
            .await?;
        let Some(row) = self.unique_row(table, rows)? else {
            return Ok(None);
        };
        let user_id = row.get_uuid(USER_ID).ok_or_else(|| missing(table, USER_ID))?;

        // Not atomic: the user may be deleted between the two reads.
        self.load_user(user_id).await
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Claims
// ═══════════════════════════════════════════════════════════════════════

#[async_trait]
impl UserClaimStore for CassandraUserStore {
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn get_claims(&self, user: &User) -> StoreResult<Vec<Claim>> {
        require_user(user)?;
        self.ensure_open()?;

        let table = self.schema.claims();
        self.run(Operation::GetClaims, vec![user.id.into()])
            .await?
            .into_iter()
            .map(|row| claim_from_row(table, &row))
            .collect()
    }

    #[instrument(skip(self, user, claim), fields(user_id = %user.id, claim_type = %claim.claim_type))]
    async fn add_claim(&self, user: &User, claim: &Claim) -> StoreResult<()> {
        require_user(user)?;
        require_claim(claim)?;
        self.ensure_open()?;

        self.run(
            Operation::AddClaim,
            vec![
                user.id.into(),
                claim.claim_type.as_str().into(),
                claim.value.as_str().into(),
            ],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, user, claim), fields(user_id = %user.id, claim_type = %claim.claim_type))]
    async fn remove_claim(&self, user: &User, claim: &Claim) -> StoreResult<()> {
        require_user(user)?;
        require_claim(claim)?;
        self.ensure_open()?;

        self.run(
            Operation::RemoveClaim,
            vec![
                user.id.into(),
                claim.claim_type.as_str().into(),
                claim.value.as_str().into(),
            ],
        )
        .await?;
        Ok(())
    }
}

// ── tests ────────────────────────────────────────────────────────────
