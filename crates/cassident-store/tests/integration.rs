//! Integration tests for the cassident-store crate.
//!
//! These tests drive `CassandraUserStore` end to end through its public
//! capability traits, against the in-process `MemorySession` and a few
//! scripted sessions for duplicate-row and failure scenarios.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use cassident_model::{Claim, User, UserLoginInfo};
use cassident_store::{
    Batch, BoundStatement, CassandraUserStore, DuplicateRowPolicy, MemorySession, PreparedId,
    PreparedStatement, Query, Row, RowSet, Session, SessionError, StoreConfig, StoreError,
    UserClaimStore, UserLoginStore, UserPasswordStore, UserSecurityStampStore, UserStore, Value,
};
use uuid::Uuid;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("cassident_store=debug")
        .with_test_writer()
        .try_init();
}

fn memory_store() -> (Arc<MemorySession>, CassandraUserStore) {
    init_tracing();
    let session = Arc::new(MemorySession::for_config(&StoreConfig::default()));
    let store = CassandraUserStore::new(session.clone());
    (session, store)
}

// ── scripted session ─────────────────────────────────────────────────

/// Answers every read with the same rows and fails writes on demand.
struct ScriptedSession {
    rows: Vec<Row>,
    write_error: Option<SessionError>,
    calls: AtomicU64,
    next_id: AtomicU64,
}

impl ScriptedSession {
    fn returning(rows: Vec<Row>) -> Self {
        Self {
            rows,
            write_error: None,
            calls: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    fn failing_writes(error: SessionError) -> Self {
        Self {
            write_error: Some(error),
            ..Self::returning(Vec::new())
        }
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Session for ScriptedSession {
    async fn prepare(&self, query: &Query) -> Result<PreparedStatement, SessionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id = PreparedId(self.next_id.fetch_add(1, Ordering::SeqCst));
        Ok(PreparedStatement::new(id, query.clone()))
    }

    async fn execute(&self, _statement: BoundStatement) -> Result<RowSet, SessionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.write_error {
            Some(err) => Err(err.clone()),
            None => Ok(RowSet::new(self.rows.clone())),
        }
    }

    async fn batch(&self, _batch: Batch) -> Result<(), SessionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.write_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<(), SessionError> {
        Ok(())
    }
}

fn user_row(id: Uuid, username: &str, hash: &str) -> Row {
    Row::from_columns([
        ("userid", Value::from(id)),
        ("username", Value::from(username)),
        ("password_hash", Value::from(hash)),
    ])
}

// ═══════════════════════════════════════════════════════════════════════
//  Users
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn user_lifecycle_scenario() {
    let (_, store) = memory_store();
    let mut user = User::new("alice").password_hash("h1").security_stamp("s1");
    let id = user.id;

    store.create(&user).await.unwrap();
    let found = store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(found.id, id);
    assert_eq!(found.username, "alice");
    assert_eq!(found.password_hash.as_deref(), Some("h1"));
    assert_eq!(found.security_stamp.as_deref(), Some("s1"));

    store.set_password_hash(&mut user, "h2".into());
    store.set_security_stamp(&mut user, "s2".into());
    store.update(&user).await.unwrap();
    let by_name = store.find_by_name("alice").await.unwrap().unwrap();
    assert_eq!(by_name.password_hash.as_deref(), Some("h2"));

    let google = UserLoginInfo::new("google", "g-key");
    store.add_login(&user, &google).await.unwrap();
    let owner = store.find_user_by_login(&google).await.unwrap().unwrap();
    assert_eq!(owner.id, id);

    store.delete(&user).await.unwrap();
    assert!(store.find_by_id(id).await.unwrap().is_none());
}

#[tokio::test]
async fn projections_agree_after_create_and_update() {
    let (_, store) = memory_store();
    let mut user = User::new("bob").password_hash("h1").security_stamp("s1");
    store.create(&user).await.unwrap();

    let by_id = store.find_by_id(user.id).await.unwrap().unwrap();
    let by_name = store.find_by_name("bob").await.unwrap().unwrap();
    assert_eq!(by_id, by_name);
    assert!(by_id.same_persisted_fields(&user));

    user.password_hash = Some("h2".into());
    user.security_stamp = None;
    store.update(&user).await.unwrap();

    let by_id = store.find_by_id(user.id).await.unwrap().unwrap();
    let by_name = store.find_by_name("bob").await.unwrap().unwrap();
    assert_eq!(by_id, by_name);
    assert!(by_id.same_persisted_fields(&user));
}

#[tokio::test]
async fn delete_clears_both_projections() {
    let (session, store) = memory_store();
    let user = User::new("carol").password_hash("h1");
    store.create(&user).await.unwrap();

    store.delete(&user).await.unwrap();

    assert!(store.find_by_id(user.id).await.unwrap().is_none());
    assert!(store.find_by_name("carol").await.unwrap().is_none());
    assert!(session.rows("users").is_empty());
    assert!(session.rows("users_by_username").is_empty());
}

#[tokio::test]
async fn rename_leaves_old_alternate_row_stale() {
    let (_, store) = memory_store();
    let mut user = User::new("dave").password_hash("h1");
    store.create(&user).await.unwrap();

    user.username = "david".into();
    user.password_hash = Some("h2".into());
    store.update(&user).await.unwrap();

    // The by-id row has the new hash but still the original username.
    let by_id = store.find_by_id(user.id).await.unwrap().unwrap();
    assert_eq!(by_id.username, "dave");
    assert_eq!(by_id.password_hash.as_deref(), Some("h2"));

    // The old alternate row was never touched.
    let stale = store.find_by_name("dave").await.unwrap().unwrap();
    assert_eq!(stale.password_hash.as_deref(), Some("h1"));

    // The update upserted a partial row under the new name.
    let err = store.find_by_name("david").await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidData { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_settle_per_projection() {
    let (_, store) = memory_store();
    let store = Arc::new(store);
    let user = User::new("erin").password_hash("h0");
    store.create(&user).await.unwrap();

    let mut written = HashSet::new();
    let mut handles = Vec::new();
    for i in 0..8 {
        let hash = format!("h{}", i + 1);
        written.insert(hash.clone());
        let store = Arc::clone(&store);
        let user = user.clone().password_hash(hash);
        handles.push(tokio::spawn(async move { store.update(&user).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let by_id = store.find_by_id(user.id).await.unwrap().unwrap();
    let by_name = store.find_by_name("erin").await.unwrap().unwrap();
    assert!(written.contains(by_id.password_hash.as_deref().unwrap()));
    assert!(written.contains(by_name.password_hash.as_deref().unwrap()));
}

// ═══════════════════════════════════════════════════════════════════════
//  Logins
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn login_add_and_remove_are_symmetric() {
    let (session, store) = memory_store();
    let user = User::new("frank");
    store.create(&user).await.unwrap();

    let github = UserLoginInfo::new("github", "gh-1");
    store.add_login(&user, &github).await.unwrap();
    assert_eq!(store.get_logins(&user).await.unwrap(), vec![github.clone()]);
    assert_eq!(
        store.find_user_by_login(&github).await.unwrap().map(|u| u.id),
        Some(user.id)
    );

    store.remove_login(&user, &github).await.unwrap();
    assert!(store.get_logins(&user).await.unwrap().is_empty());
    assert!(store.find_user_by_login(&github).await.unwrap().is_none());
    assert!(session.rows("logins").is_empty());
    assert!(session.rows("logins_by_provider").is_empty());
}

#[tokio::test]
async fn logins_are_isolated_per_user() {
    let (_, store) = memory_store();
    let gina = User::new("gina");
    let hank = User::new("hank");
    store.create(&gina).await.unwrap();
    store.create(&hank).await.unwrap();

    store
        .add_login(&gina, &UserLoginInfo::new("google", "g-gina"))
        .await
        .unwrap();
    store
        .add_login(&hank, &UserLoginInfo::new("google", "g-hank"))
        .await
        .unwrap();

    let logins = store.get_logins(&gina).await.unwrap();
    assert_eq!(logins, vec![UserLoginInfo::new("google", "g-gina")]);

    let owner = store
        .find_user_by_login(&UserLoginInfo::new("google", "g-hank"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(owner.username, "hank");
}

// ═══════════════════════════════════════════════════════════════════════
//  Claims
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn claims_accumulate_as_a_set() {
    let (_, store) = memory_store();
    let user = User::new("ivy");
    let claims = [
        Claim::new("role", "admin"),
        Claim::new("role", "editor"),
        Claim::new("dept", "eng"),
        Claim::new("role", "admin"),
    ];
    for claim in &claims {
        store.add_claim(&user, claim).await.unwrap();
    }

    let stored: HashSet<(String, String)> = store
        .get_claims(&user)
        .await
        .unwrap()
        .into_iter()
        .map(|c| (c.claim_type, c.value))
        .collect();
    let expected: HashSet<(String, String)> = claims
        .iter()
        .map(|c| (c.claim_type.clone(), c.value.clone()))
        .collect();
    assert_eq!(stored, expected);

    store
        .remove_claim(&user, &Claim::new("role", "editor"))
        .await
        .unwrap();
    assert_eq!(store.get_claims(&user).await.unwrap().len(), 2);
}

#[tokio::test]
async fn claims_survive_user_delete() {
    let (_, store) = memory_store();
    let user = User::new("jack");
    store.create(&user).await.unwrap();
    store
        .add_claim(&user, &Claim::new("role", "admin"))
        .await
        .unwrap();

    store.delete(&user).await.unwrap();
    assert_eq!(store.get_claims(&user).await.unwrap().len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════
//  Argument validation
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn invalid_arguments_fail_without_io() {
    let (session, store) = memory_store();
    let nil = User::with_id(Uuid::nil(), "nil");
    let blank = User::new("   ");
    let valid = User::new("kate");

    let errors = vec![
        store.create(&nil).await.unwrap_err(),
        store.create(&blank).await.unwrap_err(),
        store.update(&blank).await.unwrap_err(),
        store.delete(&nil).await.unwrap_err(),
        store.find_by_id(Uuid::nil()).await.unwrap_err(),
        store.find_by_name("").await.unwrap_err(),
        store
            .add_login(&valid, &UserLoginInfo::new("google", ""))
            .await
            .unwrap_err(),
        store
            .remove_login(&nil, &UserLoginInfo::new("google", "k"))
            .await
            .unwrap_err(),
        store.get_logins(&nil).await.unwrap_err(),
        store
            .find_user_by_login(&UserLoginInfo::new("", "k"))
            .await
            .unwrap_err(),
        store.get_claims(&nil).await.unwrap_err(),
        store
            .add_claim(&valid, &Claim::new("", "v"))
            .await
            .unwrap_err(),
        store
            .remove_claim(&nil, &Claim::new("role", "admin"))
            .await
            .unwrap_err(),
    ];

    assert!(errors.iter().all(StoreError::is_invalid_argument));
    assert_eq!(session.stats().total(), 0);
    assert_eq!(store.statements().stats().preparations(), 0);
}

// ═══════════════════════════════════════════════════════════════════════
//  Duplicate rows
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn duplicate_rows_take_first_by_default() {
    init_tracing();
    let first = Uuid::now_v7();
    let session = Arc::new(ScriptedSession::returning(vec![
        user_row(first, "lee", "h1"),
        user_row(Uuid::now_v7(), "lee", "h2"),
    ]));
    let store = CassandraUserStore::new(session.clone());

    let found = store.find_by_name("lee").await.unwrap().unwrap();
    assert_eq!(found.id, first);
    assert_eq!(found.password_hash.as_deref(), Some("h1"));
}

#[tokio::test]
async fn duplicate_rows_rejected_when_configured() {
    init_tracing();
    let session = Arc::new(ScriptedSession::returning(vec![
        user_row(Uuid::now_v7(), "lee", "h1"),
        user_row(Uuid::now_v7(), "lee", "h2"),
    ]));
    let config = StoreConfig {
        duplicate_rows: DuplicateRowPolicy::RejectAmbiguous,
        ..StoreConfig::default()
    };
    let store = CassandraUserStore::with_config(session.clone(), config).unwrap();

    let err = store.find_by_name("lee").await.unwrap_err();
    match err {
        StoreError::AmbiguousRows { table, count } => {
            assert_eq!(table, "users_by_username");
            assert_eq!(count, 2);
        }
        other => panic!("expected AmbiguousRows, got {other:?}"),
    }
}

#[tokio::test]
async fn row_without_username_is_invalid_data() {
    init_tracing();
    let session = Arc::new(ScriptedSession::returning(vec![Row::from_columns([(
        "userid",
        Value::from(Uuid::now_v7()),
    )])]));
    let store = CassandraUserStore::new(session.clone());

    let err = store.find_by_id(Uuid::now_v7()).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidData { .. }));
}

// ═══════════════════════════════════════════════════════════════════════
//  Failures and lifecycle
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn backend_failure_is_propagated_unchanged() {
    init_tracing();
    let session = Arc::new(ScriptedSession::failing_writes(SessionError::Unavailable(
        "replica down".into(),
    )));
    let store = CassandraUserStore::new(session.clone());
    let user = User::new("mia");

    let err = store.create(&user).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Session(SessionError::Unavailable(ref msg)) if msg == "replica down"
    ));

    let err = store
        .add_claim(&user, &Claim::new("role", "admin"))
        .await
        .unwrap_err();
    assert!(err.is_session());

    // Two prepares per pair plus one per single, and one call each to run.
    assert_eq!(session.calls(), 2 + 1 + 1 + 1);
}

#[tokio::test]
async fn prepare_failure_is_retried_on_next_call() {
    let (session, store) = memory_store();
    session.fail_next_prepares(1);
    let user = User::new("nina");

    assert!(store.create(&user).await.unwrap_err().is_session());
    store.create(&user).await.unwrap();

    assert!(store.find_by_name("nina").await.unwrap().is_some());
    assert_eq!(store.statements().stats().failures(), 1);
}

#[tokio::test]
async fn warm_up_then_operations_skip_preparation() {
    let (session, store) = memory_store();
    store.statements().warm_up().await.unwrap();
    let prepared = session.stats().prepare_calls;

    let user = User::new("omar");
    store.create(&user).await.unwrap();
    store.find_by_id(user.id).await.unwrap();
    store.get_claims(&user).await.unwrap();

    assert_eq!(session.stats().prepare_calls, prepared);
}

#[tokio::test]
async fn closed_store_rejects_everything() {
    let (session, store) = memory_store();
    let user = User::new("pia");
    store.create(&user).await.unwrap();

    store.close().await.unwrap();
    assert!(store.is_closed());
    assert!(session.is_closed());
    let before = session.stats().total();

    assert!(matches!(store.create(&user).await, Err(StoreError::Closed)));
    assert!(matches!(store.find_by_id(user.id).await, Err(StoreError::Closed)));
    assert!(matches!(store.get_logins(&user).await, Err(StoreError::Closed)));
    assert!(matches!(store.get_claims(&user).await, Err(StoreError::Closed)));
    assert_eq!(session.stats().total(), before);
}

#[tokio::test]
async fn config_file_drives_table_names() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cassident.toml");
    std::fs::write(
        &path,
        r#"
keyspace = "identity"
batch_kind = "unlogged"

[tables]
claims = "user_claims"
"#,
    )
    .unwrap();

    let config = StoreConfig::load(&path).unwrap();
    let session = Arc::new(MemorySession::for_config(&config));
    let store = CassandraUserStore::with_config(session.clone(), config).unwrap();

    let user = User::new("quinn");
    store.create(&user).await.unwrap();
    store
        .add_claim(&user, &Claim::new("role", "admin"))
        .await
        .unwrap();

    assert_eq!(session.rows("identity.users").len(), 1);
    assert_eq!(session.rows("identity.user_claims").len(), 1);
}
