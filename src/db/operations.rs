use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::warn;

use crate::db::models::{Account, LoginEvent, LoginOrigin, RefreshSession, Role};
use crate::error::AppError;

/// Column lists shared across queries to avoid repetition.
const ACCOUNT_COLUMNS: &str = "id, username, email, password_hash, role, is_active, created_at";
const SESSION_COLUMNS: &str = "id, account_id, token_hash, expires_at, revoked_at, created_at";
const EVENT_COLUMNS: &str = "id, account_id, success, ip_address, user_agent, created_at";

/// Data access layer over the shared store handle.
///
/// Every multi-row write goes through an explicit transaction so the
/// uniqueness and single-live-session invariants hold under concurrent
/// requests.
#[derive(Clone)]
pub struct DbOperations {
    pool: Arc<SqlitePool>,
}

impl DbOperations {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    pub async fn begin_transaction(&self) -> Result<Transaction<'_, Sqlite>, AppError> {
        Ok(self.pool.as_ref().begin().await?)
    }

    // -- accounts ---------------------------------------------------------

    /// Insert a new account. A username or email collision surfaces as
    /// `AppError::DuplicateIdentity` via the unique constraints.
    pub async fn create_account(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Account, AppError> {
        let query = format!(
            "INSERT INTO accounts (username, email, password_hash, role, is_active, created_at)
             VALUES (?, ?, ?, ?, 1, ?)
             RETURNING {ACCOUNT_COLUMNS}"
        );
        let account = sqlx::query_as::<_, Account>(&query)
            .bind(username)
            .bind(email)
            .bind(password_hash)
            .bind(Role::User)
            .bind(Utc::now())
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(account)
    }

    pub async fn find_account_by_id(&self, id: i64) -> Result<Option<Account>, AppError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?");
        let account = sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(account)
    }

    pub async fn find_account_by_id_with_transaction(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: i64,
    ) -> Result<Option<Account>, AppError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?");
        let account = sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(account)
    }

    /// Look up an account by username or email in one shot.
    pub async fn find_account_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Account>, AppError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = ? OR email = ?");
        let account = sqlx::query_as::<_, Account>(&query)
            .bind(identifier)
            .bind(identifier)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(account)
    }

    pub async fn identifier_taken(&self, username: &str, email: &str) -> Result<bool, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM accounts WHERE username = ? OR email = ?",
        )
        .bind(username)
        .bind(email)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count > 0)
    }

    /// Flip the active flag off and revoke the account's live sessions as
    /// one unit. Returns `false` if the account does not exist.
    pub async fn deactivate_account(&self, id: i64) -> Result<bool, AppError> {
        let now = Utc::now();
        let mut tx = self.begin_transaction().await?;

        let result = sqlx::query("UPDATE accounts SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE refresh_sessions SET revoked_at = ? WHERE account_id = ? AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    // -- refresh sessions -------------------------------------------------

    /// Persist a freshly issued session together with its audit row, as
    /// one atomic unit. An audit append failure is logged and swallowed;
    /// it must not fail the login that triggered it.
    pub async fn create_login_session(
        &self,
        account_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        origin: &LoginOrigin,
    ) -> Result<RefreshSession, AppError> {
        let mut tx = self.begin_transaction().await?;

        let session = self
            .insert_session_with_transaction(&mut tx, account_id, token_hash, expires_at)
            .await?;

        if let Err(e) = self
            .append_login_event_with_transaction(&mut tx, account_id, true, origin)
            .await
        {
            warn!(account_id, "failed to record login event: {}", e);
        }

        tx.commit().await?;
        Ok(session)
    }

    pub async fn insert_session_with_transaction(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        account_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshSession, AppError> {
        let query = format!(
            "INSERT INTO refresh_sessions (account_id, token_hash, expires_at, revoked_at, created_at)
             VALUES (?, ?, ?, NULL, ?)
             RETURNING {SESSION_COLUMNS}"
        );
        let session = sqlx::query_as::<_, RefreshSession>(&query)
            .bind(account_id)
            .bind(token_hash)
            .bind(expires_at)
            .bind(Utc::now())
            .fetch_one(&mut **tx)
            .await?;

        Ok(session)
    }

    /// Conditionally revoke the live session matching `token_hash` and
    /// return the revoked row. `None` means no live row matched: the
    /// token was never issued, was already rotated or revoked, or lost a
    /// concurrent replay race. The single conditional UPDATE is what
    /// guarantees exactly one winner under interleaving.
    pub async fn revoke_live_session_with_transaction(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, AppError> {
        let query = format!(
            "UPDATE refresh_sessions SET revoked_at = ?
             WHERE token_hash = ? AND revoked_at IS NULL
             RETURNING {SESSION_COLUMNS}"
        );
        let session = sqlx::query_as::<_, RefreshSession>(&query)
            .bind(now)
            .bind(token_hash)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(session)
    }

    /// Revoke the live session matching `token_hash`, if any. Returns
    /// whether a row was revoked; callers that need idempotency (logout)
    /// ignore the result.
    pub async fn revoke_session(&self, token_hash: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE refresh_sessions SET revoked_at = ? WHERE token_hash = ? AND revoked_at IS NULL",
        )
        .bind(Utc::now())
        .bind(token_hash)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // -- audit log --------------------------------------------------------

    pub async fn record_login_event(
        &self,
        account_id: i64,
        success: bool,
        origin: &LoginOrigin,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO login_events (account_id, success, ip_address, user_agent, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(account_id)
        .bind(success)
        .bind(&origin.ip_address)
        .bind(&origin.user_agent)
        .bind(Utc::now())
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    pub async fn append_login_event_with_transaction(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        account_id: i64,
        success: bool,
        origin: &LoginOrigin,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO login_events (account_id, success, ip_address, user_agent, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(account_id)
        .bind(success)
        .bind(&origin.ip_address)
        .bind(&origin.user_agent)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    pub async fn login_history(
        &self,
        account_id: i64,
        limit: i64,
    ) -> Result<Vec<LoginEvent>, AppError> {
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM login_events WHERE account_id = ? ORDER BY id DESC LIMIT ?"
        );
        let events = sqlx::query_as::<_, LoginEvent>(&query)
            .bind(account_id)
            .bind(limit)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> DbOperations {
        // A single connection so the in-memory database is shared.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to open in-memory database");
        sqlx::migrate!().run(&pool).await.expect("Failed to migrate");
        DbOperations::new(Arc::new(pool))
    }

    fn origin() -> LoginOrigin {
        LoginOrigin {
            ip_address: "127.0.0.1".to_string(),
            user_agent: "test-agent".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_find_account() {
        let db = setup().await;
        let account = db
            .create_account("alice", "alice@example.com", "$argon2id$stub")
            .await
            .unwrap();
        assert_eq!(account.role, Role::User);
        assert!(account.is_active);

        let by_name = db.find_account_by_identifier("alice").await.unwrap().unwrap();
        let by_email = db
            .find_account_by_identifier("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_name.id, account.id);
        assert_eq!(by_email.id, account.id);

        assert!(db.identifier_taken("alice", "other@example.com").await.unwrap());
        assert!(!db.identifier_taken("bob", "bob@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_account_rejected_by_constraint() {
        let db = setup().await;
        db.create_account("alice", "alice@example.com", "h").await.unwrap();

        let err = db
            .create_account("alice", "second@example.com", "h")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateIdentity));

        let err = db
            .create_account("alice2", "alice@example.com", "h")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateIdentity));
    }

    #[tokio::test]
    async fn test_conditional_revoke_is_one_shot() {
        let db = setup().await;
        let account = db.create_account("alice", "alice@example.com", "h").await.unwrap();
        let expires = Utc::now() + chrono::Duration::days(7);
        db.create_login_session(account.id, "digest-1", expires, &origin())
            .await
            .unwrap();

        let now = Utc::now();
        let mut tx = db.begin_transaction().await.unwrap();
        let first = db
            .revoke_live_session_with_transaction(&mut tx, "digest-1", now)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert!(first.is_some());
        assert!(first.unwrap().revoked_at.is_some());

        let mut tx = db.begin_transaction().await.unwrap();
        let second = db
            .revoke_live_session_with_transaction(&mut tx, "digest-1", now)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_deactivate_account_revokes_sessions() {
        let db = setup().await;
        let account = db.create_account("alice", "alice@example.com", "h").await.unwrap();
        let expires = Utc::now() + chrono::Duration::days(7);
        db.create_login_session(account.id, "digest-1", expires, &origin())
            .await
            .unwrap();

        assert!(db.deactivate_account(account.id).await.unwrap());

        let found = db.find_account_by_id(account.id).await.unwrap().unwrap();
        assert!(!found.is_active);

        // The session was revoked by the deactivation sweep.
        let mut tx = db.begin_transaction().await.unwrap();
        let live = db
            .revoke_live_session_with_transaction(&mut tx, "digest-1", Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert!(live.is_none());
    }

    #[tokio::test]
    async fn test_login_event_recorded_with_session() {
        let db = setup().await;
        let account = db.create_account("alice", "alice@example.com", "h").await.unwrap();
        let expires = Utc::now() + chrono::Duration::days(7);
        db.create_login_session(account.id, "digest-1", expires, &origin())
            .await
            .unwrap();

        let events = db.login_history(account.id, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].success);
        assert_eq!(events[0].ip_address, "127.0.0.1");
        assert_eq!(events[0].user_agent, "test-agent");
    }
}
