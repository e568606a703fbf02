use crate::db::models::{DbConversation, DbResult, DbUser};
use crate::db::schema::SQLITE_INIT;
use crate::error::NexusError;
use crate::types::ChatMessage;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use tracing::info;

pub type SqlitePool = Pool<Sqlite>;

/// Users, their results and their saved conversations.
///
/// Every method borrows a pooled connection for the duration of one statement
/// (or one transaction) and returns it on every exit path.
#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, NexusError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(connect_opts).await?;
        info!(database_url = %database_url, "database pool opened");
        Ok(Self::new(pool))
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), NexusError> {
        // sqlx::query runs one statement at a time
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert a new user. Uniqueness is left to the table constraints.
    pub async fn create_user(
        &self,
        username: &str,
        email: Option<&str>,
        hashed_password: &str,
    ) -> Result<DbUser, NexusError> {
        let created_at = now();
        let res = sqlx::query(
            r#"INSERT INTO users (username, email, hashed_password, created_at)
               VALUES (?, ?, ?, ?)"#,
        )
        .bind(username)
        .bind(email)
        .bind(hashed_password)
        .bind(to_text(created_at))
        .execute(&self.pool)
        .await
        .map_err(NexusError::from_insert)?;

        Ok(DbUser {
            id: res.last_insert_rowid(),
            username: username.to_string(),
            email: email.map(str::to_string),
            hashed_password: hashed_password.to_string(),
            created_at,
        })
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<DbUser>, NexusError> {
        let row = sqlx::query(
            r#"SELECT id, username, email, hashed_password, created_at
               FROM users WHERE username = ?"#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_user).transpose()
    }

    pub async fn find_user_by_id(&self, id: i64) -> Result<Option<DbUser>, NexusError> {
        let row = sqlx::query(
            r#"SELECT id, username, email, hashed_password, created_at
               FROM users WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_user).transpose()
    }

    /// Remove a user together with its results and conversations.
    /// Returns whether a row was deleted.
    pub async fn delete_user(&self, id: i64) -> Result<bool, NexusError> {
        let res = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Append a result row; results are never updated afterwards.
    pub async fn create_result(
        &self,
        user_id: i64,
        category: &str,
        score: f64,
        meta: Option<&str>,
    ) -> Result<DbResult, NexusError> {
        let created_at = now();
        let res = sqlx::query(
            r#"INSERT INTO results (user_id, category, score, meta, created_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(user_id)
        .bind(category)
        .bind(score)
        .bind(meta)
        .bind(to_text(created_at))
        .execute(&self.pool)
        .await?;

        Ok(DbResult {
            id: res.last_insert_rowid(),
            user_id,
            category: category.to_string(),
            score,
            meta: meta.map(str::to_string),
            created_at,
        })
    }

    /// All results of one user, oldest first.
    pub async fn list_results(&self, user_id: i64) -> Result<Vec<DbResult>, NexusError> {
        let rows = sqlx::query(
            r#"SELECT id, user_id, category, score, meta, created_at
               FROM results WHERE user_id = ?
               ORDER BY created_at ASC, id ASC"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_result).collect()
    }

    pub async fn get_conversation(
        &self,
        user_id: i64,
        category: &str,
    ) -> Result<DbConversation, NexusError> {
        let row = sqlx::query(
            r#"SELECT id, user_id, category, messages, updated_at
               FROM conversations WHERE user_id = ? AND category = ?"#,
        )
        .bind(user_id)
        .bind(category)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            NexusError::NotFound("Conversation not found for this category.".to_string())
        })?;
        Self::row_to_conversation(row)
    }

    /// Upsert by unique (user_id, category), replacing the whole message list.
    /// Uses SQLite `INSERT ... ON CONFLICT(user_id, category) DO UPDATE`.
    pub async fn upsert_conversation(
        &self,
        user_id: i64,
        category: &str,
        messages: &[ChatMessage],
    ) -> Result<DbConversation, NexusError> {
        let messages_json = serde_json::to_string(messages)?;
        let updated_at = to_text(now());

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO conversations (user_id, category, messages, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id, category) DO UPDATE SET
                messages = excluded.messages,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(category)
        .bind(messages_json)
        .bind(updated_at)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            r#"SELECT id, user_id, category, messages, updated_at
               FROM conversations WHERE user_id = ? AND category = ?"#,
        )
        .bind(user_id)
        .bind(category)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Self::row_to_conversation(row)
    }

    fn row_to_user(row: SqliteRow) -> Result<DbUser, NexusError> {
        let created_at: String = row.try_get("created_at")?;
        Ok(DbUser {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            hashed_password: row.try_get("hashed_password")?,
            created_at: from_text(&created_at)?,
        })
    }

    fn row_to_result(row: SqliteRow) -> Result<DbResult, NexusError> {
        let created_at: String = row.try_get("created_at")?;
        Ok(DbResult {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            category: row.try_get("category")?,
            score: row.try_get("score")?,
            meta: row.try_get("meta")?,
            created_at: from_text(&created_at)?,
        })
    }

    fn row_to_conversation(row: SqliteRow) -> Result<DbConversation, NexusError> {
        let messages_json: String = row.try_get("messages")?;
        let updated_at: String = row.try_get("updated_at")?;
        let messages: Vec<ChatMessage> = serde_json::from_str(&messages_json)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(DbConversation {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            category: row.try_get("category")?,
            messages,
            updated_at: from_text(&updated_at)?,
        })
    }
}

/// Current time truncated to what the text column preserves.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn to_text(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn from_text(s: &str) -> Result<DateTime<Utc>, NexusError> {
    let ts = DateTime::parse_from_rfc3339(s).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    Ok(ts.with_timezone(&Utc))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static DB_SEQ: AtomicUsize = AtomicUsize::new(0);

    /// Fresh store on a throwaway SQLite file.
    pub(crate) async fn temp_store() -> UserStore {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before UNIX_EPOCH")
            .as_nanos();
        let mut path = std::env::temp_dir();
        path.push(format!(
            "aisuite-nexus-{}-{}-{}.sqlite",
            std::process::id(),
            nanos,
            DB_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let store = UserStore::connect(&format!("sqlite:{}", path.display()))
            .await
            .expect("open temp database");
        store.init_schema().await.expect("init schema");
        store
    }

    #[tokio::test]
    async fn create_and_find_user() {
        let store = temp_store().await;
        let user = store
            .create_user("alice", Some("alice@example.com"), "hash")
            .await
            .unwrap();
        assert!(user.id > 0);

        let found = store.find_user_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found, user);
        assert_eq!(store.find_user_by_id(user.id).await.unwrap(), Some(user));
        assert!(store.find_user_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let store = temp_store().await;
        store.create_user("alice", None, "h1").await.unwrap();
        let err = store.create_user("alice", None, "h2").await.unwrap_err();
        assert!(matches!(err, NexusError::DuplicateUsername), "got {err:?}");
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_but_missing_emails_are_not() {
        let store = temp_store().await;
        store.create_user("a", Some("x@example.com"), "h").await.unwrap();
        let err = store
            .create_user("b", Some("x@example.com"), "h")
            .await
            .unwrap_err();
        assert!(matches!(err, NexusError::DuplicateEmail), "got {err:?}");

        store.create_user("c", None, "h").await.unwrap();
        store.create_user("d", None, "h").await.unwrap();
    }

    #[tokio::test]
    async fn results_are_ordered_and_scoped_to_owner() {
        let store = temp_store().await;
        let alice = store.create_user("alice", None, "h").await.unwrap();
        let bob = store.create_user("bob", None, "h").await.unwrap();

        for score in [1.0, 2.0, 3.0] {
            store
                .create_result(alice.id, "dsa", score, None)
                .await
                .unwrap();
        }
        store
            .create_result(bob.id, "resume", 9.0, Some("{\"k\":1}"))
            .await
            .unwrap();

        let results = store.list_results(alice.id).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.user_id == alice.id));
        assert!(results.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        let scores: Vec<f64> = results.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![1.0, 2.0, 3.0]);

        let bobs = store.list_results(bob.id).await.unwrap();
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].meta.as_deref(), Some("{\"k\":1}"));
    }

    #[tokio::test]
    async fn upsert_keeps_one_conversation_per_category() {
        let store = temp_store().await;
        let user = store.create_user("alice", None, "h").await.unwrap();

        let first = vec![ChatMessage::new("user", "hi")];
        let second = vec![
            ChatMessage::new("user", "hi"),
            ChatMessage::new("assistant", "hello"),
            ChatMessage::new("user", "tell me more"),
        ];

        let created = store
            .upsert_conversation(user.id, "interview", &first)
            .await
            .unwrap();
        let updated = store
            .upsert_conversation(user.id, "interview", &second)
            .await
            .unwrap();

        assert_eq!(created.id, updated.id);
        assert!(updated.updated_at >= created.updated_at);
        let stored = store.get_conversation(user.id, "interview").await.unwrap();
        assert_eq!(stored.messages, second);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn missing_conversation_is_not_found() {
        let store = temp_store().await;
        let user = store.create_user("alice", None, "h").await.unwrap();
        let err = store.get_conversation(user.id, "nope").await.unwrap_err();
        assert!(matches!(err, NexusError::NotFound(_)));
    }

    #[tokio::test]
    async fn deleting_user_cascades() {
        let store = temp_store().await;
        let user = store.create_user("alice", None, "h").await.unwrap();
        store.create_result(user.id, "dsa", 1.0, None).await.unwrap();
        store
            .upsert_conversation(user.id, "interview", &[ChatMessage::new("user", "hi")])
            .await
            .unwrap();

        assert!(store.delete_user(user.id).await.unwrap());
        assert!(store.list_results(user.id).await.unwrap().is_empty());
        assert!(store.get_conversation(user.id, "interview").await.is_err());
        assert!(!store.delete_user(user.id).await.unwrap());
    }
}
