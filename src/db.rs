use std::time::Duration;

use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use time::OffsetDateTime;

/// A chat message as persisted by the store. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: i64,
    pub room_id: String,
    pub sender: String,
    pub content: String,
    /// unix millis, assigned on persist
    pub created_at: i64,
}

type MessageRow = (i64, String, String, String, i64);

impl From<MessageRow> for StoredMessage {
    fn from((id, room_id, sender, content, created_at): MessageRow) -> Self {
        Self { id, room_id, sender, content, created_at }
    }
}

/// Durable message store: opaque append plus recent-range query per room.
#[derive(Clone, Debug)]
pub struct MessageStore {
    pool: SqlitePool,
}

pub fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

impl MessageStore {
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect(url)
            .await?;

        Self::from_pool(pool).await
    }

    /// Single-connection in-memory database. The connection is pinned so the
    /// data lives as long as the store.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect("sqlite::memory:")
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id TEXT NOT NULL,
                sender TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS messages_room_created ON messages (room_id, created_at)")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    pub async fn persist(&self, room_id: &str, sender: &str, content: &str) -> Result<StoredMessage, sqlx::Error> {
        let created_at = now_ms();
        let id = sqlx::query("INSERT INTO messages (room_id,sender,content,created_at) VALUES (?,?,?,?)")
            .bind(room_id)
            .bind(sender)
            .bind(content)
            .bind(created_at)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        Ok(StoredMessage {
            id,
            room_id: room_id.to_owned(),
            sender: sender.to_owned(),
            content: content.to_owned(),
            created_at,
        })
    }

    /// Up to `limit` newest messages created at or before `until_ms`,
    /// returned oldest first.
    pub async fn recent(&self, room_id: &str, limit: u32, until_ms: i64) -> Result<Vec<StoredMessage>, sqlx::Error> {
        let mut rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id,room_id,sender,content,created_at FROM messages
             WHERE room_id=? AND created_at<=?
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )
        .bind(room_id)
        .bind(until_ms)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.reverse();
        Ok(rows.into_iter().map(StoredMessage::from).collect())
    }

    pub async fn count(&self, room_id: &str) -> Result<i64, sqlx::Error> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE room_id=?")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
