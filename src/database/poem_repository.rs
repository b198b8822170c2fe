//! Content items synced from the third-party feed.

use crate::database::error::DatabaseError;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct PoemRecord {
    pub id: i64,
    pub external_id: String,
    pub author: Option<String>,
    pub title: Option<String>,
    pub content: String,
    pub views: i32,
    pub likes: i32,
    pub dislikes: i32,
    pub created_at: DateTime<Utc>,
}

/// Fields written by the sync job; keyed by `external_id`.
#[derive(Debug, Clone)]
pub struct PoemUpsert {
    pub external_id: String,
    pub author: Option<String>,
    pub title: Option<String>,
    pub content: String,
    pub likes: i32,
    pub dislikes: i32,
}

pub struct PoemRepository {
    pool: PgPool,
}

impl PoemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a poem or refresh its mutable fields. Returns true when a new
    /// row was created.
    pub async fn upsert(&self, poem: &PoemUpsert) -> Result<bool, DatabaseError> {
        let row: (bool,) = sqlx::query_as(
            "INSERT INTO poems (external_id, author, title, content, likes, dislikes) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (external_id) DO UPDATE \
             SET author = EXCLUDED.author, title = EXCLUDED.title, \
                 content = EXCLUDED.content, likes = EXCLUDED.likes, \
                 dislikes = EXCLUDED.dislikes \
             RETURNING (xmax = 0)",
        )
        .bind(&poem.external_id)
        .bind(&poem.author)
        .bind(&poem.title)
        .bind(&poem.content)
        .bind(poem.likes)
        .bind(poem.dislikes)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.0)
    }

    pub async fn count(&self) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM poems")
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(row.0)
    }

    /// Page through poems in insertion order, for the bot's reading flow.
    pub async fn list_page(&self, limit: i64, offset: i64) -> Result<Vec<PoemRecord>, DatabaseError> {
        sqlx::query_as::<_, PoemRecord>(
            "SELECT id, external_id, author, title, content, views, likes, dislikes, created_at \
             FROM poems ORDER BY id ASC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
