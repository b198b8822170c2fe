//! Users and their entitlement state.

use crate::database::error::DatabaseError;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

/// User entity. `has_paid` is the entitlement flag; `revoked_at` is stamped
/// by an admin revocation and cleared by the next successful payment.
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub has_paid: bool,
    pub viewed_items: i32,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct UserProfile {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

const USER_COLUMNS: &str = "id, telegram_id, username, first_name, last_name, has_paid, \
                            viewed_items, revoked_at, created_at, updated_at";

pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a user by telegram id, creating the row if missing. Profile
    /// fields only overwrite when the new value is present.
    pub async fn find_or_create(
        &self,
        telegram_id: i64,
        profile: UserProfile,
    ) -> Result<UserRecord, DatabaseError> {
        sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (telegram_id, username, first_name, last_name) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (telegram_id) DO UPDATE \
             SET username = COALESCE(EXCLUDED.username, users.username), \
                 first_name = COALESCE(EXCLUDED.first_name, users.first_name), \
                 last_name = COALESCE(EXCLUDED.last_name, users.last_name), \
                 updated_at = NOW() \
             RETURNING id, telegram_id, username, first_name, last_name, has_paid, \
                       viewed_items, revoked_at, created_at, updated_at",
        )
        .bind(telegram_id)
        .bind(profile.username)
        .bind(profile.first_name)
        .bind(profile.last_name)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_telegram_id(
        &self,
        telegram_id: i64,
    ) -> Result<Option<UserRecord>, DatabaseError> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE telegram_id = $1",
            USER_COLUMNS
        ))
        .bind(telegram_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Grant entitlement: `has_paid` and `revoked_at` change in one UPDATE so
    /// the flag can never coexist with a stale revocation marker.
    pub async fn grant_entitlement(&self, telegram_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE users SET has_paid = TRUE, revoked_at = NULL, updated_at = NOW() \
             WHERE telegram_id = $1",
        )
        .bind(telegram_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    /// Revoke entitlement and stamp the revocation time.
    pub async fn revoke_entitlement(&self, telegram_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE users SET has_paid = FALSE, revoked_at = NOW(), updated_at = NOW() \
             WHERE telegram_id = $1",
        )
        .bind(telegram_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn has_paid(&self, telegram_id: i64) -> Result<bool, DatabaseError> {
        let user = self.find_by_telegram_id(telegram_id).await?;
        Ok(user.map(|u| u.has_paid).unwrap_or(false))
    }

    pub async fn increment_viewed_items(&self, telegram_id: i64) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE users SET viewed_items = viewed_items + 1, updated_at = NOW() \
             WHERE telegram_id = $1",
        )
        .bind(telegram_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }
}
