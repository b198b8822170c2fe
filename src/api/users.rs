//! User state queries consumed by the bot flow.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::database::user_repository::UserRepository;
use crate::error::{AppError, AppErrorKind};
use crate::middleware::error::with_request_id;

pub struct UsersState {
    pub users: Arc<UserRepository>,
}

#[derive(Debug, Serialize)]
pub struct EntitlementStatus {
    pub telegram_id: i64,
    pub has_paid: bool,
    pub revoked_at: Option<chrono::DateTime<chrono::Utc>>,
    pub viewed_items: i32,
}

/// GET /api/users/{telegram_id}/entitlement
pub async fn get_entitlement(
    State(state): State<Arc<UsersState>>,
    headers: HeaderMap,
    Path(telegram_id): Path<i64>,
) -> Result<Json<EntitlementStatus>, AppError> {
    let user = state
        .users
        .find_by_telegram_id(telegram_id)
        .await
        .map_err(|e| with_request_id(e.into(), &headers))?
        .ok_or_else(|| {
            with_request_id(
                AppError::new(AppErrorKind::UserNotFound { telegram_id }),
                &headers,
            )
        })?;

    Ok(Json(EntitlementStatus {
        telegram_id: user.telegram_id,
        has_paid: user.has_paid,
        revoked_at: user.revoked_at,
        viewed_items: user.viewed_items,
    }))
}

/// POST /api/users/{telegram_id}/viewed: bump the reading counter.
pub async fn increment_viewed(
    State(state): State<Arc<UsersState>>,
    headers: HeaderMap,
    Path(telegram_id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .users
        .increment_viewed_items(telegram_id)
        .await
        .map_err(|e| with_request_id(e.into(), &headers))?;

    Ok(Json(serde_json::json!({ "ok": true })))
}
