//! Admin surface: manual entitlement grant/revoke and a content-sync trigger.
//!
//! Guarded by a shared key in the `x-admin-key` header. When no key is
//! configured the endpoints refuse every request rather than opening up.

use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::config::AdminConfig;
use crate::error::{AppError, AppErrorKind};
use crate::middleware::error::with_request_id;
use crate::services::content_sync::ContentSyncService;
use crate::services::entitlement::EntitlementUpdater;

pub struct AdminState {
    pub entitlement: Arc<EntitlementUpdater>,
    pub content_sync: Arc<ContentSyncService>,
    pub config: AdminConfig,
}

#[derive(Debug, Deserialize)]
pub struct EntitlementRequest {
    pub telegram_id: i64,
}

#[derive(Debug, Serialize)]
pub struct EntitlementResponse {
    pub telegram_id: i64,
    pub has_paid: bool,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub pages: u32,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

fn authorize(state: &AdminState, headers: &HeaderMap) -> Result<(), AppError> {
    let provided = headers
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    match state.config.api_key.as_deref() {
        Some(expected) if crate::click::signature::secure_eq(expected.as_bytes(), provided.as_bytes()) => {
            Ok(())
        }
        _ => Err(AppError::new(AppErrorKind::Unauthorized)),
    }
}

/// POST /api/admin/entitlements/grant
pub async fn grant_entitlement(
    State(state): State<Arc<AdminState>>,
    headers: HeaderMap,
    Json(payload): Json<EntitlementRequest>,
) -> Result<Json<EntitlementResponse>, AppError> {
    authorize(&state, &headers).map_err(|e| with_request_id(e, &headers))?;

    let found = state
        .entitlement
        .grant(payload.telegram_id)
        .await
        .map_err(|e| with_request_id(e.into(), &headers))?;

    if !found {
        return Err(with_request_id(
            AppError::new(AppErrorKind::UserNotFound {
                telegram_id: payload.telegram_id,
            }),
            &headers,
        ));
    }

    info!(telegram_id = payload.telegram_id, "admin granted entitlement");
    Ok(Json(EntitlementResponse {
        telegram_id: payload.telegram_id,
        has_paid: true,
    }))
}

/// POST /api/admin/entitlements/revoke
pub async fn revoke_entitlement(
    State(state): State<Arc<AdminState>>,
    headers: HeaderMap,
    Json(payload): Json<EntitlementRequest>,
) -> Result<Json<EntitlementResponse>, AppError> {
    authorize(&state, &headers).map_err(|e| with_request_id(e, &headers))?;

    let found = state
        .entitlement
        .revoke(payload.telegram_id)
        .await
        .map_err(|e| with_request_id(e.into(), &headers))?;

    if !found {
        return Err(with_request_id(
            AppError::new(AppErrorKind::UserNotFound {
                telegram_id: payload.telegram_id,
            }),
            &headers,
        ));
    }

    info!(telegram_id = payload.telegram_id, "admin revoked entitlement");
    Ok(Json(EntitlementResponse {
        telegram_id: payload.telegram_id,
        has_paid: false,
    }))
}

/// POST /api/admin/content/sync: run one sync pass now.
pub async fn trigger_content_sync(
    State(state): State<Arc<AdminState>>,
    headers: HeaderMap,
) -> Result<Json<SyncResponse>, AppError> {
    authorize(&state, &headers).map_err(|e| with_request_id(e, &headers))?;

    let report = state
        .content_sync
        .sync_all()
        .await
        .map_err(|e| with_request_id(e.into(), &headers))?;

    Ok(Json(SyncResponse {
        pages: report.pages,
        fetched: report.fetched,
        inserted: report.inserted,
        updated: report.updated,
        skipped: report.skipped,
    }))
}
