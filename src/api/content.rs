//! Paginated content listing for the bot's reading flow.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::database::poem_repository::{PoemRecord, PoemRepository};
use crate::error::AppError;
use crate::middleware::error::with_request_id;

pub struct ContentState {
    pub poems: Arc<PoemRepository>,
}

#[derive(Debug, Deserialize)]
pub struct ContentQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ContentPage {
    pub items: Vec<PoemRecord>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

/// GET /api/content?page=1&per_page=10
pub async fn list_content(
    State(state): State<Arc<ContentState>>,
    headers: HeaderMap,
    Query(query): Query<ContentQuery>,
) -> Result<Json<ContentPage>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(10).clamp(1, 100);
    let offset = (page - 1) * per_page;

    let items = state
        .poems
        .list_page(per_page, offset)
        .await
        .map_err(|e| with_request_id(e.into(), &headers))?;
    let total = state
        .poems
        .count()
        .await
        .map_err(|e| with_request_id(e.into(), &headers))?;

    Ok(Json(ContentPage {
        items,
        page,
        per_page,
        total,
    }))
}
