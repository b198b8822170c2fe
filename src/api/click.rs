//! Click webhook endpoints.
//!
//! Per the gateway convention these always answer HTTP 200; the outcome
//! travels in the `error` field of the JSON body. The body is parsed by hand
//! so even a malformed payload gets an in-band error instead of a framework
//! rejection status.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::{error, info};

use crate::click::types::{ClickErrorCode, CompleteRequest, PrepareRequest};
use crate::services::click_processor::ClickProcessor;

pub struct ClickState {
    pub processor: Arc<ClickProcessor>,
}

/// POST /click/prepare
pub async fn handle_prepare(
    State(state): State<Arc<ClickState>>,
    body: String,
) -> impl IntoResponse {
    let request: PrepareRequest = match serde_json::from_str(&body) {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "invalid prepare payload");
            return (StatusCode::OK, Json(malformed_response()));
        }
    };

    info!(
        click_trans_id = request.click_trans_id,
        merchant_trans_id = %request.merchant_trans_id,
        "received prepare request"
    );

    let response = state.processor.prepare(&request).await;
    (StatusCode::OK, Json(serde_json::json!(response)))
}

/// POST /click/complete
pub async fn handle_complete(
    State(state): State<Arc<ClickState>>,
    body: String,
) -> impl IntoResponse {
    let request: CompleteRequest = match serde_json::from_str(&body) {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "invalid complete payload");
            return (StatusCode::OK, Json(malformed_response()));
        }
    };

    info!(
        click_trans_id = request.click_trans_id,
        merchant_trans_id = %request.merchant_trans_id,
        merchant_prepare_id = request.merchant_prepare_id,
        gateway_error = request.error,
        "received complete request"
    );

    let response = state.processor.complete(&request).await;
    (StatusCode::OK, Json(serde_json::json!(response)))
}

/// Unparseable request: no fields to echo or sign, only the error code.
fn malformed_response() -> serde_json::Value {
    let code = ClickErrorCode::UnknownError;
    serde_json::json!({
        "error": code.code(),
        "error_note": code.note(),
    })
}
