//! Payment-link endpoint consumed by the bot flow.

use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::click::link::build_payment_link;
use crate::config::ClickConfig;
use crate::database::payment_repository::{PaymentMetadata, TransactionLedger};
use crate::database::user_repository::{UserProfile, UserRepository};
use crate::error::AppError;
use crate::middleware::error::with_request_id;
use crate::services::session::{PaymentSession, SessionStore};

pub struct PaymentsState {
    pub ledger: Arc<dyn TransactionLedger>,
    pub users: Arc<UserRepository>,
    pub sessions: Arc<SessionStore>,
    pub click: ClickConfig,
}

#[derive(Debug, Deserialize)]
pub struct PaymentLinkRequest {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bot_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentLinkResponse {
    pub url: String,
    pub transaction_param: String,
    pub payment_id: i64,
}

/// POST /api/payments/link
///
/// Finds or creates the user, mints a PENDING ledger record at the fixed
/// price and returns the pay URL. A fresh session entry short-circuits the
/// whole thing, so repeated taps reuse one pending record.
pub async fn create_payment_link(
    State(state): State<Arc<PaymentsState>>,
    headers: HeaderMap,
    Json(payload): Json<PaymentLinkRequest>,
) -> Result<Json<PaymentLinkResponse>, AppError> {
    if payload.telegram_id <= 0 {
        return Err(with_request_id(
            AppError::validation("telegram_id", "must be a positive integer"),
            &headers,
        ));
    }

    if let Some(session) = state.sessions.get(payload.telegram_id).await {
        info!(
            telegram_id = payload.telegram_id,
            payment_id = session.payment_id,
            "reusing fresh payment link from session"
        );
        return Ok(Json(PaymentLinkResponse {
            url: session.url,
            transaction_param: session.transaction_param,
            payment_id: session.payment_id,
        }));
    }

    let user = state
        .users
        .find_or_create(
            payload.telegram_id,
            UserProfile {
                username: payload.username,
                first_name: payload.first_name,
                last_name: payload.last_name,
            },
        )
        .await
        .map_err(|e| with_request_id(e.into(), &headers))?;

    let metadata = PaymentMetadata {
        telegram_id: Some(payload.telegram_id),
        bot_key: payload.bot_key,
        source: Some("gateway".to_string()),
        ..Default::default()
    };

    let payment = state
        .ledger
        .create_pending(user.id, state.click.payment_amount.clone(), metadata)
        .await
        .map_err(|e| with_request_id(e.into(), &headers))?;

    let link = build_payment_link(&state.click, &payment.amount, &payment.merchant_trans_id);

    state
        .sessions
        .put(
            payload.telegram_id,
            PaymentSession {
                payment_id: payment.id,
                transaction_param: link.transaction_param.clone(),
                url: link.url.clone(),
            },
        )
        .await;

    info!(
        telegram_id = payload.telegram_id,
        payment_id = payment.id,
        merchant_trans_id = %payment.merchant_trans_id,
        amount = %payment.amount,
        "payment link created"
    );

    Ok(Json(PaymentLinkResponse {
        url: link.url,
        transaction_param: link.transaction_param,
        payment_id: payment.id,
    }))
}
