//! Request/response shapes and error codes for the Click merchant API.
//!
//! Failure is always reported in-band: the HTTP status is 200 and the
//! `error` field carries one of the codes below, per the gateway convention.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// In-band result codes of the Click merchant API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickErrorCode {
    Success,
    SignCheckFailed,
    InvalidAmount,
    ActionNotFound,
    AlreadyPaid,
    UserNotFound,
    TransactionNotFound,
    FailedToUpdate,
    UnknownError,
    TransactionCancelled,
    /// Gateway-reported negative code echoed back verbatim.
    Gateway(i32),
}

impl ClickErrorCode {
    pub fn code(&self) -> i32 {
        match self {
            ClickErrorCode::Success => 0,
            ClickErrorCode::SignCheckFailed => -1,
            ClickErrorCode::InvalidAmount => -2,
            ClickErrorCode::ActionNotFound => -3,
            ClickErrorCode::AlreadyPaid => -4,
            ClickErrorCode::UserNotFound => -5,
            ClickErrorCode::TransactionNotFound => -6,
            ClickErrorCode::FailedToUpdate => -7,
            ClickErrorCode::UnknownError => -8,
            ClickErrorCode::TransactionCancelled => -9,
            ClickErrorCode::Gateway(code) => *code,
        }
    }

    pub fn note(&self) -> String {
        match self {
            ClickErrorCode::Success => "Success".to_string(),
            ClickErrorCode::SignCheckFailed => "Invalid signature".to_string(),
            ClickErrorCode::InvalidAmount => "Invalid amount".to_string(),
            ClickErrorCode::ActionNotFound => "Action not found".to_string(),
            ClickErrorCode::AlreadyPaid => "Already paid".to_string(),
            ClickErrorCode::UserNotFound => "User not found".to_string(),
            ClickErrorCode::TransactionNotFound => "Transaction not found".to_string(),
            ClickErrorCode::FailedToUpdate => "Failed to update".to_string(),
            ClickErrorCode::UnknownError => "Unknown error".to_string(),
            ClickErrorCode::TransactionCancelled => "Transaction cancelled".to_string(),
            ClickErrorCode::Gateway(code) => format!("Gateway error: {}", code),
        }
    }
}

/// Body of `POST /click/prepare`.
///
/// The gateway is loose about scalar encodings (numbers may arrive quoted and
/// vice versa), so the numeric fields accept both. `amount` stays a string:
/// its exact textual form participates in the signature.
#[derive(Debug, Clone, Deserialize)]
pub struct PrepareRequest {
    #[serde(deserialize_with = "de_i64")]
    pub click_trans_id: i64,
    #[serde(deserialize_with = "de_string")]
    pub service_id: String,
    #[serde(deserialize_with = "de_string")]
    pub merchant_trans_id: String,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub merchant_user_id: Option<String>,
    #[serde(deserialize_with = "de_string")]
    pub amount: String,
    #[serde(deserialize_with = "de_i32")]
    pub action: i32,
    pub sign_time: String,
    pub sign_string: String,
}

/// Body of `POST /click/complete`: PREPARE fields plus the echoed prepare id
/// and the gateway-reported `error`.
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteRequest {
    #[serde(deserialize_with = "de_i64")]
    pub click_trans_id: i64,
    #[serde(deserialize_with = "de_string")]
    pub service_id: String,
    #[serde(deserialize_with = "de_string")]
    pub merchant_trans_id: String,
    #[serde(deserialize_with = "de_i64")]
    pub merchant_prepare_id: i64,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub merchant_user_id: Option<String>,
    #[serde(deserialize_with = "de_string")]
    pub amount: String,
    #[serde(deserialize_with = "de_i32")]
    pub action: i32,
    #[serde(default, deserialize_with = "de_i32")]
    pub error: i32,
    pub sign_time: String,
    pub sign_string: String,
}

/// Response body for both endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickResponse {
    pub click_trans_id: i64,
    pub merchant_trans_id: String,
    pub merchant_prepare_id: i64,
    pub error: i32,
    pub error_note: String,
    pub sign_time: String,
    pub sign_string: String,
}

fn de_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) => Ok(s),
        JsonValue::Number(n) => Ok(n.to_string()),
        other => Err(DeError::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn de_opt_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match JsonValue::deserialize(deserializer)? {
        JsonValue::Null => Ok(None),
        JsonValue::String(s) => Ok(Some(s)),
        JsonValue::Number(n) => Ok(Some(n.to_string())),
        other => Err(DeError::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn de_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match JsonValue::deserialize(deserializer)? {
        JsonValue::Number(n) => n
            .as_i64()
            .ok_or_else(|| DeError::custom("expected integer")),
        JsonValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| DeError::custom(format!("invalid integer '{}': {}", s, e))),
        other => Err(DeError::custom(format!(
            "expected integer, got {}",
            other
        ))),
    }
}

fn de_i32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    de_i64(deserializer).map(|v| v as i32)
}
