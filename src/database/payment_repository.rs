//! Payment ledger: durable records of Click transactions.
//!
//! A record is created PENDING when a pay link is issued and is never
//! deleted; `paid`/`failed` are terminal. The PAID transition is guarded by a
//! status precondition inside the UPDATE itself, so two concurrent COMPLETE
//! deliveries resolve to exactly one transition.

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::warn;

use crate::click::link::generate_transaction_param;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DatabaseError> {
        match value {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            other => Err(DatabaseError::new(DatabaseErrorKind::Unknown {
                message: format!("unknown payment status: {}", other),
            })),
        }
    }
}

/// Typed payment metadata.
///
/// Known fields are explicit; anything else the bot flows or the gateway
/// attach survives in `extra`. Metadata routes the downstream notification
/// (telegram_id) and records audit timestamps; it never drives a protocol
/// decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PaymentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_error: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_user_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PaymentMetadata {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }

    pub fn from_json(value: serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_else(|e| {
            warn!(error = %e, "unreadable payment metadata, keeping raw copy");
            let mut metadata = PaymentMetadata::default();
            if let serde_json::Value::Object(map) = value {
                metadata.extra = map;
            }
            metadata
        })
    }
}

/// Ledger entity. `id` doubles as the merchant prepare id echoed to Click.
#[derive(Debug, Clone)]
pub struct PaymentRecord {
    pub id: i64,
    pub merchant_trans_id: String,
    pub user_id: i64,
    pub amount: BigDecimal,
    pub status: PaymentStatus,
    pub click_trans_id: Option<i64>,
    pub metadata: PaymentMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct PaymentRow {
    id: i64,
    merchant_trans_id: String,
    user_id: i64,
    amount: BigDecimal,
    status: String,
    click_trans_id: Option<i64>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for PaymentRecord {
    type Error = DatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(PaymentRecord {
            id: row.id,
            merchant_trans_id: row.merchant_trans_id,
            user_id: row.user_id,
            amount: row.amount,
            status: PaymentStatus::parse(&row.status)?,
            click_trans_id: row.click_trans_id,
            metadata: PaymentMetadata::from_json(row.metadata),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Outcome of the guarded PAID transition.
#[derive(Debug, Clone)]
pub enum PaidTransition {
    /// This call performed the transition; side effects may fire.
    Transitioned(PaymentRecord),
    /// The record was no longer PENDING; a concurrent or earlier COMPLETE won.
    AlreadyPaid,
}

/// Ledger operations the protocol handler depends on.
///
/// The handler only sees this trait, so tests drive the full state machine
/// against an in-memory implementation.
#[async_trait]
pub trait TransactionLedger: Send + Sync {
    async fn create_pending(
        &self,
        user_id: i64,
        amount: BigDecimal,
        metadata: PaymentMetadata,
    ) -> Result<PaymentRecord, DatabaseError>;

    async fn find_by_merchant_param(
        &self,
        merchant_trans_id: &str,
    ) -> Result<Option<PaymentRecord>, DatabaseError>;

    /// COMPLETE must match both the merchant param and the prepare id, so a
    /// valid param cannot be replayed against a different prepare id.
    async fn find_by_merchant_param_and_id(
        &self,
        merchant_trans_id: &str,
        id: i64,
    ) -> Result<Option<PaymentRecord>, DatabaseError>;

    async fn mark_paid(
        &self,
        id: i64,
        click_trans_id: i64,
        patch: PaymentMetadata,
    ) -> Result<PaidTransition, DatabaseError>;

    async fn mark_failed(
        &self,
        id: i64,
        gateway_error: i32,
        patch: PaymentMetadata,
    ) -> Result<(), DatabaseError>;
}

const PAYMENT_COLUMNS: &str = "id, merchant_trans_id, user_id, amount, status, click_trans_id, \
                               metadata, created_at, updated_at";

pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_pending(
        &self,
        merchant_trans_id: &str,
        user_id: i64,
        amount: &BigDecimal,
        metadata: &serde_json::Value,
    ) -> Result<PaymentRow, DatabaseError> {
        sqlx::query_as::<_, PaymentRow>(
            "INSERT INTO payments (merchant_trans_id, user_id, amount, status, metadata) \
             VALUES ($1, $2, $3, 'pending', $4) \
             RETURNING id, merchant_trans_id, user_id, amount, status, click_trans_id, \
                       metadata, created_at, updated_at",
        )
        .bind(merchant_trans_id)
        .bind(user_id)
        .bind(amount)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

#[async_trait]
impl TransactionLedger for PaymentRepository {
    async fn create_pending(
        &self,
        user_id: i64,
        amount: BigDecimal,
        metadata: PaymentMetadata,
    ) -> Result<PaymentRecord, DatabaseError> {
        let metadata = metadata.to_json();

        // merchant_trans_id is the idempotency key; a duplicate insert must
        // never be papered over. Retry once with a fresh param, then fail
        // loudly.
        let mut last_err = None;
        for _ in 0..2 {
            let param = generate_transaction_param();
            match self
                .insert_pending(&param, user_id, &amount, &metadata)
                .await
            {
                Ok(row) => return PaymentRecord::try_from(row),
                Err(e) if e.is_unique_violation() => {
                    warn!(merchant_trans_id = %param, "transaction param collision, regenerating");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            DatabaseError::new(DatabaseErrorKind::Unknown {
                message: "payment insert failed".to_string(),
            })
        }))
    }

    async fn find_by_merchant_param(
        &self,
        merchant_trans_id: &str,
    ) -> Result<Option<PaymentRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE merchant_trans_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(merchant_trans_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(PaymentRecord::try_from).transpose()
    }

    async fn find_by_merchant_param_and_id(
        &self,
        merchant_trans_id: &str,
        id: i64,
    ) -> Result<Option<PaymentRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE merchant_trans_id = $1 AND id = $2",
            PAYMENT_COLUMNS
        ))
        .bind(merchant_trans_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(PaymentRecord::try_from).transpose()
    }

    async fn mark_paid(
        &self,
        id: i64,
        click_trans_id: i64,
        patch: PaymentMetadata,
    ) -> Result<PaidTransition, DatabaseError> {
        // The status precondition makes read-then-write a single critical
        // section: only one COMPLETE can move pending -> paid.
        let row = sqlx::query_as::<_, PaymentRow>(
            "UPDATE payments \
             SET status = 'paid', click_trans_id = $2, metadata = metadata || $3, \
                 updated_at = NOW() \
             WHERE id = $1 AND status = 'pending' \
             RETURNING id, merchant_trans_id, user_id, amount, status, click_trans_id, \
                       metadata, created_at, updated_at",
        )
        .bind(id)
        .bind(click_trans_id)
        .bind(patch.to_json())
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        match row {
            Some(row) => Ok(PaidTransition::Transitioned(PaymentRecord::try_from(row)?)),
            None => Ok(PaidTransition::AlreadyPaid),
        }
    }

    async fn mark_failed(
        &self,
        id: i64,
        gateway_error: i32,
        patch: PaymentMetadata,
    ) -> Result<(), DatabaseError> {
        let mut patch = patch;
        patch.gateway_error = Some(gateway_error);

        // Terminal states stay terminal: a gateway cancellation cannot
        // downgrade a paid record.
        sqlx::query(
            "UPDATE payments \
             SET status = 'failed', metadata = metadata || $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(patch.to_json())
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Paid,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
        ] {
            assert_eq!(
                PaymentStatus::parse(status.as_str()).expect("known status"),
                status
            );
        }
        assert!(PaymentStatus::parse("refunded").is_err());
    }

    #[test]
    fn metadata_keeps_unknown_fields() {
        let raw = serde_json::json!({
            "telegram_id": 777,
            "bot_key": "sherlar_bot",
            "promo": "launch2026"
        });
        let metadata = PaymentMetadata::from_json(raw);
        assert_eq!(metadata.telegram_id, Some(777));
        assert_eq!(metadata.bot_key.as_deref(), Some("sherlar_bot"));
        assert_eq!(
            metadata.extra.get("promo").and_then(|v| v.as_str()),
            Some("launch2026")
        );

        let round_tripped = metadata.to_json();
        assert_eq!(
            round_tripped.get("promo").and_then(|v| v.as_str()),
            Some("launch2026")
        );
    }

    #[test]
    fn metadata_patch_omits_unset_fields() {
        let patch = PaymentMetadata {
            paid_at: Some("2026-01-05T10:00:00Z".to_string()),
            ..Default::default()
        };
        let json = patch.to_json();
        assert!(json.get("paid_at").is_some());
        assert!(json.get("telegram_id").is_none());
        assert!(json.get("failed_at").is_none());
    }
}
