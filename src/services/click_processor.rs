//! Click two-phase payment protocol handler.
//!
//! Implements the PREPARE and COMPLETE steps of the merchant API against the
//! transaction ledger. Every outcome, including internal failures, is
//! reported in-band through the `error` field of a signed response; this
//! module never propagates an error to the HTTP layer. A ledger read failure
//! is reported as "transaction not found" rather than an HTTP 5xx, so the
//! gateway does not abandon a payment over a transient fault.
//!
//! State machine per ledger record:
//!
//! ```text
//! PENDING --(COMPLETE, error==0, amount matches)--> PAID
//! PENDING --(COMPLETE, error!=0)-----------------> FAILED
//! PENDING --(PREPARE, amount mismatch)-----------> (unchanged, -2 returned)
//! PAID    --(COMPLETE, duplicate)----------------> PAID (no-op, -4 returned)
//! ```

use bigdecimal::BigDecimal;
use chrono::Utc;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::click::signature::{compute_signature, verify_signature, SignedFields};
use crate::click::types::{ClickErrorCode, ClickResponse, CompleteRequest, PrepareRequest};
use crate::config::ClickConfig;
use crate::database::payment_repository::{
    PaidTransition, PaymentMetadata, PaymentRecord, PaymentStatus, TransactionLedger,
};
use crate::services::entitlement::EntitlementUpdater;

pub struct ClickProcessor {
    ledger: Arc<dyn TransactionLedger>,
    entitlement: Arc<EntitlementUpdater>,
    config: ClickConfig,
}

impl ClickProcessor {
    pub fn new(
        ledger: Arc<dyn TransactionLedger>,
        entitlement: Arc<EntitlementUpdater>,
        config: ClickConfig,
    ) -> Self {
        Self {
            ledger,
            entitlement,
            config,
        }
    }

    /// PREPARE: validate the request and reserve the prepare id.
    ///
    /// Never mutates the ledger. An amount mismatch leaves the record
    /// PENDING, so the gateway may retry with a corrected amount.
    pub async fn prepare(&self, req: &PrepareRequest) -> ClickResponse {
        let fields = SignedFields {
            click_trans_id: req.click_trans_id,
            service_id: &req.service_id,
            merchant_trans_id: &req.merchant_trans_id,
            merchant_prepare_id: None,
            amount: &req.amount,
            action: req.action,
            sign_time: &req.sign_time,
        };
        if !verify_signature(
            self.config.sign_scheme,
            &self.config.secret_key,
            &fields,
            &req.sign_string,
        ) {
            warn!(
                click_trans_id = req.click_trans_id,
                merchant_trans_id = %req.merchant_trans_id,
                "prepare rejected: signature check failed"
            );
            return self.respond(req.into(), 0, ClickErrorCode::SignCheckFailed);
        }

        let record = match self.ledger.find_by_merchant_param(&req.merchant_trans_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(merchant_trans_id = %req.merchant_trans_id, "prepare: transaction not found");
                return self.respond(req.into(), 0, ClickErrorCode::TransactionNotFound);
            }
            Err(e) => {
                error!(merchant_trans_id = %req.merchant_trans_id, error = %e, "prepare: ledger lookup failed");
                return self.respond(req.into(), 0, ClickErrorCode::TransactionNotFound);
            }
        };

        match BigDecimal::from_str(req.amount.trim()) {
            Ok(amount) if amount == record.amount => {}
            _ => {
                warn!(
                    payment_id = record.id,
                    requested = %req.amount,
                    expected = %record.amount,
                    "prepare: amount mismatch"
                );
                return self.respond(req.into(), record.id, ClickErrorCode::InvalidAmount);
            }
        }

        if record.status == PaymentStatus::Paid {
            info!(payment_id = record.id, "prepare: transaction already paid");
            return self.respond(req.into(), record.id, ClickErrorCode::AlreadyPaid);
        }

        info!(
            payment_id = record.id,
            click_trans_id = req.click_trans_id,
            "prepare accepted"
        );
        self.respond(req.into(), record.id, ClickErrorCode::Success)
    }

    /// COMPLETE: commit or cancel the prepared transaction.
    pub async fn complete(&self, req: &CompleteRequest) -> ClickResponse {
        let fields = SignedFields {
            click_trans_id: req.click_trans_id,
            service_id: &req.service_id,
            merchant_trans_id: &req.merchant_trans_id,
            merchant_prepare_id: Some(req.merchant_prepare_id),
            amount: &req.amount,
            action: req.action,
            sign_time: &req.sign_time,
        };
        if !verify_signature(
            self.config.sign_scheme,
            &self.config.secret_key,
            &fields,
            &req.sign_string,
        ) {
            warn!(
                click_trans_id = req.click_trans_id,
                merchant_trans_id = %req.merchant_trans_id,
                "complete rejected: signature check failed"
            );
            return self.respond(req.into(), req.merchant_prepare_id, ClickErrorCode::SignCheckFailed);
        }

        // The prepare id must match too, so a captured merchant param cannot
        // be replayed against another record.
        let record = match self
            .ledger
            .find_by_merchant_param_and_id(&req.merchant_trans_id, req.merchant_prepare_id)
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => {
                // The gateway sometimes reports its own failure for a payment
                // that never produced a ledger record on our side; its code is
                // echoed verbatim since there is nothing to cancel.
                if req.error < 0 {
                    info!(
                        merchant_trans_id = %req.merchant_trans_id,
                        gateway_error = req.error,
                        "complete: gateway-reported error for unknown transaction, echoing"
                    );
                    return self.respond(
                        req.into(),
                        req.merchant_prepare_id,
                        ClickErrorCode::Gateway(req.error),
                    );
                }
                warn!(
                    merchant_trans_id = %req.merchant_trans_id,
                    merchant_prepare_id = req.merchant_prepare_id,
                    "complete: transaction not found"
                );
                return self.respond(req.into(), req.merchant_prepare_id, ClickErrorCode::TransactionNotFound);
            }
            Err(e) => {
                error!(merchant_trans_id = %req.merchant_trans_id, error = %e, "complete: ledger lookup failed");
                return self.respond(req.into(), req.merchant_prepare_id, ClickErrorCode::TransactionNotFound);
            }
        };

        if req.error != 0 {
            let patch = PaymentMetadata {
                failed_at: Some(Utc::now().to_rfc3339()),
                ..Default::default()
            };
            if let Err(e) = self.ledger.mark_failed(record.id, req.error, patch).await {
                error!(payment_id = record.id, error = %e, "complete: failed transition not persisted");
            } else {
                info!(
                    payment_id = record.id,
                    gateway_error = req.error,
                    "complete: transaction cancelled by gateway"
                );
            }
            return self.respond(req.into(), record.id, ClickErrorCode::TransactionCancelled);
        }

        if record.status == PaymentStatus::Paid {
            info!(payment_id = record.id, "complete: duplicate delivery, already paid");
            return self.respond(req.into(), record.id, ClickErrorCode::AlreadyPaid);
        }

        match BigDecimal::from_str(req.amount.trim()) {
            Ok(amount) if amount == record.amount => {}
            _ => {
                warn!(
                    payment_id = record.id,
                    requested = %req.amount,
                    expected = %record.amount,
                    "complete: amount mismatch"
                );
                return self.respond(req.into(), record.id, ClickErrorCode::InvalidAmount);
            }
        }

        let patch = PaymentMetadata {
            paid_at: Some(Utc::now().to_rfc3339()),
            webhook_amount: Some(req.amount.clone()),
            webhook_user_id: req.merchant_user_id.clone(),
            ..Default::default()
        };
        let transitioned = match self
            .ledger
            .mark_paid(record.id, req.click_trans_id, patch)
            .await
        {
            Ok(PaidTransition::Transitioned(updated)) => updated,
            Ok(PaidTransition::AlreadyPaid) => {
                // Lost the race against a concurrent duplicate delivery; the
                // winner already fired the side effects.
                info!(payment_id = record.id, "complete: concurrent delivery won, already paid");
                return self.respond(req.into(), record.id, ClickErrorCode::AlreadyPaid);
            }
            Err(e) => {
                error!(payment_id = record.id, error = %e, "complete: paid transition failed");
                return self.respond(req.into(), record.id, ClickErrorCode::FailedToUpdate);
            }
        };

        info!(
            payment_id = transitioned.id,
            click_trans_id = req.click_trans_id,
            amount = %transitioned.amount,
            "payment completed"
        );

        match self.entitlement_owner(&transitioned, req) {
            Some(telegram_id) => {
                self.entitlement
                    .grant_after_payment(telegram_id, &transitioned.amount)
                    .await;
            }
            None => warn!(
                payment_id = transitioned.id,
                "paid transaction has no telegram id, entitlement not granted"
            ),
        }

        self.respond(req.into(), transitioned.id, ClickErrorCode::Success)
    }

    /// Owner routing: ledger metadata first, gateway-supplied user id as the
    /// fallback.
    fn entitlement_owner(&self, record: &PaymentRecord, req: &CompleteRequest) -> Option<i64> {
        record.metadata.telegram_id.or_else(|| {
            req.merchant_user_id
                .as_deref()
                .and_then(|v| v.trim().parse::<i64>().ok())
        })
    }

    /// Build the signed response. Both endpoints sign with the profile that
    /// includes the prepare id (0 when the record is unknown), over the
    /// gateway-supplied sign_time, so the gateway can verify every reply,
    /// idempotent replays included.
    fn respond(&self, echo: EchoFields<'_>, prepare_id: i64, code: ClickErrorCode) -> ClickResponse {
        let fields = SignedFields {
            click_trans_id: echo.click_trans_id,
            service_id: echo.service_id,
            merchant_trans_id: echo.merchant_trans_id,
            merchant_prepare_id: Some(prepare_id),
            amount: echo.amount,
            action: echo.action,
            sign_time: echo.sign_time,
        };
        let sign_string = compute_signature(self.config.sign_scheme, &self.config.secret_key, &fields);

        ClickResponse {
            click_trans_id: echo.click_trans_id,
            merchant_trans_id: echo.merchant_trans_id.to_string(),
            merchant_prepare_id: prepare_id,
            error: code.code(),
            error_note: code.note(),
            sign_time: echo.sign_time.to_string(),
            sign_string,
        }
    }
}

/// Request fields echoed into the response and its signature.
struct EchoFields<'a> {
    click_trans_id: i64,
    service_id: &'a str,
    merchant_trans_id: &'a str,
    amount: &'a str,
    action: i32,
    sign_time: &'a str,
}

impl<'a> From<&'a PrepareRequest> for EchoFields<'a> {
    fn from(req: &'a PrepareRequest) -> Self {
        Self {
            click_trans_id: req.click_trans_id,
            service_id: &req.service_id,
            merchant_trans_id: &req.merchant_trans_id,
            amount: &req.amount,
            action: req.action,
            sign_time: &req.sign_time,
        }
    }
}

impl<'a> From<&'a CompleteRequest> for EchoFields<'a> {
    fn from(req: &'a CompleteRequest) -> Self {
        Self {
            click_trans_id: req.click_trans_id,
            service_id: &req.service_id,
            merchant_trans_id: &req.merchant_trans_id,
            amount: &req.amount,
            action: req.action,
            sign_time: &req.sign_time,
        }
    }
}
