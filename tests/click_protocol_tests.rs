//! End-to-end tests of the Click two-phase protocol handler against an
//! in-memory ledger, entitlement store, and notifier.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use sherlar_backend::click::signature::{
    compute_signature, verify_signature, SignatureScheme, SignedFields,
};
use sherlar_backend::click::types::{CompleteRequest, PrepareRequest};
use sherlar_backend::config::ClickConfig;
use sherlar_backend::database::error::DatabaseError;
use sherlar_backend::database::payment_repository::{
    PaidTransition, PaymentMetadata, PaymentRecord, PaymentStatus, TransactionLedger,
};
use sherlar_backend::services::click_processor::ClickProcessor;
use sherlar_backend::services::entitlement::{EntitlementStore, EntitlementUpdater};
use sherlar_backend::services::notification::{NotifyError, PaymentNotifier};

const SECRET: &str = "testsecret";
const SERVICE_ID: &str = "12345";
const SIGN_TIME: &str = "2026-01-05 10:00:00";

// ---------------------------------------------------------------------------
// In-memory doubles
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryLedger {
    records: Mutex<HashMap<i64, PaymentRecord>>,
}

impl MemoryLedger {
    async fn seed(&self, record: PaymentRecord) {
        self.records.lock().await.insert(record.id, record);
    }

    async fn status_of(&self, id: i64) -> Option<PaymentStatus> {
        self.records.lock().await.get(&id).map(|r| r.status)
    }

    async fn record(&self, id: i64) -> Option<PaymentRecord> {
        self.records.lock().await.get(&id).cloned()
    }
}

fn merge_patch(metadata: &mut PaymentMetadata, patch: &PaymentMetadata) {
    if patch.paid_at.is_some() {
        metadata.paid_at = patch.paid_at.clone();
    }
    if patch.failed_at.is_some() {
        metadata.failed_at = patch.failed_at.clone();
    }
    if patch.gateway_error.is_some() {
        metadata.gateway_error = patch.gateway_error;
    }
    if patch.webhook_amount.is_some() {
        metadata.webhook_amount = patch.webhook_amount.clone();
    }
    if patch.webhook_user_id.is_some() {
        metadata.webhook_user_id = patch.webhook_user_id.clone();
    }
}

#[async_trait]
impl TransactionLedger for MemoryLedger {
    async fn create_pending(
        &self,
        user_id: i64,
        amount: BigDecimal,
        metadata: PaymentMetadata,
    ) -> Result<PaymentRecord, DatabaseError> {
        let mut records = self.records.lock().await;
        let id = records.keys().max().copied().unwrap_or(0) + 1;
        let record = PaymentRecord {
            id,
            merchant_trans_id: format!("param{:04}", id),
            user_id,
            amount,
            status: PaymentStatus::Pending,
            click_trans_id: None,
            metadata,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        records.insert(id, record.clone());
        Ok(record)
    }

    async fn find_by_merchant_param(
        &self,
        merchant_trans_id: &str,
    ) -> Result<Option<PaymentRecord>, DatabaseError> {
        let records = self.records.lock().await;
        Ok(records
            .values()
            .find(|r| r.merchant_trans_id == merchant_trans_id)
            .cloned())
    }

    async fn find_by_merchant_param_and_id(
        &self,
        merchant_trans_id: &str,
        id: i64,
    ) -> Result<Option<PaymentRecord>, DatabaseError> {
        let records = self.records.lock().await;
        Ok(records
            .get(&id)
            .filter(|r| r.merchant_trans_id == merchant_trans_id)
            .cloned())
    }

    async fn mark_paid(
        &self,
        id: i64,
        click_trans_id: i64,
        patch: PaymentMetadata,
    ) -> Result<PaidTransition, DatabaseError> {
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(&id) else {
            return Ok(PaidTransition::AlreadyPaid);
        };
        if record.status != PaymentStatus::Pending {
            return Ok(PaidTransition::AlreadyPaid);
        }
        record.status = PaymentStatus::Paid;
        record.click_trans_id = Some(click_trans_id);
        merge_patch(&mut record.metadata, &patch);
        record.updated_at = Utc::now();
        Ok(PaidTransition::Transitioned(record.clone()))
    }

    async fn mark_failed(
        &self,
        id: i64,
        gateway_error: i32,
        patch: PaymentMetadata,
    ) -> Result<(), DatabaseError> {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(&id) {
            if record.status == PaymentStatus::Pending {
                record.status = PaymentStatus::Failed;
                merge_patch(&mut record.metadata, &patch);
                record.metadata.gateway_error = Some(gateway_error);
                record.updated_at = Utc::now();
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct MemoryEntitlements {
    granted: Mutex<Vec<i64>>,
    revoked_cleared: Mutex<Vec<i64>>,
}

#[async_trait]
impl EntitlementStore for MemoryEntitlements {
    async fn grant(&self, telegram_id: i64) -> Result<bool, DatabaseError> {
        // Models the single-write invariant: the grant clears the revocation
        // marker together with setting the flag.
        self.granted.lock().await.push(telegram_id);
        self.revoked_cleared.lock().await.push(telegram_id);
        Ok(true)
    }

    async fn revoke(&self, _telegram_id: i64) -> Result<bool, DatabaseError> {
        Ok(true)
    }
}

#[derive(Default)]
struct CountingNotifier {
    calls: AtomicUsize,
}

#[async_trait]
impl PaymentNotifier for CountingNotifier {
    async fn payment_completed(
        &self,
        _telegram_id: i64,
        _amount: &BigDecimal,
    ) -> Result<(), NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

struct Fixture {
    processor: ClickProcessor,
    ledger: Arc<MemoryLedger>,
    entitlements: Arc<MemoryEntitlements>,
    notifier: Arc<CountingNotifier>,
}

fn click_config() -> ClickConfig {
    ClickConfig {
        service_id: SERVICE_ID.to_string(),
        merchant_id: "678".to_string(),
        secret_key: SECRET.to_string(),
        return_url: "https://t.me/sherlar_bot".to_string(),
        sign_scheme: SignatureScheme::Md5,
        payment_amount: BigDecimal::from(1111),
    }
}

fn fixture() -> Fixture {
    let ledger = Arc::new(MemoryLedger::default());
    let entitlements = Arc::new(MemoryEntitlements::default());
    let notifier = Arc::new(CountingNotifier::default());
    let entitlement = Arc::new(EntitlementUpdater::new(
        entitlements.clone(),
        notifier.clone(),
        Duration::from_secs(1),
    ));
    let processor = ClickProcessor::new(ledger.clone(), entitlement, click_config());
    Fixture {
        processor,
        ledger,
        entitlements,
        notifier,
    }
}

fn pending_record(id: i64, merchant_trans_id: &str, telegram_id: i64) -> PaymentRecord {
    PaymentRecord {
        id,
        merchant_trans_id: merchant_trans_id.to_string(),
        user_id: id,
        amount: BigDecimal::from(1111),
        status: PaymentStatus::Pending,
        click_trans_id: None,
        metadata: PaymentMetadata {
            telegram_id: Some(telegram_id),
            source: Some("gateway".to_string()),
            ..Default::default()
        },
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn prepare_request(merchant_trans_id: &str, amount: &str) -> PrepareRequest {
    let fields = SignedFields {
        click_trans_id: 555001,
        service_id: SERVICE_ID,
        merchant_trans_id,
        merchant_prepare_id: None,
        amount,
        action: 0,
        sign_time: SIGN_TIME,
    };
    let sign_string = compute_signature(SignatureScheme::Md5, SECRET, &fields);
    PrepareRequest {
        click_trans_id: 555001,
        service_id: SERVICE_ID.to_string(),
        merchant_trans_id: merchant_trans_id.to_string(),
        merchant_user_id: None,
        amount: amount.to_string(),
        action: 0,
        sign_time: SIGN_TIME.to_string(),
        sign_string,
    }
}

fn complete_request(
    merchant_trans_id: &str,
    merchant_prepare_id: i64,
    amount: &str,
    gateway_error: i32,
) -> CompleteRequest {
    let fields = SignedFields {
        click_trans_id: 555002,
        service_id: SERVICE_ID,
        merchant_trans_id,
        merchant_prepare_id: Some(merchant_prepare_id),
        amount,
        action: 1,
        sign_time: SIGN_TIME,
    };
    let sign_string = compute_signature(SignatureScheme::Md5, SECRET, &fields);
    CompleteRequest {
        click_trans_id: 555002,
        service_id: SERVICE_ID.to_string(),
        merchant_trans_id: merchant_trans_id.to_string(),
        merchant_prepare_id,
        merchant_user_id: None,
        amount: amount.to_string(),
        action: 1,
        error: gateway_error,
        sign_time: SIGN_TIME.to_string(),
        sign_string,
    }
}

// ---------------------------------------------------------------------------
// PREPARE
// ---------------------------------------------------------------------------

#[tokio::test]
async fn prepare_succeeds_for_matching_pending_transaction() {
    let fx = fixture();
    fx.ledger.seed(pending_record(7, "mtp007", 777)).await;

    let response = fx.processor.prepare(&prepare_request("mtp007", "1111")).await;

    assert_eq!(response.error, 0);
    assert_eq!(response.merchant_prepare_id, 7);
    assert_eq!(response.merchant_trans_id, "mtp007");
    assert_eq!(response.click_trans_id, 555001);
}

#[tokio::test]
async fn tampered_signature_always_fails_with_minus_one() {
    let fx = fixture();
    fx.ledger.seed(pending_record(7, "mtp007", 777)).await;

    let mut prepare = prepare_request("mtp007", "1111");
    prepare.sign_string = "00000000000000000000000000000000".to_string();
    let response = fx.processor.prepare(&prepare).await;
    assert_eq!(response.error, -1);

    let mut complete = complete_request("mtp007", 7, "1111", 0);
    complete.sign_string = "00000000000000000000000000000000".to_string();
    let response = fx.processor.complete(&complete).await;
    assert_eq!(response.error, -1);

    // No mutation happened on either path.
    assert_eq!(fx.ledger.status_of(7).await, Some(PaymentStatus::Pending));
}

#[tokio::test]
async fn prepare_amount_mismatch_returns_minus_two_and_keeps_pending() {
    let fx = fixture();
    fx.ledger.seed(pending_record(7, "mtp007", 777)).await;

    let response = fx.processor.prepare(&prepare_request("mtp007", "1110")).await;

    assert_eq!(response.error, -2);
    // Observed gateway behavior: the record stays PENDING for a retry with a
    // corrected amount.
    assert_eq!(fx.ledger.status_of(7).await, Some(PaymentStatus::Pending));
}

#[tokio::test]
async fn prepare_unknown_transaction_returns_minus_six() {
    let fx = fixture();
    fx.ledger.seed(pending_record(7, "mtp007", 777)).await;

    let response = fx.processor.prepare(&prepare_request("missing", "1111")).await;

    assert_eq!(response.error, -6);
    assert_eq!(response.merchant_prepare_id, 0);
    assert_eq!(fx.ledger.status_of(7).await, Some(PaymentStatus::Pending));
}

#[tokio::test]
async fn prepare_on_paid_transaction_reports_already_paid() {
    let fx = fixture();
    let mut record = pending_record(7, "mtp007", 777);
    record.status = PaymentStatus::Paid;
    fx.ledger.seed(record).await;

    let response = fx.processor.prepare(&prepare_request("mtp007", "1111")).await;

    assert_eq!(response.error, -4);
    assert_eq!(response.merchant_prepare_id, 7);
}

// ---------------------------------------------------------------------------
// COMPLETE
// ---------------------------------------------------------------------------

#[tokio::test]
async fn complete_transitions_to_paid_and_grants_entitlement_once() {
    let fx = fixture();
    fx.ledger.seed(pending_record(7, "mtp007", 777)).await;

    let request = complete_request("mtp007", 7, "1111", 0);

    let first = fx.processor.complete(&request).await;
    assert_eq!(first.error, 0);
    assert_eq!(first.merchant_prepare_id, 7);
    assert_eq!(fx.ledger.status_of(7).await, Some(PaymentStatus::Paid));

    let second = fx.processor.complete(&request).await;
    assert_eq!(second.error, -4);

    // Side effects fired exactly once.
    assert_eq!(fx.entitlements.granted.lock().await.as_slice(), &[777]);
    assert_eq!(fx.notifier.calls.load(Ordering::SeqCst), 1);

    let record = fx.ledger.record(7).await.expect("record exists");
    assert_eq!(record.click_trans_id, Some(555002));
    assert!(record.metadata.paid_at.is_some());
}

#[tokio::test]
async fn complete_grant_clears_revocation_marker() {
    let fx = fixture();
    fx.ledger.seed(pending_record(7, "mtp007", 777)).await;

    let response = fx.processor.complete(&complete_request("mtp007", 7, "1111", 0)).await;
    assert_eq!(response.error, 0);

    // The grant and the revocation clear are one write in the store.
    assert_eq!(fx.entitlements.revoked_cleared.lock().await.as_slice(), &[777]);
}

#[tokio::test]
async fn gateway_error_cancels_transaction_regardless_of_amount() {
    let fx = fixture();
    fx.ledger.seed(pending_record(7, "mtp007", 777)).await;

    // Amount is wrong on purpose: the cancellation path must not depend on it.
    let response = fx.processor.complete(&complete_request("mtp007", 7, "999", -100)).await;

    assert_eq!(response.error, -9);
    assert_eq!(fx.ledger.status_of(7).await, Some(PaymentStatus::Failed));
    let record = fx.ledger.record(7).await.expect("record exists");
    assert_eq!(record.metadata.gateway_error, Some(-100));
    assert!(record.metadata.failed_at.is_some());

    // No entitlement or notification on a cancelled payment.
    assert!(fx.entitlements.granted.lock().await.is_empty());
    assert_eq!(fx.notifier.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn complete_unknown_transaction_returns_minus_six() {
    let fx = fixture();
    fx.ledger.seed(pending_record(7, "mtp007", 777)).await;

    let response = fx.processor.complete(&complete_request("missing", 1, "1111", 0)).await;
    assert_eq!(response.error, -6);

    // A valid param replayed against the wrong prepare id is also unknown.
    let response = fx.processor.complete(&complete_request("mtp007", 99, "1111", 0)).await;
    assert_eq!(response.error, -6);

    assert_eq!(fx.ledger.status_of(7).await, Some(PaymentStatus::Pending));
}

#[tokio::test]
async fn gateway_error_for_unknown_transaction_is_echoed_verbatim() {
    let fx = fixture();

    let response = fx.processor.complete(&complete_request("missing", 1, "1111", -2046)).await;

    assert_eq!(response.error, -2046);
    assert!(response.error_note.contains("-2046"));
}

#[tokio::test]
async fn complete_amount_mismatch_returns_minus_two_without_transition() {
    let fx = fixture();
    fx.ledger.seed(pending_record(7, "mtp007", 777)).await;

    let response = fx.processor.complete(&complete_request("mtp007", 7, "1110", 0)).await;

    assert_eq!(response.error, -2);
    assert_eq!(fx.ledger.status_of(7).await, Some(PaymentStatus::Pending));
    assert!(fx.entitlements.granted.lock().await.is_empty());
}

#[tokio::test]
async fn entitlement_falls_back_to_gateway_user_id() {
    let fx = fixture();
    let mut record = pending_record(7, "mtp007", 777);
    record.metadata.telegram_id = None;
    fx.ledger.seed(record).await;

    let mut request = complete_request("mtp007", 7, "1111", 0);
    request.merchant_user_id = Some("888".to_string());

    let response = fx.processor.complete(&request).await;
    assert_eq!(response.error, 0);
    assert_eq!(fx.entitlements.granted.lock().await.as_slice(), &[888]);
}

#[tokio::test]
async fn concurrent_duplicate_completes_grant_exactly_once() {
    let fx = fixture();
    fx.ledger.seed(pending_record(7, "mtp007", 777)).await;

    let request = complete_request("mtp007", 7, "1111", 0);
    let (first, second) = tokio::join!(
        fx.processor.complete(&request),
        fx.processor.complete(&request)
    );

    let mut errors = vec![first.error, second.error];
    errors.sort_unstable();
    assert_eq!(errors, vec![-4, 0]);

    assert_eq!(fx.entitlements.granted.lock().await.len(), 1);
    assert_eq!(fx.notifier.calls.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Response signatures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn response_signature_verifies_on_the_gateway_side() {
    let fx = fixture();
    fx.ledger.seed(pending_record(7, "mtp007", 777)).await;

    let request = complete_request("mtp007", 7, "1111", 0);
    let response = fx.processor.complete(&request).await;
    assert_eq!(response.error, 0);

    // Simulated gateway-side verification over the same field values.
    let fields = SignedFields {
        click_trans_id: response.click_trans_id,
        service_id: SERVICE_ID,
        merchant_trans_id: &response.merchant_trans_id,
        merchant_prepare_id: Some(response.merchant_prepare_id),
        amount: "1111",
        action: 1,
        sign_time: &response.sign_time,
    };
    assert!(verify_signature(
        SignatureScheme::Md5,
        SECRET,
        &fields,
        &response.sign_string
    ));
}

#[tokio::test]
async fn already_paid_replay_still_carries_valid_signature() {
    let fx = fixture();
    let mut record = pending_record(7, "mtp007", 777);
    record.status = PaymentStatus::Paid;
    fx.ledger.seed(record).await;

    let request = complete_request("mtp007", 7, "1111", 0);
    let response = fx.processor.complete(&request).await;
    assert_eq!(response.error, -4);

    let fields = SignedFields {
        click_trans_id: response.click_trans_id,
        service_id: SERVICE_ID,
        merchant_trans_id: &response.merchant_trans_id,
        merchant_prepare_id: Some(response.merchant_prepare_id),
        amount: "1111",
        action: 1,
        sign_time: &response.sign_time,
    };
    assert!(verify_signature(
        SignatureScheme::Md5,
        SECRET,
        &fields,
        &response.sign_string
    ));
}
