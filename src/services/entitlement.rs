//! Entitlement updates: the business consequence of a completed payment.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::database::error::DatabaseError;
use crate::database::user_repository::UserRepository;
use crate::services::notification::PaymentNotifier;

/// Entitlement writes, seam for the protocol handler and the admin surface.
///
/// `grant` must set the paid flag and clear the revocation marker in one
/// write; `revoke` stamps the marker. Both return whether a user row matched.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    async fn grant(&self, telegram_id: i64) -> Result<bool, DatabaseError>;
    async fn revoke(&self, telegram_id: i64) -> Result<bool, DatabaseError>;
}

#[async_trait]
impl EntitlementStore for UserRepository {
    async fn grant(&self, telegram_id: i64) -> Result<bool, DatabaseError> {
        self.grant_entitlement(telegram_id).await
    }

    async fn revoke(&self, telegram_id: i64) -> Result<bool, DatabaseError> {
        self.revoke_entitlement(telegram_id).await
    }
}

/// Applies entitlement changes and fires the downstream notification.
pub struct EntitlementUpdater {
    store: Arc<dyn EntitlementStore>,
    notifier: Arc<dyn PaymentNotifier>,
    notify_timeout: Duration,
}

impl EntitlementUpdater {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        notifier: Arc<dyn PaymentNotifier>,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            notify_timeout,
        }
    }

    /// Grant entitlement after a COMPLETE transition and notify the user.
    ///
    /// Runs after the ledger write has committed, so nothing here may fail
    /// the in-band gateway response: a grant failure is logged loudly, a
    /// notification failure is logged and dropped.
    pub async fn grant_after_payment(&self, telegram_id: i64, amount: &BigDecimal) {
        match self.store.grant(telegram_id).await {
            Ok(true) => {
                info!(telegram_id, "user entitlement granted, revocation cleared");
            }
            Ok(false) => {
                warn!(telegram_id, "entitlement grant matched no user");
                return;
            }
            Err(e) => {
                error!(telegram_id, error = %e, "entitlement grant failed after paid transition");
                return;
            }
        }

        match tokio::time::timeout(
            self.notify_timeout,
            self.notifier.payment_completed(telegram_id, amount),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(telegram_id, error = %e, "payment notification failed"),
            Err(_) => warn!(
                telegram_id,
                timeout_secs = self.notify_timeout.as_secs(),
                "payment notification timed out"
            ),
        }
    }

    /// Admin-triggered grant; no notification.
    pub async fn grant(&self, telegram_id: i64) -> Result<bool, DatabaseError> {
        self.store.grant(telegram_id).await
    }

    /// Admin-triggered revoke; stamps `revoked_at`.
    pub async fn revoke(&self, telegram_id: i64) -> Result<bool, DatabaseError> {
        self.store.revoke(telegram_id).await
    }
}
