//! TTL session store keyed by telegram id.
//!
//! Replaces the process-wide mutable maps of the legacy flows: the store is
//! an injected dependency and entries expire instead of accumulating. The
//! payment-link flow uses it to hand back the last issued link while it is
//! still fresh, instead of minting a new PENDING record per tap.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub payment_id: i64,
    pub transaction_param: String,
    pub url: String,
}

struct SessionEntry {
    session: PaymentSession,
    expires_at: Instant,
}

pub struct SessionStore {
    ttl: Duration,
    inner: RwLock<HashMap<i64, SessionEntry>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, telegram_id: i64) -> Option<PaymentSession> {
        let inner = self.inner.read().await;
        let entry = inner.get(&telegram_id)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.session.clone())
    }

    pub async fn put(&self, telegram_id: i64, session: PaymentSession) {
        let mut inner = self.inner.write().await;
        inner.insert(
            telegram_id,
            SessionEntry {
                session,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub async fn remove(&self, telegram_id: i64) {
        self.inner.write().await.remove(&telegram_id);
    }

    /// Drop expired entries; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        let before = inner.len();
        inner.retain(|_, entry| entry.expires_at > now);
        before - inner.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}
