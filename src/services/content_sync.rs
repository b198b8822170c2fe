//! Content synchronisation from the ProgramSoft feed.
//!
//! Pulls paginated poem items and upserts them by external id. Runs from the
//! background worker and from the admin trigger endpoint; both share one
//! sync pass implementation.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::database::error::DatabaseError;
use crate::database::poem_repository::{PoemRepository, PoemUpsert};

#[derive(Debug, Error)]
pub enum ContentSyncError {
    #[error("content API request failed: {message}")]
    Api { message: String },

    #[error("content API returned HTTP {status}")]
    Status { status: u16 },

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Clone)]
pub struct ContentSyncConfig {
    pub base_url: String,
    pub service_id: String,
    /// Hard cap on pages fetched per pass; the feed is finite but the cap
    /// bounds a sync pass even if the API starts repeating pages.
    pub max_pages: u32,
    pub request_timeout: Duration,
}

impl Default for ContentSyncConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.programsoft.uz/api".to_string(),
            service_id: "7".to_string(),
            max_pages: 50,
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl ContentSyncConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(url) = std::env::var("CONTENT_API_URL") {
            cfg.base_url = url;
        }
        if let Ok(id) = std::env::var("CONTENT_SERVICE_ID") {
            cfg.service_id = id;
        }
        cfg.max_pages = std::env::var("CONTENT_SYNC_MAX_PAGES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(cfg.max_pages);
        cfg.request_timeout = Duration::from_secs(
            std::env::var("CONTENT_SYNC_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.request_timeout.as_secs()),
        );
        cfg
    }
}

/// One item of the feed, as the API serves it. Likes/dislikes arrive as
/// strings.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedItem {
    pub id: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub likes: Option<String>,
    #[serde(default)]
    pub dislikes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedPage {
    #[serde(default)]
    data: Vec<FeedItem>,
}

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub pages: u32,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

pub struct ContentSyncService {
    client: Client,
    repo: PoemRepository,
    config: ContentSyncConfig,
}

impl ContentSyncService {
    pub fn new(repo: PoemRepository, config: ContentSyncConfig) -> Result<Self, ContentSyncError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ContentSyncError::Api {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            repo,
            config,
        })
    }

    /// Run one full sync pass: fetch pages until the feed is exhausted.
    pub async fn sync_all(&self) -> Result<SyncReport, ContentSyncError> {
        let mut report = SyncReport::default();

        for page in 1..=self.config.max_pages {
            let items = self.fetch_page(page).await?;
            if items.is_empty() {
                break;
            }

            report.pages = page;
            report.fetched += items.len();

            for item in items {
                let Some(poem) = map_feed_item(&item) else {
                    report.skipped += 1;
                    continue;
                };
                match self.repo.upsert(&poem).await {
                    Ok(true) => report.inserted += 1,
                    Ok(false) => report.updated += 1,
                    Err(e) => {
                        // One bad row must not abort the pass.
                        warn!(external_id = %poem.external_id, error = %e, "poem upsert failed");
                        report.skipped += 1;
                    }
                }
            }
        }

        info!(
            pages = report.pages,
            fetched = report.fetched,
            inserted = report.inserted,
            updated = report.updated,
            skipped = report.skipped,
            "content sync pass finished"
        );
        Ok(report)
    }

    async fn fetch_page(&self, page: u32) -> Result<Vec<FeedItem>, ContentSyncError> {
        let url = format!(
            "{}/service/{}?page={}",
            self.config.base_url, self.config.service_id, page
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ContentSyncError::Api {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ContentSyncError::Status {
                status: response.status().as_u16(),
            });
        }

        let parsed: FeedPage = response.json().await.map_err(|e| ContentSyncError::Api {
            message: format!("invalid feed JSON: {}", e),
        })?;

        Ok(parsed.data)
    }
}

/// Map a feed item to a ledger row. Items without text are dropped.
pub fn map_feed_item(item: &FeedItem) -> Option<PoemUpsert> {
    let content = item.text.as_deref()?.trim();
    if content.is_empty() {
        return None;
    }

    Some(PoemUpsert {
        external_id: item.id.to_string(),
        author: item.caption.clone().filter(|c| !c.trim().is_empty()),
        title: None,
        content: content.to_string(),
        likes: parse_count(item.likes.as_deref()),
        dislikes: parse_count(item.dislikes.as_deref()),
    })
}

fn parse_count(value: Option<&str>) -> i32 {
    value.and_then(|v| v.trim().parse::<i32>().ok()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_item_maps_to_upsert() {
        let item = FeedItem {
            id: 42,
            text: Some("Bahor keldi...".to_string()),
            caption: Some("Cho'lpon".to_string()),
            likes: Some("12".to_string()),
            dislikes: Some("1".to_string()),
        };
        let poem = map_feed_item(&item).expect("should map");
        assert_eq!(poem.external_id, "42");
        assert_eq!(poem.author.as_deref(), Some("Cho'lpon"));
        assert_eq!(poem.content, "Bahor keldi...");
        assert_eq!(poem.likes, 12);
        assert_eq!(poem.dislikes, 1);
    }

    #[test]
    fn empty_text_is_dropped() {
        let item = FeedItem {
            id: 1,
            text: Some("   ".to_string()),
            caption: None,
            likes: None,
            dislikes: None,
        };
        assert!(map_feed_item(&item).is_none());

        let missing = FeedItem {
            id: 2,
            text: None,
            caption: None,
            likes: None,
            dislikes: None,
        };
        assert!(map_feed_item(&missing).is_none());
    }

    #[test]
    fn malformed_counters_default_to_zero() {
        let item = FeedItem {
            id: 3,
            text: Some("she'r".to_string()),
            caption: None,
            likes: Some("ko'p".to_string()),
            dislikes: None,
        };
        let poem = map_feed_item(&item).expect("should map");
        assert_eq!(poem.likes, 0);
        assert_eq!(poem.dislikes, 0);
    }

    #[test]
    fn feed_page_parses_with_missing_data() {
        let page: FeedPage = serde_json::from_str(r#"{"links": {}, "meta": {}}"#)
            .expect("should parse");
        assert!(page.data.is_empty());
    }
}
