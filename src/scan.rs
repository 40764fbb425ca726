// src/scan.rs
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::driver::{PageDriver, PageElement};
use crate::site::SiteProfile;

/// Sentinels for optional card fields, matching what the alert text shows.
pub const BUDGET_UNSPECIFIED: &str = "not specified";
pub const POSTED_UNKNOWN: &str = "unknown";
pub const NO_DESCRIPTION: &str = "no description available";

/// One job listing, immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Posting {
    pub id: String,
    pub title: String,
    pub link: String,
    /// The site's relative-time text, kept opaque ("2 hours ago").
    pub posted_label: String,
    pub budget_label: String,
    pub description: String,
    pub discovered_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("listing container never appeared")]
    Timeout,
    #[error("scan failed: {0}")]
    Unexpected(#[from] anyhow::Error),
}

/// Extracts the current page of postings for a query.
///
/// Scanning is deliberately forgiving: a card that cannot be read is skipped,
/// optional fields fall back to sentinels, and only a missing listing
/// container is surfaced (as [`ScanError::Timeout`]).
pub struct ListingScanner {
    profile: SiteProfile,
    keywords: Vec<String>,
    container_timeout: Duration,
}

impl ListingScanner {
    pub fn new(profile: SiteProfile, keywords: Vec<String>) -> Self {
        Self {
            profile,
            keywords,
            container_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_container_timeout(mut self, timeout: Duration) -> Self {
        self.container_timeout = timeout;
        self
    }

    /// Scan the recency-sorted search results for `query`.
    ///
    /// Site order is preserved; no re-sort. A posting is retained only if its
    /// title contains at least one configured keyword (case-insensitive
    /// substring).
    pub async fn scan(
        &self,
        driver: &dyn PageDriver,
        query: &str,
    ) -> Result<Vec<Posting>, ScanError> {
        let url = self.profile.search_url_for(query);
        tracing::info!(%url, "navigating to search results");
        driver.navigate(&url).await?;

        if !driver
            .wait_for(&self.profile.job_card, self.container_timeout)
            .await?
        {
            return Err(ScanError::Timeout);
        }

        let cards = driver.query_all(&self.profile.job_card).await?;
        tracing::info!(cards = cards.len(), "listing cards on page");

        let mut postings = Vec::new();
        for card in &cards {
            match self.extract_card(card.as_ref()).await {
                Ok(Some(posting)) => {
                    if self.title_matches(&posting.title) {
                        tracing::info!(id = %posting.id, title = %posting.title, "matching posting");
                        postings.push(posting);
                    }
                }
                Ok(None) => {
                    tracing::warn!("card missing title link, skipped");
                }
                Err(e) => {
                    tracing::warn!(error = ?e, "card extraction failed, skipped");
                }
            }
        }
        Ok(postings)
    }

    /// Pull one card apart. `Ok(None)` means the required title link was
    /// absent; optional fields degrade to sentinels instead of failing.
    async fn extract_card(&self, card: &dyn PageElement) -> Result<Option<Posting>> {
        let Some(title_link) = card.find(&self.profile.job_title_link).await? else {
            return Ok(None);
        };
        let title = normalize_label(&title_link.text().await?);
        let link = title_link.attr("href").await?.unwrap_or_default();
        if title.is_empty() || link.is_empty() {
            return Ok(None);
        }
        let link = absolutize(&self.profile.base_url, &link);

        let mut id = None;
        for attr in &self.profile.job_id_attrs {
            if let Some(v) = card.attr(attr).await? {
                if !v.is_empty() {
                    id = Some(v);
                    break;
                }
            }
        }
        let id = id.unwrap_or_else(|| fallback_id(&title, &link));

        let description = match card.find(&self.profile.job_description).await? {
            Some(el) => normalize_label(&el.text().await?),
            None => NO_DESCRIPTION.to_string(),
        };
        let posted_label = match card.find(&self.profile.job_posted).await? {
            Some(el) => normalize_label(&el.text().await?),
            None => POSTED_UNKNOWN.to_string(),
        };
        let budget_label = match card.find(&self.profile.job_budget).await? {
            Some(el) => normalize_label(&el.text().await?),
            None => BUDGET_UNSPECIFIED.to_string(),
        };

        Ok(Some(Posting {
            id,
            title,
            link,
            posted_label,
            budget_label,
            description,
            discovered_at: Utc::now(),
        }))
    }

    fn title_matches(&self, title: &str) -> bool {
        let lower = title.to_lowercase();
        self.keywords
            .iter()
            .any(|kw| lower.contains(&kw.to_lowercase()))
    }
}

/// Stable identifier for postings without a site-assigned one. Hashing
/// title + link keeps it deterministic across scans of the same posting.
pub fn fallback_id(title: &str, link: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n");
    hasher.update(link.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

/// Decode HTML entities and collapse whitespace in card text.
pub fn normalize_label(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_string();
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&decoded, " ").trim().to_string()
}

fn absolutize(base: &str, link: &str) -> String {
    if link.starts_with('/') {
        format!("{}{}", base.trim_end_matches('/'), link)
    } else {
        link.to_string()
    }
}
