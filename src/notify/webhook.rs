use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{subject_line, Notifier, NotifyError};
use crate::scan::Posting;

/// Posts new-posting alerts as JSON to an operator-supplied webhook.
#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, posting: &Posting) -> Result<(), NotifyError> {
        let payload = WebhookPayload::from_posting(posting);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    if let Err(e) = rsp.error_for_status_ref() {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1)))
                                .await;
                            continue;
                        }
                        return Err(NotifyError::TransportFailure(anyhow!(
                            "webhook HTTP error: {e}"
                        )));
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(NotifyError::TransportFailure(anyhow!(
                        "webhook request failed: {e}"
                    )));
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

#[derive(Serialize)]
struct WebhookPayload {
    text: String,
    title: String,
    link: String,
    posted: String,
    budget: String,
    discovered_at: DateTime<Utc>,
}

impl WebhookPayload {
    fn from_posting(posting: &Posting) -> Self {
        Self {
            text: subject_line(posting),
            title: posting.title.clone(),
            link: posting.link.clone(),
            posted: posting.posted_label.clone(),
            budget: posting.budget_label.clone(),
            discovered_at: posting.discovered_at,
        }
    }
}
