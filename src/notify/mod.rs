// src/notify/mod.rs
pub mod email;
pub mod webhook;

use async_trait::async_trait;
use thiserror::Error;

use crate::scan::Posting;

const DESCRIPTION_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport failure: {0}")]
    TransportFailure(#[from] anyhow::Error),
}

/// One delivery channel for new-posting alerts.
///
/// Called once per new posting per cycle. A failed dispatch is logged by the
/// caller and never retried: the posting id is already marked seen.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, posting: &Posting) -> Result<(), NotifyError>;
    fn name(&self) -> &'static str;
}

/// Fans one alert out to every configured channel.
#[derive(Default)]
pub struct NotifierMux {
    sinks: Vec<Box<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Box<dyn Notifier>) {
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver to all channels sequentially. A failing channel does not
    /// block the others. Returns the number of failed deliveries.
    pub async fn notify(&self, posting: &Posting) -> usize {
        let mut failures = 0;
        for sink in &self.sinks {
            if let Err(e) = sink.notify(posting).await {
                tracing::warn!(channel = sink.name(), error = %e, id = %posting.id, "notification failed");
                failures += 1;
            } else {
                tracing::info!(channel = sink.name(), id = %posting.id, "notification sent");
            }
        }
        failures
    }
}

pub fn subject_line(posting: &Posting) -> String {
    format!("New job posting: {}", posting.title)
}

pub fn description_preview(posting: &Posting) -> String {
    let mut preview: String = posting
        .description
        .chars()
        .take(DESCRIPTION_PREVIEW_CHARS)
        .collect();
    if posting.description.chars().count() > DESCRIPTION_PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}

pub fn plain_body(posting: &Posting) -> String {
    format!(
        "New job posting found:\n\n\
         Title: {}\n\
         Posted: {}\n\
         Budget: {}\n\n\
         Description:\n{}\n\n\
         View job: {}\n",
        posting.title,
        posting.posted_label,
        posting.budget_label,
        description_preview(posting),
        posting.link
    )
}

pub fn html_body(posting: &Posting) -> String {
    format!(
        "<html><body>\
         <h2>New job posting</h2>\
         <p><strong>{}</strong></p>\
         <p>Posted: {}<br>Budget: {}</p>\
         <p>{}</p>\
         <p><a href=\"{}\">View job</a></p>\
         </body></html>",
        html_escape::encode_text(&posting.title),
        html_escape::encode_text(&posting.posted_label),
        html_escape::encode_text(&posting.budget_label),
        html_escape::encode_text(&description_preview(posting)),
        posting.link
    )
}
