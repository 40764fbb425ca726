// src/driver/mod.rs
pub mod chrome;

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// A handle to a single element on the current page.
///
/// Implementations wrap whatever the underlying browser backend hands out;
/// synthetic implementations back the integration tests.
#[async_trait]
pub trait PageElement: Send + Sync {
    /// Rendered text content, trimmed.
    async fn text(&self) -> Result<String>;

    /// Attribute value, `None` if the attribute is absent.
    async fn attr(&self, name: &str) -> Result<Option<String>>;

    /// First descendant matching `selector`, `None` if there is none.
    async fn find(&self, selector: &str) -> Result<Option<Box<dyn PageElement>>>;

    /// Type text into this element. Pacing (human-like or not) is an
    /// implementation concern.
    async fn type_text(&self, text: &str) -> Result<()>;

    async fn click(&self) -> Result<()>;
}

/// Capability contract for the rendering/DOM-query layer.
///
/// The monitoring core only ever talks to this trait; the concrete
/// [`chrome::ChromeDriver`] lives behind it, and tests substitute a
/// scripted fake.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Wait up to `timeout` for `selector` to appear.
    ///
    /// `Ok(true)` once present, `Ok(false)` on timeout. `Err` is reserved
    /// for transport-level failures (browser gone, connection dropped).
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool>;

    /// First match for `selector`, `None` if absent right now.
    async fn query(&self, selector: &str) -> Result<Option<Box<dyn PageElement>>>;

    /// All current matches for `selector`, in document order.
    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn PageElement>>>;

    /// Diagnostic screenshot. Best effort; failures are the caller's to log.
    async fn screenshot(&self, path: &Path) -> Result<()>;

    /// Tear down the underlying browser. Idempotent.
    async fn quit(&mut self) -> Result<()>;
}
