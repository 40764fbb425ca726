// src/driver/chrome.rs
//
// chromiumoxide-backed PageDriver. Everything fingerprint-related lives
// here: launch flags, user-agent rotation, the CDP init script, and
// human-paced typing. The monitoring core never sees any of it.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::element::Element;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use rand::Rng;
use serde::Deserialize;
use tokio::task::JoinHandle;

use super::{PageDriver, PageElement};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Desktop user agents the driver rotates between at launch.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:124.0) Gecko/20100101 Firefox/124.0",
];

/// Masks the most common automation markers before any site script runs.
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined, configurable: true });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5], configurable: true });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'], configurable: true });
if (!window.chrome) { window.chrome = {}; }
if (!window.chrome.runtime) { window.chrome.runtime = {}; }
delete window.__selenium_unwrapped;
delete window.__webdriver_script_fn;
"#;

/// Launch-time knobs. These are configuration, not core logic.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    /// Headful by default: challenge resolution needs a window a human can
    /// reach.
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// Per-keystroke delay bounds in milliseconds.
    pub typing_delay_ms: (u64, u64),
    /// Overrides the built-in user-agent pool when non-empty.
    pub user_agents: Vec<String>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            headless: false,
            window_width: 1366,
            window_height: 768,
            typing_delay_ms: (50, 250),
            user_agents: Vec::new(),
        }
    }
}

impl DriverSettings {
    fn pick_user_agent(&self) -> String {
        let mut rng = rand::rng();
        if self.user_agents.is_empty() {
            let i = rng.random_range(0..USER_AGENTS.len());
            USER_AGENTS[i].to_string()
        } else {
            let i = rng.random_range(0..self.user_agents.len());
            self.user_agents[i].clone()
        }
    }
}

pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    typing_delay_ms: (u64, u64),
}

impl ChromeDriver {
    /// Launch a browser and open the single working tab.
    pub async fn launch(settings: &DriverSettings) -> Result<Self> {
        let ua = settings.pick_user_agent();
        let mut builder = BrowserConfig::builder()
            .window_size(settings.window_width, settings.window_height)
            .args(vec![
                "--disable-blink-features=AutomationControlled".to_string(),
                "--disable-infobars".to_string(),
                "--no-first-run".to_string(),
                "--no-default-browser-check".to_string(),
                format!("--user-agent={ua}"),
            ]);
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(|e| anyhow!("browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("launching browser")?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = ?e, "cdp handler event error");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("opening working tab")?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
            STEALTH_SCRIPT.to_string(),
        ))
        .await
        .context("injecting init script")?;

        tracing::info!(user_agent = %ua, headless = settings.headless, "browser ready");

        Ok(Self {
            browser,
            page,
            handler_task,
            typing_delay_ms: settings.typing_delay_ms,
        })
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("navigating to {url}"))?;
        Ok(())
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let started = Instant::now();
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(true);
            }
            if started.elapsed() >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn query(&self, selector: &str) -> Result<Option<Box<dyn PageElement>>> {
        match self.page.find_element(selector).await {
            Ok(el) => Ok(Some(Box::new(ChromeElement {
                inner: el,
                typing_delay_ms: self.typing_delay_ms,
            }))),
            Err(_) => Ok(None),
        }
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn PageElement>>> {
        let els = self.page.find_elements(selector).await.unwrap_or_default();
        Ok(els
            .into_iter()
            .map(|inner| {
                Box::new(ChromeElement {
                    inner,
                    typing_delay_ms: self.typing_delay_ms,
                }) as Box<dyn PageElement>
            })
            .collect())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.page
            .save_screenshot(ScreenshotParams::builder().build(), path)
            .await
            .with_context(|| format!("saving screenshot to {}", path.display()))?;
        Ok(())
    }

    async fn quit(&mut self) -> Result<()> {
        if let Err(e) = self.browser.close().await {
            tracing::debug!(error = ?e, "browser close");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        tracing::info!("browser closed");
        Ok(())
    }
}

struct ChromeElement {
    inner: Element,
    typing_delay_ms: (u64, u64),
}

#[async_trait]
impl PageElement for ChromeElement {
    async fn text(&self) -> Result<String> {
        let text = self.inner.inner_text().await.context("reading text")?;
        Ok(text.unwrap_or_default().trim().to_string())
    }

    async fn attr(&self, name: &str) -> Result<Option<String>> {
        self.inner
            .attribute(name)
            .await
            .with_context(|| format!("reading attribute {name}"))
    }

    async fn find(&self, selector: &str) -> Result<Option<Box<dyn PageElement>>> {
        match self.inner.find_element(selector).await {
            Ok(el) => Ok(Some(Box::new(ChromeElement {
                inner: el,
                typing_delay_ms: self.typing_delay_ms,
            }))),
            Err(_) => Ok(None),
        }
    }

    /// Keystroke-at-a-time with jittered delays, the way a person types.
    async fn type_text(&self, text: &str) -> Result<()> {
        self.inner.click().await.context("focusing field")?;
        let (lo, hi) = self.typing_delay_ms;
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            self.inner
                .type_str(ch.encode_utf8(&mut buf))
                .await
                .context("typing")?;
            let delay = rand::rng().random_range(lo..=hi.max(lo));
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(())
    }

    async fn click(&self) -> Result<()> {
        self.inner.click().await.context("clicking element")?;
        Ok(())
    }
}
