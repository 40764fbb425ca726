// tests/common/mod.rs
// Scripted PageDriver used by the integration tests: page state is a plain
// struct the test mutates between cycles, selectors match the default
// SiteProfile.
#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use jobwatch::driver::{PageDriver, PageElement};

#[derive(Debug, Clone, Default)]
pub struct FakeCard {
    /// (attribute name, value) pair for the site-assigned id, if any.
    pub id_attr: Option<(String, String)>,
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub posted: Option<String>,
    pub budget: Option<String>,
}

impl FakeCard {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id_attr: Some(("data-job-id".to_string(), id.to_string())),
            title: Some(title.to_string()),
            link: Some(format!("/jobs/{id}")),
            description: Some(format!("Description for {title}")),
            posted: Some("1 hour ago".to_string()),
            budget: Some("$500".to_string()),
        }
    }

    pub fn without_id(mut self) -> Self {
        self.id_attr = None;
        self
    }

    pub fn without_budget(mut self) -> Self {
        self.budget = None;
        self
    }

    pub fn without_title(mut self) -> Self {
        self.title = None;
        self
    }
}

#[derive(Debug, Default)]
pub struct FakeState {
    /// Selectors that currently resolve to an element.
    pub present: HashSet<String>,
    /// Listing cards on the current results page.
    pub cards: Vec<FakeCard>,
    /// `src` attributes of iframes on the page.
    pub iframes: Vec<String>,
    pub visited: Vec<String>,
    pub typed: Vec<(String, String)>,
    pub clicked: Vec<String>,
    pub quit: bool,
}

impl FakeState {
    /// A page state where the whole login flow can succeed.
    pub fn logged_in_site() -> Self {
        let mut state = Self::default();
        for sel in [
            "#login_username",
            "#login_password_continue",
            "#login_password",
            "#login_control_continue",
            "nav.navbar",
        ] {
            state.present.insert(sel.to_string());
        }
        state
    }
}

#[derive(Clone)]
pub struct FakeDriver {
    pub state: Arc<Mutex<FakeState>>,
}

impl FakeDriver {
    pub fn new(state: FakeState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn handle(&self) -> Arc<Mutex<FakeState>> {
        Arc::clone(&self.state)
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.state.lock().unwrap().visited.push(url.to_string());
        Ok(())
    }

    async fn wait_for(&self, selector: &str, _timeout: Duration) -> Result<bool> {
        let state = self.state.lock().unwrap();
        if selector == "section.job-tile" {
            return Ok(!state.cards.is_empty());
        }
        Ok(state.present.contains(selector))
    }

    async fn query(&self, selector: &str) -> Result<Option<Box<dyn PageElement>>> {
        let state = self.state.lock().unwrap();
        if state.present.contains(selector) {
            return Ok(Some(Box::new(FakeField {
                selector: selector.to_string(),
                state: Arc::clone(&self.state),
            })));
        }
        Ok(None)
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn PageElement>>> {
        let state = self.state.lock().unwrap();
        if selector == "section.job-tile" {
            return Ok(state
                .cards
                .iter()
                .cloned()
                .map(|card| Box::new(FakeCardElement { card }) as Box<dyn PageElement>)
                .collect());
        }
        if selector == "iframe" {
            return Ok(state
                .iframes
                .iter()
                .cloned()
                .map(|src| Box::new(FakeIframe { src }) as Box<dyn PageElement>)
                .collect());
        }
        Ok(Vec::new())
    }

    async fn screenshot(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    async fn quit(&mut self) -> Result<()> {
        self.state.lock().unwrap().quit = true;
        Ok(())
    }
}

/// A plain interactive element (login fields, buttons).
struct FakeField {
    selector: String,
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl PageElement for FakeField {
    async fn text(&self) -> Result<String> {
        Ok(String::new())
    }

    async fn attr(&self, _name: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn find(&self, _selector: &str) -> Result<Option<Box<dyn PageElement>>> {
        Ok(None)
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .typed
            .push((self.selector.clone(), text.to_string()));
        Ok(())
    }

    async fn click(&self) -> Result<()> {
        self.state.lock().unwrap().clicked.push(self.selector.clone());
        Ok(())
    }
}

struct FakeIframe {
    src: String,
}

#[async_trait]
impl PageElement for FakeIframe {
    async fn text(&self) -> Result<String> {
        Ok(String::new())
    }

    async fn attr(&self, name: &str) -> Result<Option<String>> {
        Ok((name == "src").then(|| self.src.clone()))
    }

    async fn find(&self, _selector: &str) -> Result<Option<Box<dyn PageElement>>> {
        Ok(None)
    }

    async fn type_text(&self, _text: &str) -> Result<()> {
        Ok(())
    }

    async fn click(&self) -> Result<()> {
        Ok(())
    }
}

/// One listing card; sub-selectors map onto the default SiteProfile.
struct FakeCardElement {
    card: FakeCard,
}

#[async_trait]
impl PageElement for FakeCardElement {
    async fn text(&self) -> Result<String> {
        Ok(String::new())
    }

    async fn attr(&self, name: &str) -> Result<Option<String>> {
        match &self.card.id_attr {
            Some((attr, value)) if attr == name => Ok(Some(value.clone())),
            _ => Ok(None),
        }
    }

    async fn find(&self, selector: &str) -> Result<Option<Box<dyn PageElement>>> {
        let (text, link) = match selector {
            "h2 a" => match (&self.card.title, &self.card.link) {
                (Some(title), link) => (title.clone(), link.clone()),
                _ => return Ok(None),
            },
            ".job-description-text" => match &self.card.description {
                Some(d) => (d.clone(), None),
                None => return Ok(None),
            },
            "span.job-created-at" => match &self.card.posted {
                Some(p) => (p.clone(), None),
                None => return Ok(None),
            },
            ".up-budget span" => match &self.card.budget {
                Some(b) => (b.clone(), None),
                None => return Ok(None),
            },
            _ => return Ok(None),
        };
        Ok(Some(Box::new(FakeTextElement { text, href: link })))
    }

    async fn type_text(&self, _text: &str) -> Result<()> {
        Ok(())
    }

    async fn click(&self) -> Result<()> {
        Ok(())
    }
}

struct FakeTextElement {
    text: String,
    href: Option<String>,
}

#[async_trait]
impl PageElement for FakeTextElement {
    async fn text(&self) -> Result<String> {
        Ok(self.text.clone())
    }

    async fn attr(&self, name: &str) -> Result<Option<String>> {
        if name == "href" {
            Ok(self.href.clone())
        } else {
            Ok(None)
        }
    }

    async fn find(&self, _selector: &str) -> Result<Option<Box<dyn PageElement>>> {
        Ok(None)
    }

    async fn type_text(&self, _text: &str) -> Result<()> {
        Ok(())
    }

    async fn click(&self) -> Result<()> {
        Ok(())
    }
}

/// Records every posting id it is asked to deliver.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    pub delivered: Arc<Mutex<Vec<String>>>,
    pub fail: bool,
}

#[async_trait]
impl jobwatch::Notifier for RecordingNotifier {
    async fn notify(&self, posting: &jobwatch::Posting) -> Result<(), jobwatch::NotifyError> {
        self.delivered.lock().unwrap().push(posting.id.clone());
        if self.fail {
            return Err(jobwatch::NotifyError::TransportFailure(anyhow::anyhow!(
                "synthetic failure"
            )));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
