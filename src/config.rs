// src/config.rs
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::dedup::SeenPolicy;
use crate::driver::chrome::DriverSettings;
use crate::site::SiteProfile;

/// Keyword set used when the operator configures none.
pub fn default_keywords() -> Vec<String> {
    ["DevOps", "Docker", "Kubernetes", "AWS", "CI/CD", "Jenkins", "Terraform"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    pub host: String,
    pub user: String,
    pub pass: String,
    pub from: String,
    pub to: String,
}

impl SmtpSettings {
    pub fn is_complete(&self) -> bool {
        !self.host.is_empty()
            && !self.user.is_empty()
            && !self.pass.is_empty()
            && !self.from.is_empty()
            && !self.to.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub username: String,
    pub password: String,
    #[serde(alias = "interval_secs")]
    pub check_interval_secs: u64,
    pub keywords: Vec<String>,
    pub seen_policy: SeenPolicy,
    /// Question-substring -> answer. Logged as available when the matching
    /// prompt appears; never typed automatically.
    pub security_answers: HashMap<String, String>,
    pub smtp: Option<SmtpSettings>,
    pub webhook_url: Option<String>,
    pub driver: DriverSettings,
    pub site: SiteProfile,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            check_interval_secs: default_interval(),
            keywords: default_keywords(),
            seen_policy: SeenPolicy::default(),
            security_answers: HashMap::new(),
            smtp: None,
            webhook_url: None,
            driver: DriverSettings::default(),
            site: SiteProfile::default(),
        }
    }
}

impl Settings {
    /// Load settings: optional TOML or JSON file, then environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(p) => {
                let content = fs::read_to_string(p)
                    .with_context(|| format!("reading settings from {}", p.display()))?;
                let ext = p
                    .extension()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                parse_settings(&content, &ext)?
            }
            None => Settings::default(),
        };
        settings.apply_env();
        Ok(settings)
    }

    /// Environment variables win over the file.
    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("MARKETPLACE_USERNAME") {
            self.username = v;
        }
        if let Ok(v) = std::env::var("MARKETPLACE_PASSWORD") {
            self.password = v;
        }
        if let Ok(v) = std::env::var("CHECK_INTERVAL_SECS") {
            if let Ok(secs) = v.parse() {
                self.check_interval_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("MONITOR_KEYWORDS") {
            let kws = split_keywords(&v);
            if !kws.is_empty() {
                self.keywords = kws;
            }
        }
        if let Ok(v) = std::env::var("NOTIFY_WEBHOOK_URL") {
            self.webhook_url = Some(v);
        }

        let mut smtp = self.smtp.take().unwrap_or_default();
        if let Ok(v) = std::env::var("SMTP_HOST") {
            smtp.host = v;
        }
        if let Ok(v) = std::env::var("SMTP_USER") {
            smtp.user = v;
        }
        if let Ok(v) = std::env::var("SMTP_PASS") {
            smtp.pass = v;
        }
        if let Ok(v) = std::env::var("NOTIFY_EMAIL_FROM") {
            smtp.from = v;
        }
        if let Ok(v) = std::env::var("NOTIFY_EMAIL_TO") {
            smtp.to = v;
        }
        if smtp.is_complete() {
            self.smtp = Some(smtp);
        }
    }

    /// Credentials are the one thing the monitor cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(anyhow!(
                "marketplace credentials missing; set MARKETPLACE_USERNAME and MARKETPLACE_PASSWORD"
            ));
        }
        if self.smtp.is_none() && self.webhook_url.is_none() {
            tracing::warn!("no notification channel configured; new postings will only be logged");
        }
        Ok(())
    }
}

pub fn split_keywords(s: &str) -> Vec<String> {
    s.split(',')
        .map(|kw| kw.trim().to_string())
        .filter(|kw| !kw.is_empty())
        .collect()
}

fn parse_settings(content: &str, hint_ext: &str) -> Result<Settings> {
    // Try TOML first if hinted or content looks like toml.
    let try_toml = hint_ext == "toml" || content.contains('[');
    if try_toml {
        if let Ok(v) = toml::from_str(content) {
            return Ok(v);
        }
    }
    if let Ok(v) = serde_json::from_str(content) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = toml::from_str(content) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported settings format (expected TOML or JSON)"))
}
