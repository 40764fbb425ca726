// src/session/mod.rs
pub mod challenge;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use thiserror::Error;
use tokio::sync::watch;

use crate::driver::PageDriver;
use crate::site::SiteProfile;
use self::challenge::{ChallengeHandler, ChallengeResolver, ChallengeState};

pub const DEFAULT_SECURITY_WAIT: Duration = Duration::from_secs(60);
const FIELD_TIMEOUT: Duration = Duration::from_secs(10);
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// A required page element never appeared. Fatal to the session: its
    /// owner must tear down and request a new one.
    #[error("login page structure mismatch at {stage}: {detail}")]
    StructuralMismatch { stage: &'static str, detail: String },

    /// The post-login marker never showed up. The session is kept with
    /// `authenticated = false`; a human may still complete verification in
    /// the open browser window.
    #[error("could not confirm login within {waited_secs}s")]
    Unconfirmed { waited_secs: u64 },

    /// Navigation/transport failure. Transient; the monitor loop retries on
    /// a later cycle.
    #[error("transport failure at {stage}: {source}")]
    Transport {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Owns the one authenticated browsing session and runs the login state
/// machine. Challenges may appear before, between, or after the credential
/// steps, so the handler is consulted around each one.
pub struct SessionManager {
    driver: Box<dyn PageDriver>,
    profile: SiteProfile,
    challenges: ChallengeHandler,
    security_answers: HashMap<String, String>,
    security_wait: Duration,
    screenshot_dir: PathBuf,
    authenticated: bool,
    last_challenge_at: Option<DateTime<Utc>>,
}

impl SessionManager {
    pub fn new(driver: Box<dyn PageDriver>, profile: SiteProfile) -> Self {
        let challenges = ChallengeHandler::new(profile.clone());
        Self {
            driver,
            profile,
            challenges,
            security_answers: HashMap::new(),
            security_wait: DEFAULT_SECURITY_WAIT,
            screenshot_dir: PathBuf::from("."),
            authenticated: false,
            last_challenge_at: None,
        }
    }

    pub fn with_security_answers(mut self, answers: HashMap<String, String>) -> Self {
        self.security_answers = answers;
        self
    }

    pub fn with_security_wait(mut self, wait: Duration) -> Self {
        self.security_wait = wait;
        self
    }

    pub fn with_challenge_wait(mut self, wait: Duration) -> Self {
        self.challenges = ChallengeHandler::new(self.profile.clone()).with_wait(wait);
        self
    }

    pub fn with_screenshot_dir(mut self, dir: PathBuf) -> Self {
        self.screenshot_dir = dir;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn last_challenge_at(&self) -> Option<DateTime<Utc>> {
        self.last_challenge_at
    }

    /// The active driver handle, for the scanner.
    pub fn driver(&self) -> &dyn PageDriver {
        self.driver.as_ref()
    }

    pub fn challenge_state(&self) -> watch::Receiver<ChallengeState> {
        self.challenges.state()
    }

    pub fn challenge_resolver(&self) -> ChallengeResolver {
        self.challenges.resolver()
    }

    /// Run the full login flow.
    pub async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), AuthError> {
        if credentials.username.is_empty() || credentials.password.is_empty() {
            return Err(AuthError::StructuralMismatch {
                stage: "credentials",
                detail: "username and password must be non-empty".into(),
            });
        }

        self.goto_login_page().await?;
        self.check_challenge().await;

        // Username step.
        self.await_field("username field", &self.profile.username_field)
            .await?;
        self.type_into(
            "username field",
            &self.profile.username_field,
            &credentials.username,
        )
        .await?;
        human_pause(1, 2).await;
        self.click("continue button", &self.profile.username_continue)
            .await?;
        self.check_challenge().await;

        // Password step.
        self.await_field("password field", &self.profile.password_field)
            .await?;
        self.type_into(
            "password field",
            &self.profile.password_field,
            &credentials.password,
        )
        .await?;
        human_pause(1, 2).await;
        self.click("login button", &self.profile.login_submit)
            .await?;
        human_pause(3, 5).await;
        self.check_challenge().await;

        self.handle_security_question().await;

        // Success is a post-login-only marker appearing within the bound.
        let confirmed = self
            .driver
            .wait_for(&self.profile.logged_in_marker, CONFIRM_TIMEOUT)
            .await
            .map_err(|e| AuthError::Transport {
                stage: "login confirmation",
                source: e,
            })?;
        if confirmed {
            tracing::info!("login confirmed");
            self.authenticated = true;
            Ok(())
        } else {
            // Keep the session: the operator can finish verification in the
            // open window and the monitor picks it up on a later cycle.
            tracing::warn!("could not confirm login; leaving the browser window as-is");
            self.save_diagnostic("login_unconfirmed.png").await;
            self.authenticated = false;
            Err(AuthError::Unconfirmed {
                waited_secs: CONFIRM_TIMEOUT.as_secs(),
            })
        }
    }

    /// Quick re-probe of the post-login marker, for sessions an operator may
    /// have completed out-of-band after an `Unconfirmed` login.
    pub async fn refresh_auth_state(&mut self) -> bool {
        if self.authenticated {
            return true;
        }
        match self
            .driver
            .wait_for(&self.profile.logged_in_marker, Duration::from_secs(2))
            .await
        {
            Ok(true) => {
                tracing::info!("login confirmed out-of-band");
                self.authenticated = true;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = ?e, "auth re-probe failed");
            }
        }
        self.authenticated
    }

    /// Best-effort logout through the user menu.
    pub async fn logout(&mut self) {
        if !self.authenticated {
            return;
        }
        if self.click("user menu", &self.profile.user_menu).await.is_ok() {
            human_pause(1, 2).await;
            if self
                .click("logout link", &self.profile.logout_link)
                .await
                .is_ok()
            {
                tracing::info!("logged out");
            }
        }
        self.authenticated = false;
    }

    /// Quit the browser. The session is unusable afterwards.
    pub async fn teardown(&mut self) {
        self.authenticated = false;
        if let Err(e) = self.driver.quit().await {
            tracing::warn!(error = ?e, "driver teardown");
        }
    }

    async fn goto_login_page(&self) -> Result<(), AuthError> {
        self.driver
            .navigate(&self.profile.base_url)
            .await
            .map_err(|e| AuthError::Transport {
                stage: "landing page",
                source: e,
            })?;
        human_pause(1, 3).await;

        // Entering through the login link looks more natural than jumping to
        // the form URL; fall back to the direct URL when the link is absent.
        let mut entered = false;
        if let Ok(Some(el)) = self.driver.query(&self.profile.login_link).await {
            if el.click().await.is_ok() {
                tracing::info!("entered login via landing-page link");
                entered = true;
            }
        }
        if !entered {
            self.driver
                .navigate(&self.profile.login_url)
                .await
                .map_err(|e| AuthError::Transport {
                    stage: "login page",
                    source: e,
                })?;
            tracing::info!("navigated directly to login page");
        }
        human_pause(2, 4).await;
        Ok(())
    }

    async fn check_challenge(&mut self) {
        if self.challenges.check_and_wait(self.driver.as_ref()).await {
            self.last_challenge_at = Some(Utc::now());
        }
    }

    /// The secondary security-question prompt. Answers are operator
    /// configuration to be applied manually, never typed by the tool.
    async fn handle_security_question(&self) {
        let form = match self.driver.query(&self.profile.security_question_form).await {
            Ok(Some(form)) => form,
            _ => {
                tracing::info!("no security question prompt");
                return;
            }
        };

        let question = match form.find(&self.profile.security_question_text).await {
            Ok(Some(el)) => el.text().await.unwrap_or_default(),
            _ => String::new(),
        };
        tracing::warn!(%question, "security question detected; answer it in the browser window");
        if let Some(key) = self
            .security_answers
            .keys()
            .find(|k| question.to_lowercase().contains(&k.to_lowercase()))
        {
            tracing::info!(question_key = %key, "a configured answer exists for this question");
        }
        self.challenges
            .pause_for_operator("security question", self.security_wait)
            .await;
    }

    async fn await_field(&self, stage: &'static str, selector: &str) -> Result<(), AuthError> {
        let appeared = self
            .driver
            .wait_for(selector, FIELD_TIMEOUT)
            .await
            .map_err(|e| AuthError::Transport { stage, source: e })?;
        if appeared {
            Ok(())
        } else {
            self.save_diagnostic("login_error.png").await;
            Err(AuthError::StructuralMismatch {
                stage,
                detail: format!("`{selector}` never appeared"),
            })
        }
    }

    async fn type_into(
        &self,
        stage: &'static str,
        selector: &str,
        text: &str,
    ) -> Result<(), AuthError> {
        let el = self
            .driver
            .query(selector)
            .await
            .map_err(|e| AuthError::Transport { stage, source: e })?
            .ok_or_else(|| AuthError::StructuralMismatch {
                stage,
                detail: format!("`{selector}` disappeared before input"),
            })?;
        el.type_text(text)
            .await
            .map_err(|e| AuthError::Transport { stage, source: e })?;
        tracing::info!(stage, "entered value");
        Ok(())
    }

    async fn click(&self, stage: &'static str, selector: &str) -> Result<(), AuthError> {
        let el = self
            .driver
            .query(selector)
            .await
            .map_err(|e| AuthError::Transport { stage, source: e })?
            .ok_or_else(|| AuthError::StructuralMismatch {
                stage,
                detail: format!("`{selector}` not found"),
            })?;
        el.click()
            .await
            .map_err(|e| AuthError::Transport { stage, source: e })?;
        tracing::info!(stage, "clicked");
        Ok(())
    }

    async fn save_diagnostic(&self, name: &str) {
        let path = self.screenshot_dir.join(name);
        if let Err(e) = self.driver.screenshot(&path).await {
            tracing::debug!(error = ?e, "diagnostic screenshot failed");
        } else {
            tracing::info!(path = %path.display(), "diagnostic screenshot saved");
        }
    }
}

/// Jittered pause between flow steps, mimicking a person moving through the
/// form.
async fn human_pause(min_secs: u64, max_secs: u64) {
    let millis = rand::rng().random_range(min_secs * 1000..=max_secs * 1000);
    tokio::time::sleep(Duration::from_millis(millis)).await;
}
