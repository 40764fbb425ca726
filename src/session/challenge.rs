// src/session/challenge.rs
//
// Challenges are adversarial and not reliably solvable headlessly. The
// contract here is "pause and surface to a human", not "solve": detection is
// best-effort, the wait is bounded, and after it we optimistically carry on
// (the caller's next step fails naturally if the challenge persisted).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};

use crate::driver::PageDriver;
use crate::site::SiteProfile;

pub const DEFAULT_CHALLENGE_WAIT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChallengeState {
    #[default]
    Idle,
    /// A challenge widget is on the page and we are waiting for a human.
    AwaitingOperator,
}

/// Lets an operator (or a test) release a pending challenge wait early.
#[derive(Clone)]
pub struct ChallengeResolver {
    notify: Arc<Notify>,
}

impl ChallengeResolver {
    pub fn release(&self) {
        self.notify.notify_one();
    }
}

pub struct ChallengeHandler {
    profile: SiteProfile,
    wait: Duration,
    state_tx: watch::Sender<ChallengeState>,
    resolve: Arc<Notify>,
}

impl ChallengeHandler {
    pub fn new(profile: SiteProfile) -> Self {
        let (state_tx, _) = watch::channel(ChallengeState::Idle);
        Self {
            profile,
            wait: DEFAULT_CHALLENGE_WAIT,
            state_tx,
            resolve: Arc::new(Notify::new()),
        }
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Observable state, for operators and tests.
    pub fn state(&self) -> watch::Receiver<ChallengeState> {
        self.state_tx.subscribe()
    }

    pub fn resolver(&self) -> ChallengeResolver {
        ChallengeResolver {
            notify: Arc::clone(&self.resolve),
        }
    }

    /// Check for a challenge and, if present, pause for manual resolution.
    ///
    /// Never fails and never blocks longer than the configured wait. Returns
    /// whether a challenge was seen, so the owning session can record it.
    pub async fn check_and_wait(&self, driver: &dyn PageDriver) -> bool {
        if !self.detect(driver).await {
            return false;
        }

        tracing::warn!(
            wait_secs = self.wait.as_secs(),
            "anti-automation challenge detected; complete the verification in the browser window"
        );
        self.pause_for_operator("challenge", self.wait).await;
        true
    }

    /// Bounded, observable pause for manual intervention. Also used by the
    /// session manager for the secondary security-question prompt.
    pub async fn pause_for_operator(&self, reason: &str, wait: Duration) {
        let _ = self.state_tx.send(ChallengeState::AwaitingOperator);

        tokio::select! {
            _ = self.resolve.notified() => {
                tracing::info!(reason, "operator wait released early");
            }
            _ = tokio::time::sleep(wait) => {
                // Non-fatal: the next navigation step will tell us whether the
                // obstacle actually cleared.
                tracing::warn!(reason, "operator wait elapsed without confirmation");
            }
        }

        let _ = self.state_tx.send(ChallengeState::Idle);
    }

    /// Two independent probes: the site's challenge-frame marker, and a
    /// generic sweep over iframe sources.
    async fn detect(&self, driver: &dyn PageDriver) -> bool {
        match driver.query(&self.profile.challenge_frame).await {
            Ok(Some(_)) => {
                tracing::info!("challenge detected via frame marker");
                return true;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = ?e, "challenge frame probe failed");
            }
        }

        match driver.query_all("iframe").await {
            Ok(frames) => {
                for frame in frames {
                    if let Ok(Some(src)) = frame.attr("src").await {
                        if src.contains(&self.profile.challenge_src_marker) {
                            tracing::info!("challenge detected via iframe source");
                            return true;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = ?e, "iframe sweep failed");
            }
        }
        false
    }
}
