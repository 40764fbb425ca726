// src/monitor.rs
use std::time::Duration;

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tokio::sync::watch;

use crate::dedup::DeduplicationTracker;
use crate::notify::NotifierMux;
use crate::scan::{ListingScanner, ScanError};
use crate::session::{AuthError, Credentials, SessionManager};

/// One-time metrics registration (so series show up on whatever recorder the
/// embedder installs).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("monitor_cycles_total", "Completed monitoring cycles.");
        describe_counter!("monitor_postings_new_total", "Postings that passed dedup.");
        describe_counter!(
            "monitor_notify_failures_total",
            "Notification dispatches that failed."
        );
        describe_counter!("monitor_scan_errors_total", "Scan attempts that errored.");
        describe_gauge!("monitor_last_cycle_ts", "Unix ts of the last cycle.");
    });
}

/// Everything one monitoring run owns: the session, the seen-set, the
/// notifier fan-out, and the cadence. Lives exactly as long as the run.
pub struct MonitorLoop {
    session: SessionManager,
    scanner: ListingScanner,
    tracker: DeduplicationTracker,
    notifiers: NotifierMux,
    credentials: Credentials,
    query: String,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
    /// Re-run the full login flow next cycle (startup, or after a transport
    /// failure). Deliberately not set after `Unconfirmed`: hammering the
    /// login form while a human finishes verification only invites more
    /// challenges.
    needs_login: bool,
}

impl MonitorLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: SessionManager,
        scanner: ListingScanner,
        tracker: DeduplicationTracker,
        notifiers: NotifierMux,
        credentials: Credentials,
        query: String,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            session,
            scanner,
            tracker,
            notifiers,
            credentials,
            query,
            interval,
            shutdown,
            needs_login: true,
        }
    }

    /// Run until cancelled. Returns `Err` only on an unrecoverable
    /// structural authentication failure; everything transient is absorbed
    /// into "zero new postings this cycle".
    pub async fn run(mut self) -> Result<()> {
        ensure_metrics_described();
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            query = %self.query,
            "monitor started"
        );

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            match self.cycle().await {
                Ok(new_count) => {
                    if new_count == 0 {
                        tracing::info!("no new postings this cycle");
                    }
                }
                Err(e) => {
                    // Likely a misconfigured credential or a redesigned login
                    // page; retrying forever would only burn the account.
                    tracing::error!(error = %e, "unrecoverable authentication failure");
                    self.session.teardown().await;
                    return Err(e.into());
                }
            }

            counter!("monitor_cycles_total").increment(1);
            gauge!("monitor_last_cycle_ts").set(chrono::Utc::now().timestamp() as f64);

            tracing::info!(
                secs = self.interval.as_secs(),
                "sleeping until next cycle"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shutdown.changed() => {}
            }
        }

        tracing::info!("shutdown requested, cleaning up");
        self.session.logout().await;
        self.session.teardown().await;
        Ok(())
    }

    /// One scan → dedup → notify pass. `Err` only for structural auth
    /// failures; transient trouble is logged and yields `Ok(0)`.
    async fn cycle(&mut self) -> Result<usize, AuthError> {
        self.ensure_authenticated().await?;

        let scanned = match self.scanner.scan(self.session.driver(), &self.query).await {
            Ok(postings) => postings,
            Err(ScanError::Timeout) => {
                tracing::warn!("listing container never appeared; treating as no results");
                counter!("monitor_scan_errors_total").increment(1);
                return Ok(0);
            }
            Err(ScanError::Unexpected(e)) => {
                tracing::warn!(error = %e, "scan failed");
                counter!("monitor_scan_errors_total").increment(1);
                return Ok(0);
            }
        };

        let fresh = self.tracker.filter(scanned);
        counter!("monitor_postings_new_total").increment(fresh.len() as u64);

        if fresh.is_empty() {
            return Ok(0);
        }
        tracing::info!(count = fresh.len(), "new matching postings");

        let mut failures = 0;
        for posting in &fresh {
            failures += self.notifiers.notify(posting).await;
        }
        if failures > 0 {
            counter!("monitor_notify_failures_total").increment(failures as u64);
        }
        Ok(fresh.len())
    }

    /// Make sure the session is usable before scanning. Structural failures
    /// bubble; transport failures mark the login for retry next cycle;
    /// `Unconfirmed` keeps the session and relies on the out-of-band
    /// re-probe.
    async fn ensure_authenticated(&mut self) -> Result<(), AuthError> {
        if self.session.is_authenticated() {
            return Ok(());
        }
        if self.session.refresh_auth_state().await {
            return Ok(());
        }
        if !self.needs_login {
            tracing::info!("still awaiting out-of-band login confirmation");
            return Ok(());
        }

        match self.session.authenticate(&self.credentials).await {
            Ok(()) => {
                self.needs_login = false;
                Ok(())
            }
            Err(e @ AuthError::StructuralMismatch { .. }) => Err(e),
            Err(AuthError::Unconfirmed { waited_secs }) => {
                tracing::warn!(
                    waited_secs,
                    "login unconfirmed; keeping session for manual completion"
                );
                self.needs_login = false;
                Ok(())
            }
            Err(AuthError::Transport { stage, source }) => {
                tracing::warn!(stage, error = %source, "login transport failure; will retry");
                Ok(())
            }
        }
    }
}
