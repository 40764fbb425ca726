//! Marketplace job monitor — binary entrypoint.
//! Wires settings, the browser driver, the session, and the monitor loop.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jobwatch::config::{split_keywords, Settings};
use jobwatch::driver::chrome::ChromeDriver;
use jobwatch::notify::email::EmailNotifier;
use jobwatch::notify::webhook::WebhookNotifier;
use jobwatch::{
    Credentials, DeduplicationTracker, ListingScanner, MonitorLoop, NotifierMux, SessionManager,
};

#[derive(Debug, Parser)]
#[command(name = "jobwatch", about = "Monitor a freelance marketplace for new job postings")]
struct Args {
    /// Path to a TOML or JSON settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Check interval in seconds (overrides the settings file).
    #[arg(long)]
    interval: Option<u64>,

    /// Comma-separated search keywords (overrides the settings file).
    #[arg(long)]
    keywords: Option<String>,

    /// Run the browser headless (challenges then require the webhook/log
    /// surface to be noticed).
    #[arg(long)]
    headless: bool,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jobwatch=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when the vars come from the environment.
    let _ = dotenvy::dotenv();
    init_tracing();

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(interval) = args.interval {
        settings.check_interval_secs = interval;
    }
    if let Some(raw) = args.keywords.as_deref() {
        let kws = split_keywords(raw);
        if !kws.is_empty() {
            settings.keywords = kws;
        }
    }
    if args.headless {
        settings.driver.headless = true;
    }
    settings.validate()?;

    let driver = ChromeDriver::launch(&settings.driver).await?;
    let session = SessionManager::new(Box::new(driver), settings.site.clone())
        .with_security_answers(settings.security_answers.clone());
    let scanner = ListingScanner::new(settings.site.clone(), settings.keywords.clone());
    let tracker = DeduplicationTracker::new(settings.seen_policy);

    let mut notifiers = NotifierMux::new();
    if let Some(smtp) = &settings.smtp {
        notifiers.push(Box::new(EmailNotifier::new(smtp)?));
    }
    if let Some(url) = &settings.webhook_url {
        notifiers.push(Box::new(WebhookNotifier::new(url.clone())));
    }

    let credentials = Credentials {
        username: settings.username.clone(),
        password: settings.password.clone(),
    };
    // The search query is the first keyword; the title filter still applies
    // the whole list.
    let query = settings
        .keywords
        .first()
        .cloned()
        .unwrap_or_else(|| "DevOps".to_string());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, finishing current cycle");
            let _ = shutdown_tx.send(true);
        }
    });

    MonitorLoop::new(
        session,
        scanner,
        tracker,
        notifiers,
        credentials,
        query,
        Duration::from_secs(settings.check_interval_secs),
        shutdown_rx,
    )
    .run()
    .await
}
