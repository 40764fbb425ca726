// tests/monitor_cycle.rs
mod common;

use std::time::Duration;

use tokio::sync::watch;

use common::{FakeCard, FakeDriver, FakeState, RecordingNotifier};
use jobwatch::{
    Credentials, DeduplicationTracker, ListingScanner, MonitorLoop, NotifierMux, SeenPolicy,
    SessionManager, SiteProfile,
};

async fn wait_until(f: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(3600), async {
        while !f() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("condition never reached");
}

fn monitor_parts(
    driver: FakeDriver,
    keywords: &[&str],
) -> (SessionManager, ListingScanner, DeduplicationTracker) {
    let profile = SiteProfile::default();
    let session = SessionManager::new(Box::new(driver), profile.clone());
    let scanner = ListingScanner::new(profile, keywords.iter().map(|s| s.to_string()).collect());
    let tracker = DeduplicationTracker::new(SeenPolicy::ReplaceEachCycle);
    (session, scanner, tracker)
}

fn credentials() -> Credentials {
    Credentials {
        username: "operator@example.test".into(),
        password: "hunter2".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn postings_notify_once_and_new_ones_are_picked_up() {
    let mut state = FakeState::logged_in_site();
    state.cards = vec![FakeCard::new("123", "Senior DevOps Engineer")];
    let driver = FakeDriver::new(state);
    let page = driver.handle();

    let (session, scanner, tracker) = monitor_parts(driver, &["DevOps", "Kubernetes"]);
    let notifier = RecordingNotifier::default();
    let delivered = notifier.delivered.clone();
    let mut mux = NotifierMux::new();
    mux.push(Box::new(notifier));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = MonitorLoop::new(
        session,
        scanner,
        tracker,
        mux,
        credentials(),
        "DevOps".into(),
        Duration::from_secs(300),
        shutdown_rx,
    );
    let run = tokio::spawn(monitor.run());

    // Cycle 1: posting 123 is new and notified exactly once.
    wait_until(|| !delivered.lock().unwrap().is_empty()).await;
    assert_eq!(*delivered.lock().unwrap(), vec!["123".to_string()]);

    // Cycle 2: 123 is still on the page, 124 appears. Only 124 notifies.
    page.lock()
        .unwrap()
        .cards
        .push(FakeCard::new("124", "Kubernetes SRE"));
    wait_until(|| delivered.lock().unwrap().len() >= 2).await;
    assert_eq!(
        *delivered.lock().unwrap(),
        vec!["123".to_string(), "124".into()]
    );

    // Many further identical cycles stay quiet.
    tokio::time::sleep(Duration::from_secs(3000)).await;
    assert_eq!(delivered.lock().unwrap().len(), 2);

    shutdown_tx.send(true).unwrap();
    run.await.unwrap().unwrap();
    assert!(page.lock().unwrap().quit, "shutdown must quit the browser");
}

#[tokio::test(start_paused = true)]
async fn non_matching_titles_are_never_notified() {
    let mut state = FakeState::logged_in_site();
    state.cards = vec![
        FakeCard::new("1", "Graphic design"),
        FakeCard::new("2", "Infra DevOps contractor needed"),
    ];
    let driver = FakeDriver::new(state);
    let page = driver.handle();

    let (session, scanner, tracker) = monitor_parts(driver, &["DevOps"]);
    let notifier = RecordingNotifier::default();
    let delivered = notifier.delivered.clone();
    let mut mux = NotifierMux::new();
    mux.push(Box::new(notifier));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = tokio::spawn(
        MonitorLoop::new(
            session,
            scanner,
            tracker,
            mux,
            credentials(),
            "DevOps".into(),
            Duration::from_secs(300),
            shutdown_rx,
        )
        .run(),
    );

    wait_until(|| !delivered.lock().unwrap().is_empty()).await;
    assert_eq!(*delivered.lock().unwrap(), vec!["2".to_string()]);

    shutdown_tx.send(true).unwrap();
    run.await.unwrap().unwrap();
    let _ = page;
}

#[tokio::test(start_paused = true)]
async fn failed_dispatch_is_not_retried_and_does_not_block_other_channels() {
    let mut state = FakeState::logged_in_site();
    state.cards = vec![FakeCard::new("123", "Senior DevOps Engineer")];
    let driver = FakeDriver::new(state);
    let page = driver.handle();

    let (session, scanner, tracker) = monitor_parts(driver, &["DevOps", "Kubernetes"]);
    let failing = RecordingNotifier {
        fail: true,
        ..Default::default()
    };
    let healthy = RecordingNotifier::default();
    let failed_log = failing.delivered.clone();
    let healthy_log = healthy.delivered.clone();
    let mut mux = NotifierMux::new();
    mux.push(Box::new(failing));
    mux.push(Box::new(healthy));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = tokio::spawn(
        MonitorLoop::new(
            session,
            scanner,
            tracker,
            mux,
            credentials(),
            "DevOps".into(),
            Duration::from_secs(300),
            shutdown_rx,
        )
        .run(),
    );

    // The failing channel does not stop the healthy one.
    wait_until(|| !healthy_log.lock().unwrap().is_empty()).await;
    assert_eq!(*healthy_log.lock().unwrap(), vec!["123".to_string()]);

    // A new posting still flows; the failed 123 dispatch is never retried
    // because the id is already marked seen.
    page.lock()
        .unwrap()
        .cards
        .push(FakeCard::new("124", "Kubernetes SRE"));
    wait_until(|| healthy_log.lock().unwrap().len() >= 2).await;
    tokio::time::sleep(Duration::from_secs(1500)).await;
    assert_eq!(
        *failed_log.lock().unwrap(),
        vec!["123".to_string(), "124".into()]
    );

    shutdown_tx.send(true).unwrap();
    run.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn structural_login_failure_stops_the_loop_with_teardown() {
    // No login form at all: the username field never appears.
    let mut state = FakeState::default();
    state.cards = vec![FakeCard::new("123", "Senior DevOps Engineer")];
    let driver = FakeDriver::new(state);
    let page = driver.handle();

    let (session, scanner, tracker) = monitor_parts(driver, &["DevOps"]);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let result = MonitorLoop::new(
        session,
        scanner,
        tracker,
        NotifierMux::new(),
        credentials(),
        "DevOps".into(),
        Duration::from_secs(300),
        shutdown_rx,
    )
    .run()
    .await;

    assert!(result.is_err());
    assert!(page.lock().unwrap().quit, "fatal auth error must tear down");
}

#[tokio::test(start_paused = true)]
async fn empty_results_page_is_a_quiet_cycle() {
    // Login works but the listing container never shows up.
    let state = FakeState::logged_in_site();
    let driver = FakeDriver::new(state);

    let (session, scanner, tracker) = monitor_parts(driver, &["DevOps"]);
    let notifier = RecordingNotifier::default();
    let delivered = notifier.delivered.clone();
    let mut mux = NotifierMux::new();
    mux.push(Box::new(notifier));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = tokio::spawn(
        MonitorLoop::new(
            session,
            scanner,
            tracker,
            mux,
            credentials(),
            "DevOps".into(),
            Duration::from_secs(300),
            shutdown_rx,
        )
        .run(),
    );

    // Several cycles pass without postings and without the loop dying.
    tokio::time::sleep(Duration::from_secs(1800)).await;
    assert!(delivered.lock().unwrap().is_empty());

    shutdown_tx.send(true).unwrap();
    run.await.unwrap().unwrap();
}
