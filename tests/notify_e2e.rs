//! End-to-end run of the event loop over the native notification source.

#![cfg(target_os = "linux")]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use common::{LogDirs, label, wait_until};
use log_file_watcher::accounting::counter::BytesLoggedCounters;
use log_file_watcher::core::config::Config;
use log_file_watcher::daemon::loop_main::LogFileWatcher;
use log_file_watcher::watch::NotifySource;

const TIMEOUT: Duration = Duration::from_secs(10);

fn config_for(dirs: &LogDirs) -> Config {
    let mut config = Config::default();
    config.watch.root_dir = dirs.root().to_path_buf();
    config.resolver.poll_interval_ms = 20;
    config.resolver.max_attempts = 500;
    config.logging.debug = true;
    config
}

#[test]
fn counts_growth_rotation_and_late_targets() {
    let dirs = LogDirs::new();
    dirs.write_target("app-0.log", 100);
    let app = dirs.link("default_app-1_main.log", "app-0.log");

    let counters = Arc::new(BytesLoggedCounters::new().unwrap());
    let shutdown = Arc::new(AtomicBool::new(false));
    let (source, channels) = NotifySource::new().unwrap();
    let (mut watcher, report) = LogFileWatcher::initialize(
        &config_for(&dirs),
        source,
        channels,
        Arc::clone(&counters),
        Arc::clone(&shutdown),
    )
    .unwrap();
    assert_eq!(report.links_armed, 1);
    assert_eq!(counters.value(&label(&app)), Some(100));

    let handle = thread::spawn(move || watcher.run());

    // Growth through the link.
    dirs.append_target("app-0.log", 50);
    assert!(
        wait_until(TIMEOUT, || counters.value(&label(&app)) == Some(150)),
        "growth not counted: {:?}",
        counters.snapshot()
    );

    // Rotation: repoint the link at a fresh, smaller file.
    dirs.write_target("app-1.log", 10);
    dirs.relink("default_app-1_main.log", "app-1.log");
    assert!(
        wait_until(TIMEOUT, || counters.value(&label(&app)) == Some(160)),
        "rotation not counted: {:?}",
        counters.snapshot()
    );

    // A link that shows up before its target.
    let late = dirs.link("default_worker-1_main.log", "worker-0.log");
    thread::sleep(Duration::from_millis(100));
    assert!(counters.value(&label(&late)).is_none());
    dirs.write_target("worker-0.log", 77);
    assert!(
        wait_until(TIMEOUT, || counters.value(&label(&late)) == Some(77)),
        "late target not counted: {:?}",
        counters.snapshot()
    );

    shutdown.store(true, Ordering::Relaxed);
    let stats = handle.join().unwrap().unwrap();
    assert!(stats.events > 0);
}

#[test]
fn removing_one_of_two_links_to_a_file_keeps_the_other_counting() {
    let dirs = LogDirs::new();
    dirs.write_target("0.log", 100);
    let a = dirs.link("ns_a_c.log", "0.log");
    let b = dirs.link("ns_b_c.log", "0.log");

    let counters = Arc::new(BytesLoggedCounters::new().unwrap());
    let shutdown = Arc::new(AtomicBool::new(false));
    let (source, channels) = NotifySource::new().unwrap();
    let (mut watcher, report) = LogFileWatcher::initialize(
        &config_for(&dirs),
        source,
        channels,
        Arc::clone(&counters),
        Arc::clone(&shutdown),
    )
    .unwrap();
    assert_eq!(report.links_armed, 2);

    let handle = thread::spawn(move || watcher.run());

    std::fs::remove_file(&b).unwrap();
    thread::sleep(Duration::from_millis(200));

    dirs.append_target("0.log", 50);
    assert!(
        wait_until(TIMEOUT, || counters.value(&label(&a)) == Some(150)),
        "surviving link stopped counting: {:?}",
        counters.snapshot()
    );
    dirs.append_target("0.log", 10);
    assert!(
        wait_until(TIMEOUT, || counters.value(&label(&a)) == Some(160)),
        "surviving link stopped counting: {:?}",
        counters.snapshot()
    );

    shutdown.store(true, Ordering::Relaxed);
    handle.join().unwrap().unwrap();
}
