//! Event loop: the single consumer of notifications.
//!
//! Architecture: the loop thread owns the watch set, the reconciler and the
//! ledger, so none of them need locking. Two other threads feed it over
//! crossbeam channels:
//! - **notify thread** (owned by the notification source): file events and faults
//! - **resolver thread**: answers for links that were waiting on their target
//!
//! The counter family is the only state shared outward; the metrics endpoint
//! reads it concurrently.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, never, select, tick, unbounded};
use tracing::{debug, info, warn};

use crate::accounting::accountant::ByteAccountant;
use crate::accounting::counter::CounterSink;
use crate::core::config::Config;
use crate::core::errors::{LfwError, Result};
use crate::daemon::bootstrap::{BootstrapReport, scan_root};
use crate::watch::event::WatchEvent;
use crate::watch::names::NameFilter;
use crate::watch::reconciler::{Reconciled, Reconciler};
use crate::watch::resolver::{Resolution, TargetResolver};
use crate::watch::source::{FaultSeverity, SourceChannels, SourceFault, WatchSet};

/// How often the loop wakes to check the shutdown flag when idle.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Running totals, reported at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub events: u64,
    pub observations: u64,
    pub bytes_counted: u64,
    pub rearms: u64,
    pub resolutions: u64,
    pub faults: u64,
}

/// The watcher: watch set, reconciler and accountant behind one event loop.
pub struct LogFileWatcher<W: WatchSet, S: CounterSink> {
    root: PathBuf,
    watch: W,
    reconciler: Reconciler,
    accountant: ByteAccountant<S>,
    resolver: TargetResolver,
    events: Receiver<WatchEvent>,
    faults: Receiver<SourceFault>,
    resolutions: Receiver<Resolution>,
    shutdown: Arc<AtomicBool>,
    stats: LoopStats,
    debug: bool,
}

impl<W: WatchSet, S: CounterSink> LogFileWatcher<W, S> {
    /// Start the resolver and run the startup scan.
    ///
    /// Errors here are fatal: the root could not be armed or listed, or a
    /// worker thread could not be started.
    pub fn initialize(
        config: &Config,
        mut watch: W,
        channels: SourceChannels,
        sink: S,
        shutdown: Arc<AtomicBool>,
    ) -> Result<(Self, BootstrapReport)> {
        let debug = config.logging.debug;
        let root = config.watch.root_dir.clone();
        let (resolution_tx, resolution_rx) = unbounded();
        let resolver = TargetResolver::spawn(&config.resolver, resolution_tx)?;
        let mut reconciler = Reconciler::new(NameFilter::new(config.watch.name_filter()), debug);
        let mut accountant = ByteAccountant::new(sink, debug);

        let report = scan_root(
            &root,
            config.watch.seed_policy,
            &mut watch,
            &mut reconciler,
            &mut accountant,
        )?;
        for request in &report.pending {
            resolver.submit(request.clone());
        }

        let watcher = Self {
            root,
            watch,
            reconciler,
            accountant,
            resolver,
            events: channels.events,
            faults: channels.faults,
            resolutions: resolution_rx,
            shutdown,
            stats: LoopStats::default(),
            debug,
        };
        Ok((watcher, report))
    }

    /// Process notifications until shutdown is requested or the source fails.
    pub fn run(&mut self) -> Result<LoopStats> {
        let events = self.events.clone();
        let faults = self.faults.clone();
        let mut resolutions = self.resolutions.clone();
        let shutdown_tick = tick(SHUTDOWN_POLL);
        info!(root = %self.root.display(), "event loop started");

        while !self.shutdown.load(Ordering::Relaxed) {
            let mut resolver_gone = false;
            select! {
                recv(events) -> msg => match msg {
                    Ok(event) => self.handle_event(&event),
                    Err(_) => return Err(LfwError::ChannelClosed { component: "notification events" }),
                },
                recv(faults) -> msg => match msg {
                    Ok(fault) => self.handle_fault(&fault)?,
                    Err(_) => return Err(LfwError::ChannelClosed { component: "notification faults" }),
                },
                recv(resolutions) -> msg => match msg {
                    Ok(resolution) => self.handle_resolution(resolution),
                    Err(_) => resolver_gone = true,
                },
                recv(shutdown_tick) -> _ => {}
            }
            if resolver_gone {
                warn!("resolver stopped; dangling links will no longer be retried");
                resolutions = never();
            }
        }

        self.resolver.shutdown();
        info!(
            events = self.stats.events,
            observations = self.stats.observations,
            bytes_counted = self.stats.bytes_counted,
            rearms = self.stats.rearms,
            "event loop stopped"
        );
        Ok(self.stats)
    }

    /// Route one notification through the reconciler, then count growth.
    pub fn handle_event(&mut self, event: &WatchEvent) {
        self.stats.events += 1;
        if self.debug {
            debug!(event = %event, "event");
        }

        let outcome = self.reconciler.handle(&mut self.watch, event);
        let observe = match outcome {
            Reconciled::AwaitingTarget(request) => {
                self.resolver.submit(request);
                false
            }
            Reconciled::Disarmed | Reconciled::Abandoned => {
                self.resolver.cancel(event.path().to_path_buf());
                false
            }
            Reconciled::Rearmed => {
                self.stats.rearms += 1;
                true
            }
            Reconciled::Armed | Reconciled::Ignored => event.may_change_content(),
        };

        if observe {
            self.observe(event.path());
            for alias in self.reconciler.aliases(event.path()) {
                self.observe(&alias);
            }
        }
    }

    /// Apply a resolver answer.
    pub fn handle_resolution(&mut self, resolution: Resolution) {
        self.stats.resolutions += 1;
        match resolution {
            Resolution::Resolved {
                path,
                generation,
                attempts,
            } => match self.reconciler.on_resolved(&mut self.watch, &path, generation) {
                Reconciled::Rearmed => {
                    self.stats.rearms += 1;
                    info!(path = %path.display(), attempts, "link target appeared; watching again");
                    self.observe(&path);
                }
                Reconciled::AwaitingTarget(request) => self.resolver.submit(request),
                _ => {}
            },
            Resolution::Abandoned {
                path, generation, ..
            } => {
                self.reconciler.on_abandoned(&path, generation);
            }
        }
    }

    /// Log a delivery failure; a fatal one ends the loop.
    pub fn handle_fault(&mut self, fault: &SourceFault) -> Result<()> {
        self.stats.faults += 1;
        match fault.severity {
            FaultSeverity::Transient => {
                debug!(paths = ?fault.paths, error = %fault.message, "transient notification error");
                Ok(())
            }
            FaultSeverity::Recoverable => {
                warn!(paths = ?fault.paths, error = %fault.message, "notification error");
                Ok(())
            }
            FaultSeverity::Fatal => Err(LfwError::NotificationSource {
                details: fault.message.clone(),
            }),
        }
    }

    fn observe(&mut self, path: &Path) {
        if !self.reconciler.filter().matches(path) {
            return;
        }
        self.stats.observations += 1;
        self.stats.bytes_counted += self.accountant.observe(path);
    }

    #[must_use]
    pub const fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn accountant(&self) -> &ByteAccountant<S> {
        &self.accountant
    }

    pub fn watch_set(&self) -> &W {
        &self.watch
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::accounting::counter::BytesLoggedCounters;
    use crate::core::config::SeedPolicy;
    use crate::watch::reconciler::LinkState;
    use crate::watch::source::MemoryWatchSet;
    use crossbeam_channel::Sender;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use std::os::unix::fs::symlink;
    use std::thread;
    use std::time::Instant;
    use tempfile::TempDir;

    type TestWatcher = LogFileWatcher<MemoryWatchSet, Arc<BytesLoggedCounters>>;

    struct Harness {
        root: TempDir,
        targets: TempDir,
        counters: Arc<BytesLoggedCounters>,
        event_tx: Sender<WatchEvent>,
        fault_tx: Sender<SourceFault>,
        shutdown: Arc<AtomicBool>,
        watcher: TestWatcher,
        report: BootstrapReport,
    }

    fn config_for(root: &Path) -> Config {
        let mut config = Config::default();
        config.watch.root_dir = root.to_path_buf();
        config.resolver.poll_interval_ms = 10;
        config.resolver.max_attempts = 500;
        config.logging.debug = true;
        config
    }

    impl Harness {
        fn start(setup: impl FnOnce(&Path, &Path)) -> Self {
            let root = tempfile::tempdir().unwrap();
            let targets = tempfile::tempdir().unwrap();
            setup(root.path(), targets.path());

            let counters = Arc::new(BytesLoggedCounters::new().unwrap());
            let (event_tx, events) = unbounded();
            let (fault_tx, faults) = unbounded();
            let shutdown = Arc::new(AtomicBool::new(false));
            let (watcher, report) = LogFileWatcher::initialize(
                &config_for(root.path()),
                MemoryWatchSet::new(),
                SourceChannels { events, faults },
                Arc::clone(&counters),
                Arc::clone(&shutdown),
            )
            .unwrap();

            Self {
                root,
                targets,
                counters,
                event_tx,
                fault_tx,
                shutdown,
                watcher,
                report,
            }
        }

        fn link(&self, name: &str) -> PathBuf {
            self.root.path().join(name)
        }

        fn target(&self, name: &str) -> PathBuf {
            self.targets.path().join(name)
        }

        fn count(&self, path: &Path) -> Option<u64> {
            self.counters.value(&path.to_string_lossy())
        }

        /// Feed resolver answers into the loop until `done` holds.
        fn pump_resolutions_until(&mut self, done: impl Fn(&TestWatcher) -> bool) {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !done(&self.watcher) {
                assert!(Instant::now() < deadline, "timed out waiting for resolver");
                if let Ok(resolution) = self.watcher.resolutions.recv_timeout(Duration::from_millis(50)) {
                    self.watcher.handle_resolution(resolution);
                }
            }
        }
    }

    fn write_len(path: &Path, len: usize) {
        fs::write(path, vec![b'x'; len]).unwrap();
    }

    fn append_len(path: &Path, len: usize) {
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(&vec![b'y'; len]).unwrap();
    }

    #[test]
    fn rotation_scenario_counts_growth_and_truncation() {
        let mut h = Harness::start(|root, targets| {
            write_len(&targets.join("0.log"), 100);
            symlink(targets.join("0.log"), root.join("ns_pod_c.log")).unwrap();
        });
        let link = h.link("ns_pod_c.log");
        assert_eq!(h.report.bytes_seeded, 100);
        assert_eq!(h.count(&link), Some(100));

        append_len(&h.target("0.log"), 50);
        h.watcher.handle_event(&WatchEvent::Write(link.clone()));
        assert_eq!(h.count(&link), Some(150));
        assert_eq!(h.watcher.accountant().ledger().last_size(&link), Some(150));

        write_len(&h.target("0.log"), 10);
        h.watcher.handle_event(&WatchEvent::Write(link.clone()));
        assert_eq!(h.count(&link), Some(160));
        assert_eq!(h.watcher.accountant().ledger().last_size(&link), Some(10));
    }

    #[test]
    fn rename_with_missing_target_recovers_once_target_returns() {
        let mut h = Harness::start(|root, targets| {
            write_len(&targets.join("0.log"), 20);
            symlink(targets.join("0.log"), root.join("ns_pod_c.log")).unwrap();
        });
        let link = h.link("ns_pod_c.log");

        fs::remove_file(h.target("0.log")).unwrap();
        h.watcher.handle_event(&WatchEvent::Rename(link.clone()));
        assert!(!h.watcher.watch_set().contains(&link));
        assert!(matches!(
            h.watcher.reconciler().state(&link),
            Some(LinkState::PendingTargetResolution { .. })
        ));

        write_len(&h.target("0.log"), 7);
        let watched = link.clone();
        h.pump_resolutions_until(|w| w.watch_set().contains(&watched));

        assert_eq!(h.watcher.accountant().ledger().last_size(&link), Some(7));
        // 20 at seed, then 7 after the truncating rotation.
        assert_eq!(h.count(&link), Some(27));
        assert!(h.watcher.stats().rearms >= 1);
    }

    #[test]
    fn dangling_link_at_startup_is_counted_once_it_resolves() {
        let mut h = Harness::start(|root, targets| {
            symlink(targets.join("later.log"), root.join("ns_pod_c.log")).unwrap();
        });
        let link = h.link("ns_pod_c.log");
        assert_eq!(h.report.links_pending, 1);
        assert!(h.count(&link).is_none());

        write_len(&h.target("later.log"), 64);
        let watched = link.clone();
        h.pump_resolutions_until(|w| w.watch_set().contains(&watched));
        assert_eq!(h.count(&link), Some(64));
    }

    #[test]
    fn remove_never_stats_and_drops_the_watch() {
        let mut h = Harness::start(|root, targets| {
            write_len(&targets.join("0.log"), 5);
            symlink(targets.join("0.log"), root.join("ns_pod_c.log")).unwrap();
        });
        let link = h.link("ns_pod_c.log");
        let before = h.watcher.stats().observations;

        fs::remove_file(&link).unwrap();
        h.watcher.handle_event(&WatchEvent::Remove(link.clone()));
        assert!(!h.watcher.watch_set().contains(&link));
        assert_eq!(h.watcher.stats().observations, before);
    }

    #[test]
    fn created_link_is_armed_and_counted() {
        let mut h = Harness::start(|_, _| {});
        write_len(&h.target("0.log"), 12);
        let link = h.link("ns_pod_c.log");
        symlink(h.target("0.log"), &link).unwrap();

        h.watcher.handle_event(&WatchEvent::Create(link.clone()));
        assert!(h.watcher.watch_set().contains(&link));
        assert_eq!(h.count(&link), Some(12));
    }

    #[test]
    fn filtered_names_are_never_counted() {
        let mut h = Harness::start(|_, _| {});
        let other = h.root.path().join("notes.txt");
        write_len(&other, 9);
        h.watcher.handle_event(&WatchEvent::Create(other.clone()));
        h.watcher.handle_event(&WatchEvent::Write(other.clone()));
        assert!(h.counters.is_empty());
        assert_eq!(h.watcher.stats().events, 2);
    }

    #[test]
    fn links_sharing_a_file_are_all_counted_and_survive_removal() {
        let mut h = Harness::start(|root, targets| {
            write_len(&targets.join("0.log"), 100);
            symlink(targets.join("0.log"), root.join("ns_a_c.log")).unwrap();
            symlink(targets.join("0.log"), root.join("ns_b_c.log")).unwrap();
        });
        let a = h.link("ns_a_c.log");
        let b = h.link("ns_b_c.log");

        // The kernel names only one of them when the shared file grows.
        append_len(&h.target("0.log"), 20);
        h.watcher.handle_event(&WatchEvent::Write(b.clone()));
        assert_eq!(h.count(&a), Some(120));
        assert_eq!(h.count(&b), Some(120));

        fs::remove_file(&b).unwrap();
        h.watcher.handle_event(&WatchEvent::Remove(b.clone()));
        assert!(h.watcher.watch_set().contains(&a));

        append_len(&h.target("0.log"), 50);
        h.watcher.handle_event(&WatchEvent::Write(a.clone()));
        assert_eq!(h.count(&a), Some(170));
        assert_eq!(h.count(&b), Some(120));
    }

    #[test]
    fn fault_severity_decides_whether_the_loop_survives() {
        let mut h = Harness::start(|_, _| {});
        h.watcher
            .handle_fault(&SourceFault::new(FaultSeverity::Transient, "gone"))
            .unwrap();
        h.watcher
            .handle_fault(&SourceFault::new(FaultSeverity::Recoverable, "rescan"))
            .unwrap();
        let err = h
            .watcher
            .handle_fault(&SourceFault::new(FaultSeverity::Fatal, "queue overflow"))
            .unwrap_err();
        assert_eq!(err.code(), "LFW-2003");
        assert_eq!(h.watcher.stats().faults, 3);
    }

    #[test]
    fn run_returns_on_shutdown_flag() {
        let h = Harness::start(|_, _| {});
        let Harness {
            mut watcher,
            shutdown,
            event_tx,
            fault_tx,
            root,
            ..
        } = h;
        let path = root.path().join("a.log");
        write_len(&path, 3);
        event_tx.send(WatchEvent::Write(path)).unwrap();

        let handle = thread::spawn(move || watcher.run());
        thread::sleep(Duration::from_millis(50));
        shutdown.store(true, Ordering::Relaxed);
        let stats = handle.join().unwrap().unwrap();
        assert_eq!(stats.events, 1);
        assert_eq!(stats.bytes_counted, 3);
        drop(fault_tx);
    }

    #[test]
    fn run_fails_when_the_source_goes_away() {
        let h = Harness::start(|_, _| {});
        let Harness {
            mut watcher,
            event_tx,
            fault_tx: _fault_tx,
            ..
        } = h;
        drop(event_tx);
        let err = watcher.run().unwrap_err();
        assert_eq!(err.code(), "LFW-3003");
    }

    #[test]
    fn startup_fails_for_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let (_event_tx, events) = unbounded();
        let (_fault_tx, faults) = unbounded();
        let result = LogFileWatcher::initialize(
            &config_for(&dir.path().join("missing")),
            MemoryWatchSet::new(),
            SourceChannels { events, faults },
            BytesLoggedCounters::new().unwrap(),
            Arc::new(AtomicBool::new(false)),
        );
        assert!(result.is_err());
    }

    #[test]
    fn baseline_policy_counts_only_growth_after_start() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("a.log");
        write_len(&file, 100);
        let mut config = config_for(root.path());
        config.watch.seed_policy = SeedPolicy::Baseline;

        let counters = Arc::new(BytesLoggedCounters::new().unwrap());
        let (_event_tx, events) = unbounded();
        let (_fault_tx, faults) = unbounded();
        let (mut watcher, report) = LogFileWatcher::initialize(
            &config,
            MemoryWatchSet::new(),
            SourceChannels { events, faults },
            Arc::clone(&counters),
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();
        assert_eq!(report.bytes_seeded, 0);

        append_len(&file, 50);
        watcher.handle_event(&WatchEvent::Write(file.clone()));
        assert_eq!(counters.value(&file.to_string_lossy()), Some(50));
    }
}
