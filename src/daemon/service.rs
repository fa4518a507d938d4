//! Process lifecycle: wire the notification source, the watcher and the
//! metrics endpoint together, then run until a signal or a fatal error.

#![allow(missing_docs)]

use std::sync::Arc;

use tracing::{info, warn};

use crate::accounting::counter::BytesLoggedCounters;
use crate::core::config::Config;
use crate::core::errors::Result;
use crate::daemon::loop_main::{LogFileWatcher, LoopStats};
use crate::daemon::metrics_server::MetricsServer;
use crate::daemon::signals::SignalHandler;
use crate::watch::source::NotifySource;

/// Run the watcher with the native notification source.
///
/// Startup failures (source creation, root arm/list, metrics bind) are
/// returned before anything is served.
pub fn run_daemon(config: &Config) -> Result<LoopStats> {
    run_daemon_with(config, &SignalHandler::new())
}

/// [`run_daemon`] with a caller-supplied signal handler.
pub fn run_daemon_with(config: &Config, signals: &SignalHandler) -> Result<LoopStats> {
    let listen_addr = config.metrics.socket_addr()?;
    let counters = Arc::new(BytesLoggedCounters::new()?);

    let (source, channels) = NotifySource::new()?;
    let (mut watcher, report) = LogFileWatcher::initialize(
        config,
        source,
        channels,
        Arc::clone(&counters),
        signals.shutdown_flag(),
    )?;
    if report.links_pending > 0 {
        warn!(
            pending = report.links_pending,
            "some links have no target yet; waiting for them in the background"
        );
    }

    let mut server = MetricsServer::start(listen_addr, Arc::clone(&counters))?;
    info!(
        root = %config.watch.root_dir.display(),
        metrics = %server.local_addr(),
        series = counters.len(),
        "log file watcher running"
    );

    let outcome = watcher.run();
    server.stop();
    outcome
}
