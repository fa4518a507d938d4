//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use log_file_watcher::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, SeedPolicy};
pub use crate::core::errors::{LfwError, Result};

// Accounting
pub use crate::accounting::accountant::ByteAccountant;
pub use crate::accounting::counter::{BytesLoggedCounters, CounterSink};
pub use crate::accounting::ledger::{Observation, PathLedger};

// Watch protocol
pub use crate::watch::{
    MemoryWatchSet, NameFilter, NotifySource, Reconciled, Reconciler, TargetResolver, WatchEvent,
    WatchSet,
};

// Daemon
pub use crate::daemon::bootstrap::BootstrapReport;
pub use crate::daemon::loop_main::{LogFileWatcher, LoopStats};
#[cfg(feature = "daemon")]
pub use crate::daemon::service::run_daemon;
