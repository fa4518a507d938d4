#![forbid(unsafe_code)]

//! Log File Watcher (lfw) follows container-log symlinks in a directory and
//! exports how many bytes each one has logged, without reading log content.
//!
//! Three cooperating parts:
//! 1. **Watch protocol**: keeps filesystem notifications attached to the
//!    current target of every link, across rotation and dangling periods
//! 2. **Byte accounting**: a per-path size ledger turned into monotonic deltas
//! 3. **Daemon**: startup scan, single-threaded event loop, `/metrics` endpoint
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use log_file_watcher::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use log_file_watcher::core::config::Config;
//! use log_file_watcher::watch::reconciler::Reconciler;
//! ```

pub mod prelude;

pub mod accounting;
pub mod core;
pub mod daemon;
pub mod watch;
