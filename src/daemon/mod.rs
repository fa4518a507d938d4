//! Daemon subsystem: startup scan, event loop, and (behind the `daemon`
//! feature) signal handling, the metrics endpoint and process lifecycle.

pub mod bootstrap;
pub mod loop_main;
#[cfg(feature = "daemon")]
pub mod metrics_server;
#[cfg(feature = "daemon")]
pub mod service;
#[cfg(feature = "daemon")]
pub mod signals;
