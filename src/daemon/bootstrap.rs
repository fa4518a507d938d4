//! Startup scan of the watched root.
//!
//! The root is armed before it is listed, so a link created during the listing
//! is either seen by the scan or delivered as an event (possibly both; sizes
//! are absolute, so double delivery never double counts).

#![allow(missing_docs)]

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::accounting::accountant::ByteAccountant;
use crate::accounting::counter::CounterSink;
use crate::core::config::SeedPolicy;
use crate::core::errors::{LfwError, Result};
use crate::watch::names::LogName;
use crate::watch::reconciler::{Reconciled, Reconciler, ResolveRequest};
use crate::watch::source::WatchSet;

/// Summary of the startup scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Directory entries passing the name filter.
    pub entries: usize,
    pub links_armed: usize,
    pub links_pending: usize,
    /// Links and regular files whose size was recorded.
    pub files_seeded: usize,
    /// Bytes added to counters by the scan (0 under the baseline policy).
    pub bytes_seeded: u64,
    /// Dangling links the caller must hand to the resolver.
    pub pending: Vec<ResolveRequest>,
}

/// Arm `root`, then walk its entries once.
///
/// Failing to arm or list the root is fatal. Per-entry failures are logged
/// and skipped.
pub fn scan_root<W: WatchSet, S: CounterSink>(
    root: &Path,
    policy: SeedPolicy,
    watch: &mut W,
    reconciler: &mut Reconciler,
    accountant: &mut ByteAccountant<S>,
) -> Result<BootstrapReport> {
    reconciler.arm_explicit(watch, root)?;
    info!(root = %root.display(), "watching root directory");

    let entries = fs::read_dir(root).map_err(|source| LfwError::io(root, source))?;
    let mut report = BootstrapReport::default();

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(root = %root.display(), error = %err, "skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        if !reconciler.filter().matches(&path) {
            continue;
        }
        report.entries += 1;

        let Ok(file_type) = entry.file_type() else {
            debug!(path = %path.display(), "entry vanished during scan");
            continue;
        };

        if file_type.is_symlink() {
            match reconciler.adopt(watch, &path) {
                Reconciled::Armed => report.links_armed += 1,
                Reconciled::AwaitingTarget(request) => {
                    report.links_pending += 1;
                    report.pending.push(request);
                    continue;
                }
                _ => continue,
            }
        } else if !file_type.is_file() {
            continue;
        }

        let name = LogName::from_path(&path);
        debug!(
            path = %path.display(),
            namespace = %name.namespace,
            pod = %name.pod,
            container = %name.container,
            "seeding"
        );
        report.bytes_seeded += accountant.seed(&path, policy);
        if accountant.ledger().last_size(&path).is_some() {
            report.files_seeded += 1;
        }
    }

    info!(
        entries = report.entries,
        links_armed = report.links_armed,
        links_pending = report.links_pending,
        files_seeded = report.files_seeded,
        bytes_seeded = report.bytes_seeded,
        "bootstrap scan complete"
    );
    Ok(report)
}
