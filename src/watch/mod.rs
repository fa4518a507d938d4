//! Symlink-aware directory watch protocol.
//!
//! - [`event`]: the tagged notification type the rest of the crate consumes.
//! - [`source`]: the `notify`-backed notification source and the [`WatchSet`] seam.
//! - [`reconciler`]: per-name state machine keeping the watch set in line with
//!   the symlinks actually present.
//! - [`resolver`]: background worker waiting out dangling link targets.
//! - [`names`]: file-name filter and container log-name metadata.

pub mod event;
pub mod names;
pub mod reconciler;
pub mod resolver;
pub mod source;

pub use event::{EventKind, WatchEvent};
pub use names::{LogName, NameFilter};
pub use reconciler::{LinkState, Reconciled, Reconciler, ResolveRequest};
pub use resolver::{Resolution, TargetResolver};
pub use source::{
    FaultSeverity, MemoryWatchSet, NotifySource, SourceChannels, SourceFault, WatchError, WatchSet,
};

use std::fs;
use std::path::Path;

/// Whether `path` itself is a symbolic link (does not follow it).
#[must_use]
pub fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|meta| meta.file_type().is_symlink())
}

/// Identity of the file a name resolves to.
///
/// inotify keys subscriptions by inode, so two links resolving to the same
/// file share one kernel watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId {
    dev: u64,
    ino: u64,
}

/// Identity of the file behind `path`, following symlinks.
///
/// `None` when the target cannot be statted or the platform has no inode
/// numbers.
#[cfg(unix)]
#[must_use]
pub fn target_id(path: &Path) -> Option<TargetId> {
    use std::os::unix::fs::MetadataExt;

    fs::metadata(path).ok().map(|meta| TargetId {
        dev: meta.dev(),
        ino: meta.ino(),
    })
}

#[cfg(not(unix))]
#[must_use]
pub fn target_id(_path: &Path) -> Option<TargetId> {
    None
}

/// Whether `path` can be statted, following symlinks.
///
/// False for a dangling link.
#[must_use]
pub fn target_exists(path: &Path) -> bool {
    fs::metadata(path).is_ok()
}
