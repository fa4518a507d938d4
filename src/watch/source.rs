//! Notification source: arm/disarm individual names and receive their events.
//!
//! [`NotifySource`] wraps a non-recursive `notify` watcher. Events and delivery
//! failures arrive on two separate crossbeam channels; both close when the
//! watcher is dropped, which the event loop treats as fatal.
//!
//! On Linux the backend is inotify, which follows symlinks when a watch is
//! added. Arming a link therefore watches its current target, and arming a
//! dangling link fails with "not found".

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use crossbeam_channel::{Receiver, Sender, unbounded};
use notify::event::ModifyKind;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tracing::debug;

use crate::core::errors::{LfwError, Result};
use crate::watch::event::WatchEvent;
use crate::watch::{TargetId, target_id};

// ──────────────────── watch-set seam ────────────────────

/// Failure to arm or disarm a single name.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The name (or a link's target) does not exist.
    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),
    /// The kernel refused another watch.
    #[error("watch limit reached while arming {}", .0.display())]
    Exhausted(PathBuf),
    #[error("watch failure for {}: {details}", path.display())]
    Failed { path: PathBuf, details: String },
}

impl WatchError {
    fn from_notify(path: &Path, err: &notify::Error) -> Self {
        match &err.kind {
            notify::ErrorKind::PathNotFound | notify::ErrorKind::WatchNotFound => {
                Self::NotFound(path.to_path_buf())
            }
            notify::ErrorKind::Io(io) if io.kind() == IoErrorKind::NotFound => {
                Self::NotFound(path.to_path_buf())
            }
            notify::ErrorKind::MaxFilesWatch => Self::Exhausted(path.to_path_buf()),
            _ => Self::Failed {
                path: path.to_path_buf(),
                details: err.to_string(),
            },
        }
    }
}

impl From<WatchError> for LfwError {
    fn from(value: WatchError) -> Self {
        let path = match &value {
            WatchError::NotFound(p) | WatchError::Exhausted(p) => p.clone(),
            WatchError::Failed { path, .. } => path.clone(),
        };
        Self::Watch {
            path,
            details: value.to_string(),
        }
    }
}

/// The subscription set of a notification source.
///
/// Implementations must treat arming an armed name and disarming an absent
/// one as success.
pub trait WatchSet {
    fn arm(&mut self, path: &Path) -> std::result::Result<(), WatchError>;
    fn disarm(&mut self, path: &Path) -> std::result::Result<(), WatchError>;
}

// ──────────────────── faults ────────────────────

/// How the event loop should react to a delivery failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultSeverity {
    /// A name vanished under us; expected during rotation.
    Transient,
    /// Logged, processing continues.
    Recoverable,
    /// The source can no longer be trusted.
    Fatal,
}

/// A delivery failure reported by the notification source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFault {
    pub severity: FaultSeverity,
    pub message: String,
    pub paths: Vec<PathBuf>,
}

impl SourceFault {
    pub fn new(severity: FaultSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            paths: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_notify(err: &notify::Error) -> Self {
        let severity = match &err.kind {
            notify::ErrorKind::PathNotFound | notify::ErrorKind::WatchNotFound => {
                FaultSeverity::Transient
            }
            notify::ErrorKind::Io(io) if io.kind() == IoErrorKind::NotFound => {
                FaultSeverity::Transient
            }
            notify::ErrorKind::MaxFilesWatch | notify::ErrorKind::InvalidConfig(_) => {
                FaultSeverity::Fatal
            }
            _ => FaultSeverity::Recoverable,
        };
        Self {
            severity,
            message: err.to_string(),
            paths: err.paths.clone(),
        }
    }
}

// ──────────────────── notify-backed source ────────────────────

/// Receiving ends of a notification source.
#[derive(Debug, Clone)]
pub struct SourceChannels {
    pub events: Receiver<WatchEvent>,
    pub faults: Receiver<SourceFault>,
}

/// Native notification source (inotify on Linux).
pub struct NotifySource {
    watcher: RecommendedWatcher,
}

impl NotifySource {
    /// Create the watcher and the channels it delivers on.
    pub fn new() -> Result<(Self, SourceChannels)> {
        // Unbounded: a full channel would stall notify's reader thread and
        // overflow the kernel queue instead.
        let (events_tx, events_rx) = unbounded::<WatchEvent>();
        let (faults_tx, faults_rx) = unbounded::<SourceFault>();

        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| dispatch(res, &events_tx, &faults_tx),
            NotifyConfig::default(),
        )
        .map_err(|e| LfwError::WatcherInit {
            details: e.to_string(),
        })?;

        Ok((
            Self { watcher },
            SourceChannels {
                events: events_rx,
                faults: faults_rx,
            },
        ))
    }
}

impl WatchSet for NotifySource {
    fn arm(&mut self, path: &Path) -> std::result::Result<(), WatchError> {
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::from_notify(path, &e))
    }

    fn disarm(&mut self, path: &Path) -> std::result::Result<(), WatchError> {
        match self.watcher.unwatch(path) {
            Ok(()) => Ok(()),
            Err(e) => match WatchError::from_notify(path, &e) {
                WatchError::NotFound(_) => Ok(()),
                other => Err(other),
            },
        }
    }
}

fn dispatch(
    res: notify::Result<Event>,
    events: &Sender<WatchEvent>,
    faults: &Sender<SourceFault>,
) {
    match res {
        Ok(event) => {
            if event.need_rescan() {
                let _ = faults.send(SourceFault::new(
                    FaultSeverity::Recoverable,
                    "notification queue overflowed; some changes were coalesced",
                ));
            }
            for converted in convert_event(event) {
                if events.send(converted).is_err() {
                    return;
                }
            }
        }
        Err(err) => {
            let _ = faults.send(SourceFault::from_notify(&err));
        }
    }
}

/// Map a `notify` event to one [`WatchEvent`] per affected path.
///
/// Access events carry no size information and are dropped.
#[must_use]
pub fn convert_event(event: Event) -> Vec<WatchEvent> {
    let make: fn(PathBuf) -> WatchEvent = match event.kind {
        EventKind::Create(_) => WatchEvent::Create,
        EventKind::Modify(ModifyKind::Name(_)) => WatchEvent::Rename,
        EventKind::Modify(ModifyKind::Metadata(_)) => WatchEvent::Chmod,
        EventKind::Modify(_) => WatchEvent::Write,
        EventKind::Remove(_) => WatchEvent::Remove,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
    };
    event.paths.into_iter().map(make).collect()
}

// ──────────────────── in-memory watch set ────────────────────

/// Watch set that only records subscriptions.
///
/// Mirrors the native source's behavior of following links: arming a name
/// whose target cannot be statted fails with [`WatchError::NotFound`], and
/// names resolving to the same file share one subscription, so disarming one
/// of them silently drops the others too. Used to drive the reconciler and
/// event loop without kernel notifications.
#[derive(Debug, Default)]
pub struct MemoryWatchSet {
    armed: BTreeMap<PathBuf, Option<TargetId>>,
    history: Vec<(bool, PathBuf)>,
}

impl MemoryWatchSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.armed.contains_key(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.armed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    pub fn armed(&self) -> impl Iterator<Item = &Path> {
        self.armed.keys().map(PathBuf::as_path)
    }

    /// Successful operations in order: `(true, path)` for arm, `(false, path)` for disarm.
    #[must_use]
    pub fn history(&self) -> &[(bool, PathBuf)] {
        &self.history
    }
}

impl WatchSet for MemoryWatchSet {
    fn arm(&mut self, path: &Path) -> std::result::Result<(), WatchError> {
        if std::fs::metadata(path).is_err() {
            return Err(WatchError::NotFound(path.to_path_buf()));
        }
        self.armed.insert(path.to_path_buf(), target_id(path));
        self.history.push((true, path.to_path_buf()));
        Ok(())
    }

    fn disarm(&mut self, path: &Path) -> std::result::Result<(), WatchError> {
        let Some(id) = self.armed.remove(path) else {
            debug!(path = %path.display(), "disarm of a name that was not armed");
            return Ok(());
        };
        self.history.push((false, path.to_path_buf()));
        if id.is_some() {
            self.armed.retain(|_, other| *other != id);
        }
        Ok(())
    }
}
