//! Symlink reconciler: keeps the watch set consistent with the links present.
//!
//! Log rotation swaps the file behind a link. The kernel reports that as a
//! rename or attribute change on the watched name, not as a remove/create
//! pair, and a watch armed through a link keeps pointing at the old inode. The
//! reconciler therefore disarms and re-arms the name so the link is resolved
//! again. It never arms a dangling link: the name is parked in
//! [`LinkState::PendingTargetResolution`] and a [`ResolveRequest`] is handed
//! back to the caller, which owns the waiting.
//!
//! Per-name transitions:
//!
//! | state      | event                        | result                                   |
//! |------------|------------------------------|------------------------------------------|
//! | absent     | create/rename, live link     | arm → `Watching`                         |
//! | absent     | create/rename, dangling link | `PendingTargetResolution`                |
//! | absent     | anything else                | ignored                                  |
//! | any        | remove, name gone            | disarm, drop                             |
//! | any        | remove, link still present   | disarm → `PendingTargetResolution`       |
//! | `Watching` | rename/chmod on a link       | disarm, re-arm (or pend if target gone)  |
//! | `Watching` | rename/chmod, link gone      | disarm, drop                             |
//! | pending    | create/rename/chmod          | retry now                                |
//! | pending    | resolved (current generation)| arm → `Watching`                         |
//! | pending    | abandoned (current gen.)     | drop with a warning                      |
//!
//! Links resolving to the same file share one kernel subscription. Whenever
//! one of them is disarmed, the others still watching that file are armed
//! again so they keep receiving events.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::errors::Result;
use crate::watch::event::WatchEvent;
use crate::watch::names::NameFilter;
use crate::watch::source::{WatchError, WatchSet};
use crate::watch::{TargetId, is_symlink, target_exists, target_id};

/// Protocol state of one watched name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Subscription is armed.
    Watching,
    /// Disarmed; waiting for the link's target to become statable.
    PendingTargetResolution { generation: u64 },
}

#[derive(Debug, Clone, Copy)]
struct WatchedName {
    /// Added by the operator or as the root, never dropped on rename/chmod.
    explicit: bool,
    state: LinkState,
}

/// Ask the resolver to wait for `path`'s target.
///
/// `generation` identifies this pending episode; answers for an older one are
/// ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    pub path: PathBuf,
    pub generation: u64,
}

/// What the reconciler did with one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// No change to the watch set.
    Ignored,
    /// A new name was armed.
    Armed,
    /// A known name was armed again; its target may be a different file.
    Rearmed,
    /// The name was disarmed and forgotten.
    Disarmed,
    /// The name is waiting for its target.
    AwaitingTarget(ResolveRequest),
    /// The name was given up on.
    Abandoned,
}

/// Per-name state machine over a [`WatchSet`].
#[derive(Debug)]
pub struct Reconciler {
    filter: NameFilter,
    names: HashMap<PathBuf, WatchedName>,
    /// File behind each armed link, as of arming.
    targets: HashMap<PathBuf, TargetId>,
    next_generation: u64,
    debug: bool,
}

impl Reconciler {
    pub fn new(filter: NameFilter, debug: bool) -> Self {
        Self {
            filter,
            names: HashMap::new(),
            targets: HashMap::new(),
            next_generation: 0,
            debug,
        }
    }

    pub fn filter(&self) -> &NameFilter {
        &self.filter
    }

    /// Arm a name the operator asked for. Failure is returned to the caller.
    pub fn arm_explicit<W: WatchSet>(&mut self, watch: &mut W, path: &Path) -> Result<()> {
        watch.arm(path)?;
        self.names.insert(
            path.to_path_buf(),
            WatchedName {
                explicit: true,
                state: LinkState::Watching,
            },
        );
        Ok(())
    }

    /// Start following `path` if it is a link that passes the filter.
    ///
    /// Used for names discovered by the startup scan and for live creates.
    pub fn adopt<W: WatchSet>(&mut self, watch: &mut W, path: &Path) -> Reconciled {
        if !self.filter.matches(path) || !is_symlink(path) {
            return Reconciled::Ignored;
        }
        self.arm_link(watch, path, false, Reconciled::Armed)
    }

    /// Route one notification.
    pub fn handle<W: WatchSet>(&mut self, watch: &mut W, event: &WatchEvent) -> Reconciled {
        let outcome = match event {
            WatchEvent::Create(path) => self.on_create(watch, path),
            WatchEvent::Write(_) => Reconciled::Ignored,
            WatchEvent::Remove(path) => self.on_remove(watch, path),
            WatchEvent::Rename(path) | WatchEvent::Chmod(path) => self.on_relink(watch, path),
        };
        if self.debug && outcome != Reconciled::Ignored {
            debug!(event = %event, outcome = ?outcome, "reconciled");
        }
        outcome
    }

    /// The resolver saw `path`'s target appear.
    pub fn on_resolved<W: WatchSet>(
        &mut self,
        watch: &mut W,
        path: &Path,
        generation: u64,
    ) -> Reconciled {
        match self.current_pending(path, generation) {
            Some(explicit) => self.arm_link(watch, path, explicit, Reconciled::Rearmed),
            None => {
                if self.debug {
                    debug!(path = %path.display(), generation, "stale resolution ignored");
                }
                Reconciled::Ignored
            }
        }
    }

    /// The resolver gave up waiting for `path`'s target.
    pub fn on_abandoned(&mut self, path: &Path, generation: u64) -> Reconciled {
        if self.current_pending(path, generation).is_none() {
            return Reconciled::Ignored;
        }
        self.names.remove(path);
        warn!(path = %path.display(), "link target never appeared; no longer watching");
        Reconciled::Abandoned
    }

    /// State of a name, if it is known.
    #[must_use]
    pub fn state(&self, path: &Path) -> Option<LinkState> {
        self.names.get(path).map(|n| n.state)
    }

    #[must_use]
    pub fn is_explicit(&self, path: &Path) -> bool {
        self.names.get(path).is_some_and(|n| n.explicit)
    }

    /// Names whose subscription is currently armed.
    pub fn watching(&self) -> impl Iterator<Item = &Path> {
        self.names
            .iter()
            .filter(|(_, n)| n.state == LinkState::Watching)
            .map(|(p, _)| p.as_path())
    }

    /// Other armed names resolving to the same file as `path`.
    ///
    /// The kernel reports a change to a shared file under one name only.
    #[must_use]
    pub fn aliases(&self, path: &Path) -> Vec<PathBuf> {
        let Some(id) = self.targets.get(path) else {
            return Vec::new();
        };
        self.targets
            .iter()
            .filter(|&(other, target)| target == id && other.as_path() != path)
            .map(|(other, _)| other.clone())
            .collect()
    }

    /// Number of names waiting for their target.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.names
            .values()
            .filter(|n| matches!(n.state, LinkState::PendingTargetResolution { .. }))
            .count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    // ──────────────────── transitions ────────────────────

    fn on_create<W: WatchSet>(&mut self, watch: &mut W, path: &Path) -> Reconciled {
        match self.state(path) {
            // Already armed by the startup scan.
            Some(LinkState::Watching) => Reconciled::Ignored,
            Some(LinkState::PendingTargetResolution { .. }) => self.retry_pending(watch, path),
            None => self.adopt(watch, path),
        }
    }

    fn on_remove<W: WatchSet>(&mut self, watch: &mut W, path: &Path) -> Reconciled {
        let Some(name) = self.names.remove(path) else {
            return Reconciled::Ignored;
        };
        if name.state == LinkState::Watching {
            self.release(watch, path);
        }
        if name.explicit {
            warn!(path = %path.display(), "explicitly watched path was removed");
            return Reconciled::Disarmed;
        }
        if is_symlink(path) && self.filter.matches(path) {
            // The link survived; only its target went away.
            return self.await_target(path, false);
        }
        Reconciled::Disarmed
    }

    fn on_relink<W: WatchSet>(&mut self, watch: &mut W, path: &Path) -> Reconciled {
        let Some(name) = self.names.get(path).copied() else {
            // Renamed into place.
            return self.adopt(watch, path);
        };

        if !is_symlink(path) {
            if name.explicit {
                return Reconciled::Ignored;
            }
            if name.state == LinkState::Watching {
                self.release(watch, path);
            }
            self.names.remove(path);
            return Reconciled::Disarmed;
        }

        match name.state {
            LinkState::Watching => {
                self.release(watch, path);
                self.arm_link(watch, path, name.explicit, Reconciled::Rearmed)
            }
            LinkState::PendingTargetResolution { .. } => self.retry_pending(watch, path),
        }
    }

    fn retry_pending<W: WatchSet>(&mut self, watch: &mut W, path: &Path) -> Reconciled {
        let explicit = self.is_explicit(path);
        if !is_symlink(path) && !explicit {
            self.names.remove(path);
            return Reconciled::Disarmed;
        }
        self.arm_link(watch, path, explicit, Reconciled::Rearmed)
    }

    /// Arm `path` if its target is statable, otherwise park it.
    fn arm_link<W: WatchSet>(
        &mut self,
        watch: &mut W,
        path: &Path,
        explicit: bool,
        on_success: Reconciled,
    ) -> Reconciled {
        if !target_exists(path) {
            return self.await_target(path, explicit);
        }
        match watch.arm(path) {
            Ok(()) => {
                match target_id(path) {
                    Some(id) => self.targets.insert(path.to_path_buf(), id),
                    None => self.targets.remove(path),
                };
                self.names.insert(
                    path.to_path_buf(),
                    WatchedName {
                        explicit,
                        state: LinkState::Watching,
                    },
                );
                on_success
            }
            // Target vanished between the check and the arm.
            Err(WatchError::NotFound(_)) => self.await_target(path, explicit),
            Err(err) => {
                self.names.remove(path);
                self.targets.remove(path);
                warn!(path = %path.display(), error = %err, "could not watch link; giving up on it");
                Reconciled::Abandoned
            }
        }
    }

    fn await_target(&mut self, path: &Path, explicit: bool) -> Reconciled {
        self.targets.remove(path);
        self.next_generation += 1;
        let generation = self.next_generation;
        self.names.insert(
            path.to_path_buf(),
            WatchedName {
                explicit,
                state: LinkState::PendingTargetResolution { generation },
            },
        );
        info!(path = %path.display(), generation, "link target missing; waiting for it");
        Reconciled::AwaitingTarget(ResolveRequest {
            path: path.to_path_buf(),
            generation,
        })
    }

    /// Disarm `path`, then arm again every other name on the same file.
    fn release<W: WatchSet>(&mut self, watch: &mut W, path: &Path) {
        disarm(watch, path);
        let Some(id) = self.targets.remove(path) else {
            return;
        };
        let survivors: Vec<PathBuf> = self
            .targets
            .iter()
            .filter(|&(_, target)| *target == id)
            .map(|(other, _)| other.clone())
            .collect();
        for survivor in survivors {
            match watch.arm(&survivor) {
                Ok(()) => {
                    if self.debug {
                        debug!(
                            path = %survivor.display(),
                            released = %path.display(),
                            "re-armed link sharing a released file"
                        );
                    }
                }
                Err(err) => {
                    warn!(path = %survivor.display(), error = %err, "could not re-arm link sharing a released file");
                }
            }
        }
    }

    /// `Some(explicit)` if `path` is pending with exactly `generation`.
    fn current_pending(&self, path: &Path, generation: u64) -> Option<bool> {
        match self.names.get(path) {
            Some(WatchedName {
                explicit,
                state: LinkState::PendingTargetResolution { generation: current },
            }) if *current == generation => Some(*explicit),
            _ => None,
        }
    }
}

fn disarm<W: WatchSet>(watch: &mut W, path: &Path) {
    if let Err(err) = watch.disarm(path) {
        warn!(path = %path.display(), error = %err, "disarm failed");
    }
}
