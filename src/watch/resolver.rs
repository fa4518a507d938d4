//! Target resolver: waits out dangling symlinks off the event loop.
//!
//! A link created before its target, or whose target is mid-rotation, cannot be
//! armed yet. The reconciler hands such names here; a single worker thread
//! re-checks each one every poll interval and reports back over a channel once
//! the target can be statted, or once it has given up. The event loop never
//! sleeps on a link.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, select, tick, unbounded};
use tracing::debug;

use crate::core::config::ResolverConfig;
use crate::core::errors::{LfwError, Result};
use crate::watch::reconciler::ResolveRequest;
use crate::watch::target_exists;

/// Answer for one [`ResolveRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The target can now be statted.
    Resolved {
        path: PathBuf,
        generation: u64,
        attempts: u32,
    },
    /// The target did not appear within the configured number of attempts.
    Abandoned {
        path: PathBuf,
        generation: u64,
        attempts: u32,
    },
}

impl Resolution {
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Resolved { path, .. } | Self::Abandoned { path, .. } => path,
        }
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        match self {
            Self::Resolved { generation, .. } | Self::Abandoned { generation, .. } => *generation,
        }
    }
}

enum Command {
    Resolve(ResolveRequest),
    Cancel(PathBuf),
}

struct Pending {
    generation: u64,
    attempts: u32,
}

/// Handle to the resolver worker thread.
///
/// Dropping the handle stops the worker.
pub struct TargetResolver {
    commands: Option<Sender<Command>>,
    join: Option<thread::JoinHandle<()>>,
}

impl TargetResolver {
    /// Start the worker. Answers are sent on `results`.
    pub fn spawn(config: &ResolverConfig, results: Sender<Resolution>) -> Result<Self> {
        let (tx, rx) = unbounded::<Command>();
        let interval = config.poll_interval();
        let max_attempts = config.max_attempts.max(1);

        let join = thread::Builder::new()
            .name("lfw-resolver".to_string())
            .spawn(move || resolver_thread_main(&rx, &results, interval, max_attempts))
            .map_err(|source| LfwError::Runtime {
                details: format!("failed to spawn resolver thread: {source}"),
            })?;

        Ok(Self {
            commands: Some(tx),
            join: Some(join),
        })
    }

    /// Start waiting on a link. A newer request for the same path replaces
    /// the older one.
    pub fn submit(&self, request: ResolveRequest) {
        self.send(Command::Resolve(request));
    }

    /// Stop waiting on `path`, if it is pending.
    pub fn cancel(&self, path: PathBuf) {
        self.send(Command::Cancel(path));
    }

    /// Stop the worker and wait for it to exit.
    pub fn shutdown(&mut self) {
        drop(self.commands.take());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    fn send(&self, command: Command) {
        if let Some(tx) = &self.commands
            && tx.send(command).is_err()
        {
            debug!("resolver worker already stopped");
        }
    }
}

impl Drop for TargetResolver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ──────────────────── worker thread ────────────────────

fn resolver_thread_main(
    commands: &Receiver<Command>,
    results: &Sender<Resolution>,
    interval: Duration,
    max_attempts: u32,
) {
    let ticker = tick(interval);
    let mut pending: HashMap<PathBuf, Pending> = HashMap::new();

    loop {
        select! {
            recv(commands) -> msg => match msg {
                Ok(Command::Resolve(req)) => {
                    pending.insert(req.path, Pending { generation: req.generation, attempts: 0 });
                }
                Ok(Command::Cancel(path)) => {
                    pending.remove(&path);
                }
                Err(_) => break,
            },
            recv(ticker) -> _ => {
                if !probe_all(&mut pending, results, max_attempts) {
                    break;
                }
            }
        }
    }
    debug!(pending = pending.len(), "resolver worker exiting");
}

/// One polling round. Returns false once nobody is listening for results.
fn probe_all(
    pending: &mut HashMap<PathBuf, Pending>,
    results: &Sender<Resolution>,
    max_attempts: u32,
) -> bool {
    let mut finished = Vec::new();
    for (path, entry) in pending.iter_mut() {
        entry.attempts += 1;
        if target_exists(path) {
            finished.push(Resolution::Resolved {
                path: path.clone(),
                generation: entry.generation,
                attempts: entry.attempts,
            });
        } else if entry.attempts >= max_attempts {
            finished.push(Resolution::Abandoned {
                path: path.clone(),
                generation: entry.generation,
                attempts: entry.attempts,
            });
        }
    }

    for resolution in finished {
        pending.remove(resolution.path());
        if results.send(resolution).is_err() {
            return false;
        }
    }
    true
}
