//! Byte-delta accountant: stat a path, consult the ledger, bump its counter.
//!
//! Stat failures never propagate out of [`ByteAccountant::observe`]. A path that
//! vanished between notification and stat is the normal case under rapid
//! rotation; it is logged and reported as a zero delta.

#![allow(missing_docs)]

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, warn};

use crate::accounting::counter::CounterSink;
use crate::accounting::ledger::{Observation, PathLedger};
use crate::core::config::SeedPolicy;
use crate::core::errors::{LfwError, Result};

/// Owns the ledger and feeds deltas into a counter sink.
pub struct ByteAccountant<S: CounterSink> {
    ledger: PathLedger,
    sink: S,
    debug: bool,
}

impl<S: CounterSink> ByteAccountant<S> {
    pub fn new(sink: S, debug: bool) -> Self {
        Self {
            ledger: PathLedger::new(),
            sink,
            debug,
        }
    }

    /// Measure `path` and count its growth. Returns the delta added (0 on failure).
    pub fn observe(&mut self, path: &Path) -> u64 {
        self.observe_with(path, true)
    }

    /// Startup variant of [`observe`](Self::observe) honoring the seed policy.
    pub fn seed(&mut self, path: &Path, policy: SeedPolicy) -> u64 {
        self.observe_with(path, policy == SeedPolicy::Count)
    }

    /// Measure `path` without swallowing errors.
    ///
    /// Returns `Ok(None)` for directories, which are never counted.
    pub fn try_observe(&mut self, path: &Path) -> Result<Option<Observation>> {
        self.measure(path, true)
    }

    fn observe_with(&mut self, path: &Path, count: bool) -> u64 {
        match self.measure(path, count) {
            Ok(Some(obs)) if count => obs.delta,
            Ok(_) => 0,
            Err(LfwError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "file vanished before stat");
                0
            }
            Err(err) => {
                warn!(path = %path.display(), code = err.code(), error = %err, "size check failed");
                0
            }
        }
    }

    fn measure(&mut self, path: &Path, count: bool) -> Result<Option<Observation>> {
        let meta = fs::metadata(path).map_err(|source| LfwError::io(path, source))?;
        if meta.is_dir() {
            return Ok(None);
        }

        let obs = self.ledger.record(path, meta.len());
        if count {
            self.sink.add(&path.to_string_lossy(), obs.delta);
        }
        if self.debug {
            debug!(
                path = %path.display(),
                previous = obs.previous,
                size = obs.size,
                delta = if count { obs.delta } else { 0 },
                truncated = obs.truncated(),
                "observed"
            );
        }
        Ok(Some(obs))
    }

    /// Read-only view of the ledger.
    pub fn ledger(&self) -> &PathLedger {
        &self.ledger
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}
