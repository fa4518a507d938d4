//! Last-observed size per path.
//!
//! Sizes are absolute, so recording the same size twice is harmless: duplicate
//! notifications (a startup scan racing a live write event) produce a zero delta
//! the second time around.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Result of recording one size for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Size recorded before this observation (0 for unseen paths).
    pub previous: u64,
    /// Size just observed.
    pub size: u64,
    /// Bytes to add to the path's counter.
    pub delta: u64,
}

impl Observation {
    /// Whether the file shrank since the previous observation.
    #[must_use]
    pub const fn truncated(&self) -> bool {
        self.size < self.previous
    }
}

/// Bytes to count when a file moves from `previous` to `size`.
///
/// Growth counts the difference. A shrink means the file was truncated or
/// replaced, so the whole new size is counted and nothing is subtracted.
#[must_use]
pub const fn delta_for(previous: u64, size: u64) -> u64 {
    if size >= previous {
        size - previous
    } else {
        size
    }
}

/// Mapping from watched path to the last size seen for it.
///
/// Entries are never evicted; cardinality is bounded by the number of distinct
/// names that appear in the watched directory during the process lifetime.
#[derive(Debug, Default)]
pub struct PathLedger {
    sizes: HashMap<PathBuf, u64>,
}

impl PathLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `size` for `path` and return the delta it implies.
    pub fn record(&mut self, path: &Path, size: u64) -> Observation {
        let previous = self
            .sizes
            .insert(path.to_path_buf(), size)
            .unwrap_or_default();
        Observation {
            previous,
            size,
            delta: delta_for(previous, size),
        }
    }

    /// Last recorded size, if the path has been observed.
    #[must_use]
    pub fn last_size(&self, path: &Path) -> Option<u64> {
        self.sizes.get(path).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}
