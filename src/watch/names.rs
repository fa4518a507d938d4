//! File-name filter and container log-name metadata.
//!
//! Container runtimes name log links `<namespace>_<pod>_<container>.log`. The
//! parts are only used for diagnostics; counters stay keyed by path.

#![allow(missing_docs)]

use std::path::Path;

const UNKNOWN: &str = "unknown";

/// Substring filter on file names. The same filter gates the startup scan and
/// live events so a file is treated alike whenever it appears.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameFilter {
    needle: Option<String>,
}

impl NameFilter {
    /// Build a filter; `None` or an empty needle accepts everything.
    #[must_use]
    pub fn new(needle: Option<&str>) -> Self {
        Self {
            needle: needle
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
        }
    }

    /// Filter that accepts every name.
    #[must_use]
    pub fn accept_all() -> Self {
        Self { needle: None }
    }

    #[must_use]
    pub fn needle(&self) -> Option<&str> {
        self.needle.as_deref()
    }

    /// Whether the file name of `path` passes the filter.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        let Some(needle) = self.needle.as_deref() else {
            return true;
        };
        path.file_name()
            .is_some_and(|name| name.to_string_lossy().contains(needle))
    }
}

/// Parts of a `<namespace>_<pod>_<container>.log` file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogName {
    pub namespace: String,
    pub pod: String,
    pub container: String,
}

impl LogName {
    /// Split a file name into its parts; anything not in three parts is `unknown`.
    #[must_use]
    pub fn parse(file_name: &str) -> Self {
        let stem = file_name.strip_suffix(".log").unwrap_or(file_name);
        let parts: Vec<&str> = stem.split('_').collect();
        match parts.as_slice() {
            [namespace, pod, container]
                if !namespace.is_empty() && !pod.is_empty() && !container.is_empty() =>
            {
                Self {
                    namespace: (*namespace).to_string(),
                    pod: (*pod).to_string(),
                    container: (*container).to_string(),
                }
            }
            _ => Self::unknown(),
        }
    }

    /// Parse the file-name component of `path`.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        path.file_name()
            .map_or_else(Self::unknown, |name| Self::parse(&name.to_string_lossy()))
    }

    fn unknown() -> Self {
        Self {
            namespace: UNKNOWN.to_string(),
            pod: UNKNOWN.to_string(),
            container: UNKNOWN.to_string(),
        }
    }
}
