//! Filesystem notifications as a tagged enum.

use std::fmt;
use std::path::{Path, PathBuf};

/// Discriminant of a [`WatchEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Create,
    Write,
    Remove,
    Rename,
    Chmod,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Create => "CREATE",
            Self::Write => "WRITE",
            Self::Remove => "REMOVE",
            Self::Rename => "RENAME",
            Self::Chmod => "CHMOD",
        };
        f.write_str(label)
    }
}

/// One notification for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A name appeared in a watched directory.
    Create(PathBuf),
    /// Content of a watched file (or a link's target) changed.
    Write(PathBuf),
    /// A name was deleted, or the watched inode went away.
    Remove(PathBuf),
    /// A name was moved, or the watched inode was moved.
    Rename(PathBuf),
    /// Attributes of a watched name changed.
    Chmod(PathBuf),
}

impl WatchEvent {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Create(p) | Self::Write(p) | Self::Remove(p) | Self::Rename(p) | Self::Chmod(p) => {
                p
            }
        }
    }

    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Create(_) => EventKind::Create,
            Self::Write(_) => EventKind::Write,
            Self::Remove(_) => EventKind::Remove,
            Self::Rename(_) => EventKind::Rename,
            Self::Chmod(_) => EventKind::Chmod,
        }
    }

    /// Write-class events: the file's size may differ from the ledger.
    #[must_use]
    pub const fn may_change_content(&self) -> bool {
        matches!(self, Self::Create(_) | Self::Write(_))
    }
}

impl fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.path().display(), self.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_create_and_write_are_write_class() {
        let p = PathBuf::from("/logs/a.log");
        assert!(WatchEvent::Create(p.clone()).may_change_content());
        assert!(WatchEvent::Write(p.clone()).may_change_content());
        assert!(!WatchEvent::Remove(p.clone()).may_change_content());
        assert!(!WatchEvent::Rename(p.clone()).may_change_content());
        assert!(!WatchEvent::Chmod(p).may_change_content());
    }

    #[test]
    fn display_names_path_and_kind() {
        let ev = WatchEvent::Rename(PathBuf::from("/logs/a.log"));
        assert_eq!(ev.kind(), EventKind::Rename);
        assert_eq!(ev.path(), Path::new("/logs/a.log"));
        assert_eq!(ev.to_string(), "\"/logs/a.log\": RENAME");
    }
}
