//! LFW-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, LfwError>;

/// Top-level error type for the log file watcher.
#[derive(Debug, Error)]
pub enum LfwError {
    #[error("[LFW-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[LFW-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[LFW-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[LFW-2001] notification source could not be created: {details}")]
    WatcherInit { details: String },

    #[error("[LFW-2002] failed to watch {path}: {details}")]
    Watch { path: PathBuf, details: String },

    #[error("[LFW-2003] notification source reported an unrecoverable error: {details}")]
    NotificationSource { details: String },

    #[error("[LFW-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[LFW-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[LFW-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[LFW-3004] failed to bind metrics endpoint {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("[LFW-3005] metrics registry failure: {details}")]
    Metrics { details: String },

    #[error("[LFW-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl LfwError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "LFW-1001",
            Self::MissingConfig { .. } => "LFW-1002",
            Self::ConfigParse { .. } => "LFW-1003",
            Self::WatcherInit { .. } => "LFW-2001",
            Self::Watch { .. } => "LFW-2002",
            Self::NotificationSource { .. } => "LFW-2003",
            Self::Serialization { .. } => "LFW-2101",
            Self::Io { .. } => "LFW-3002",
            Self::ChannelClosed { .. } => "LFW-3003",
            Self::Bind { .. } => "LFW-3004",
            Self::Metrics { .. } => "LFW-3005",
            Self::Runtime { .. } => "LFW-3900",
        }
    }

    /// Whether the error stems from operator-supplied configuration.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. } | Self::MissingConfig { .. } | Self::ConfigParse { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for LfwError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<prometheus::Error> for LfwError {
    fn from(value: prometheus::Error) -> Self {
        Self::Metrics {
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for LfwError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for LfwError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            context: "toml",
            details: value.to_string(),
        }
    }
}
