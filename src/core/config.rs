//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fmt::{self, Write as _};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::errors::{LfwError, Result};

const NAME_FILTER_ENV: &str = "LFW_WATCH_NAME_FILTER";

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/log-file-watcher/config.toml";

/// Full watcher configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub watch: WatchConfig,
    pub resolver: ResolverConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
    /// File the configuration was loaded from (not serialized).
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

/// What to watch and how to count it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchConfig {
    /// Directory whose symlinked log files are followed.
    pub root_dir: PathBuf,
    /// Substring a file name must contain to participate. Empty disables filtering.
    pub name_filter: String,
    /// How files found by the startup scan are counted.
    pub seed_policy: SeedPolicy,
}

/// Bounded wait applied to symlinks whose target does not exist yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResolverConfig {
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
}

/// Pull endpoint for the bytes-logged counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MetricsConfig {
    /// `host:port`, or `:port` to bind every interface.
    pub listen_addr: String,
}

/// Diagnostic logging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Per-event tracing from the event loop, reconciler and accountant.
    pub debug: bool,
}

/// Counting policy for files that already exist when the watcher starts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SeedPolicy {
    /// Add the file's current size to its counter at startup.
    #[default]
    Count,
    /// Record the current size as the baseline; only later growth is counted.
    Baseline,
}

impl FromStr for SeedPolicy {
    type Err = LfwError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "count" => Ok(Self::Count),
            "baseline" => Ok(Self::Baseline),
            other => Err(LfwError::ConfigParse {
                context: "seed_policy",
                details: format!("unknown seed policy {other:?}; expected count or baseline"),
            }),
        }
    }
}

impl fmt::Display for SeedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => f.write_str("count"),
            Self::Baseline => f.write_str("baseline"),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("/var/log/containers"),
            name_filter: ".log".to_string(),
            seed_policy: SeedPolicy::Count,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            max_attempts: 120,
        }
    }
}

impl ResolverConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:2112".to_string(),
        }
    }
}

impl MetricsConfig {
    /// Parse the listen address, accepting the bare `:port` form.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let raw = self.listen_addr.trim();
        let candidate = if raw.starts_with(':') {
            format!("0.0.0.0{raw}")
        } else {
            raw.to_string()
        };
        candidate
            .parse::<SocketAddr>()
            .map_err(|error| LfwError::InvalidConfig {
                details: format!("metrics.listen_addr {raw:?} is not a socket address: {error}"),
            })
    }
}

impl WatchConfig {
    /// The name filter, or `None` when filtering is disabled.
    #[must_use]
    pub fn name_filter(&self) -> Option<&str> {
        let trimmed = self.name_filter.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| LfwError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let mut parsed: Self = toml::from_str(&raw)?;
            parsed.config_file = Some(path_buf);
            parsed
        } else if is_explicit_path {
            return Err(LfwError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Short fingerprint of the effective settings, logged at startup and
    /// printed by `--check-config` so two hosts can be compared at a glance.
    ///
    /// First eight bytes of the SHA-256 of the JSON form, hex encoded.
    pub fn stable_hash(&self) -> Result<String> {
        let digest = Sha256::digest(serde_json::to_vec(self)?);
        Ok(digest[..8]
            .iter()
            .fold(String::with_capacity(16), |mut out, byte| {
                let _ = write!(out, "{byte:02x}");
                out
            }))
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `LFW_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // watch
        if let Some(raw) = lookup("LFW_WATCH_ROOT_DIR") {
            self.watch.root_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup(NAME_FILTER_ENV) {
            self.watch.name_filter = raw;
        }
        if let Some(raw) = lookup("LFW_WATCH_SEED_POLICY") {
            self.watch.seed_policy = raw.parse()?;
        }

        // resolver
        if let Some(raw) = lookup("LFW_RESOLVER_POLL_INTERVAL_MS") {
            self.resolver.poll_interval_ms = parse_env("LFW_RESOLVER_POLL_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = lookup("LFW_RESOLVER_MAX_ATTEMPTS") {
            self.resolver.max_attempts = parse_env("LFW_RESOLVER_MAX_ATTEMPTS", &raw)?;
        }

        // metrics
        if let Some(raw) = lookup("LFW_METRICS_LISTEN_ADDR") {
            self.metrics.listen_addr = raw;
        }

        // logging
        if let Some(raw) = lookup("LFW_LOGGING_DEBUG") {
            self.logging.debug = parse_env_bool("LFW_LOGGING_DEBUG", &raw)?;
        }

        Ok(())
    }

    /// Strip trailing slashes so event paths and ledger keys compare equal.
    pub fn normalize_paths(&mut self) {
        let s = self.watch.root_dir.to_string_lossy();
        if s.len() > 1
            && let Some(stripped) = s.strip_suffix('/')
        {
            self.watch.root_dir = PathBuf::from(stripped);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.watch.root_dir.as_os_str().is_empty() {
            return Err(LfwError::InvalidConfig {
                details: "watch.root_dir must not be empty".to_string(),
            });
        }
        if self.resolver.poll_interval_ms == 0 {
            return Err(LfwError::InvalidConfig {
                details: "resolver.poll_interval_ms must be >= 1".to_string(),
            });
        }
        if self.resolver.max_attempts == 0 {
            return Err(LfwError::InvalidConfig {
                details: "resolver.max_attempts must be >= 1".to_string(),
            });
        }
        self.metrics.socket_addr()?;
        Ok(())
    }
}

/// Blank values count as unset, except for the name filter where an empty
/// value turns filtering off.
fn env_var(name: &str) -> Option<String> {
    let raw = env::var(name).ok()?;
    if raw.trim().is_empty() && name != NAME_FILTER_ENV {
        return None;
    }
    Some(raw)
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| LfwError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(LfwError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: expected a boolean"),
        }),
    }
}
