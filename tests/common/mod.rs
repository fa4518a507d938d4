#![allow(dead_code)]

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{Duration, Instant};

use tempfile::TempDir;

/// A watched root plus a separate directory holding link targets, the way a
/// container runtime lays out `/var/log/containers` and `/var/log/pods`.
pub struct LogDirs {
    pub root: TempDir,
    pub targets: TempDir,
}

impl LogDirs {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().unwrap(),
            targets: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn name(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    pub fn target(&self, name: &str) -> PathBuf {
        self.targets.path().join(name)
    }

    /// Write a target file of exactly `len` bytes.
    pub fn write_target(&self, name: &str, len: usize) -> PathBuf {
        let path = self.target(name);
        fs::write(&path, vec![b'x'; len]).unwrap();
        path
    }

    pub fn append_target(&self, name: &str, len: usize) {
        let mut file = OpenOptions::new()
            .append(true)
            .open(self.target(name))
            .unwrap();
        file.write_all(&vec![b'y'; len]).unwrap();
        file.sync_all().unwrap();
    }

    /// Create `root/<link>` pointing at `targets/<target>`.
    #[cfg(unix)]
    pub fn link(&self, link: &str, target: &str) -> PathBuf {
        let path = self.name(link);
        std::os::unix::fs::symlink(self.target(target), &path).unwrap();
        path
    }

    /// Atomically repoint `root/<link>` at `targets/<target>`.
    #[cfg(unix)]
    pub fn relink(&self, link: &str, target: &str) {
        let staged = self.name(&format!(".{link}.tmp"));
        std::os::unix::fs::symlink(self.target(target), &staged).unwrap();
        fs::rename(&staged, self.name(link)).unwrap();
    }
}

/// Poll `check` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    check()
}

pub fn label(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

fn resolve_bin_path() -> PathBuf {
    if let Some(path) = option_env!("CARGO_BIN_EXE_log-file-watcher") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) {
        "log-file-watcher.exe"
    } else {
        "log-file-watcher"
    };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve log-file-watcher binary path for integration test"),
    }
}

/// Run the binary with a clean `LFW_*` environment.
pub fn run_cli(args: &[&str]) -> CmdResult {
    run_cli_with_env(args, &[])
}

/// Run the binary with a clean `LFW_*` environment plus `vars`.
pub fn run_cli_with_env(args: &[&str], vars: &[(&str, &str)]) -> CmdResult {
    let mut command = Command::new(resolve_bin_path());
    command.args(args).env("RUST_BACKTRACE", "1");
    for (key, _) in std::env::vars() {
        if key.starts_with("LFW_") {
            command.env_remove(key);
        }
    }
    command.envs(vars.iter().copied());
    let output = command.output().expect("execute log-file-watcher");

    CmdResult {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }
}
