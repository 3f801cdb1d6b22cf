//! Host environment probes used while plugins configure a scan
//!
//! Plugins query the host for wrapper locations (`cswrap --print-path-to-wrap`),
//! optional files to copy into the chroot and the like. Going through
//! [`HostEnv`] keeps plugin configuration testable without those tools.

mod mock;
mod real;

pub use mock::MockHost;
pub use real::RealHost;

use anyhow::Result;
use std::path::Path;

pub trait HostEnv: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    fn is_file(&self, path: &Path) -> bool;

    /// True if the current user can read `path`.
    fn is_readable(&self, path: &Path) -> bool;

    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Names of the entries of a directory, sorted.
    fn read_dir_names(&self, path: &Path) -> Result<Vec<String>>;

    /// Runs `argv` and returns its trimmed stdout, or `None` if it failed.
    fn command_output(&self, argv: &[&str]) -> Option<String>;

    /// Runs a shell command and reports whether it exited with zero.
    fn shell_succeeds(&self, cmd: &str) -> bool;

    /// Value of the user's home directory, used to expand `~/`.
    fn home_dir(&self) -> Option<String>;
}

/// Expands a leading `~/` the way a shell would.
pub fn expand_tilde(host: &dyn HostEnv, path: &str) -> String {
    match (path.strip_prefix("~/"), host.home_dir()) {
        (Some(rest), Some(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path.to_string(),
    }
}
