use super::HostEnv;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

pub struct RealHost;

impl RealHost {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RealHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostEnv for RealHost {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_readable(&self, path: &Path) -> bool {
        fs::File::open(path).is_ok()
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    }

    fn read_dir_names(&self, path: &Path) -> Result<Vec<String>> {
        let mut names = fs::read_dir(path)
            .with_context(|| format!("Failed to read directory {}", path.display()))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect::<Vec<_>>();
        names.sort();
        Ok(names)
    }

    fn command_output(&self, argv: &[&str]) -> Option<String> {
        let (program, args) = argv.split_first()?;
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| debug!(program, error = %e, "Host probe failed to start"))
            .ok()?;

        if !output.status.success() {
            debug!(program, status = ?output.status, "Host probe failed");
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn shell_succeeds(&self, cmd: &str) -> bool {
        Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn home_dir(&self) -> Option<String> {
        std::env::var("HOME").ok()
    }
}
