//! Command lines for the `mock` chroot the package is built in

use crate::error::ScanError;
use crate::results::{Cmd, ScanResults};
use crate::util::shell::shell_quote;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const RESOLV_CONF: &str = "/etc/resolv.conf";

#[derive(Debug, Clone)]
pub struct MockWrapper {
    mock_bin: PathBuf,
    profile: String,
    add_repos: Vec<String>,
    root: Option<PathBuf>,
    initialized: bool,
}

impl MockWrapper {
    pub fn new(mock_bin: impl Into<PathBuf>, profile: &str, add_repos: &[String]) -> Self {
        Self {
            mock_bin: mock_bin.into(),
            profile: profile.to_string(),
            add_repos: add_repos.to_vec(),
            root: None,
            initialized: false,
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Root directory of the chroot on the host, known after [`Self::print_root_path`].
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// `--init` was run, so the chroot may exist and needs cleaning.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Host path of a file inside the chroot.
    pub fn host_path(&self, chroot_path: &str) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(chroot_path.trim_start_matches('/')))
    }

    /// `mock -r PROFILE [--addrepo=URL]... ARGS...`
    pub fn get_mock_cmd<S: AsRef<str>>(&self, args: &[S]) -> Vec<String> {
        let mut argv = vec![
            self.mock_bin.display().to_string(),
            "-r".to_string(),
            self.profile.clone(),
        ];
        argv.extend(self.add_repos.iter().map(|r| format!("--addrepo={}", r)));
        argv.extend(args.iter().map(|a| a.as_ref().to_string()));
        argv
    }

    pub async fn exec_mock_cmd<S: AsRef<str>>(
        &self,
        results: &mut ScanResults,
        args: &[S],
    ) -> Result<i32, ScanError> {
        results.exec_cmd(&Cmd::Argv(self.get_mock_cmd(args))).await
    }

    /// Runs a shell command in the chroot as root.
    pub async fn exec_chroot_cmd(
        &self,
        results: &mut ScanResults,
        cmd: &str,
    ) -> Result<i32, ScanError> {
        self.exec_mock_cmd(results, &["--chroot", cmd]).await
    }

    /// Same as [`Self::exec_chroot_cmd`] with networking enabled in the chroot.
    pub async fn exec_chroot_cmd_online(
        &self,
        results: &mut ScanResults,
        cmd: &str,
    ) -> Result<i32, ScanError> {
        self.exec_mock_cmd(results, &["--enable-network", "--chroot", cmd])
            .await
    }

    /// Runs a shell command in the chroot as the unprivileged build user.
    pub async fn exec_mockbuild_cmd(
        &self,
        results: &mut ScanResults,
        cmd: &str,
    ) -> Result<i32, ScanError> {
        let cmd = format!("su mockbuild -c {}", shell_quote(cmd));
        self.exec_chroot_cmd(results, &cmd).await
    }

    /// Copies host files into the chroot, each to the same path.
    pub async fn copy_in<S: AsRef<str>>(
        &self,
        results: &mut ScanResults,
        files: &[S],
    ) -> Result<(), ScanError> {
        for file in files {
            let file = file.as_ref();
            let rv = self
                .exec_mock_cmd(results, &["--copyin", file, file])
                .await?;
            if rv != 0 {
                results.error(&format!("failed to copy '{}' into the chroot", file), 1)?;
            }
        }
        Ok(())
    }

    /// Copies a chroot path out into `debug/raw-results`.
    pub async fn copy_out(
        &self,
        results: &mut ScanResults,
        chroot_path: &str,
    ) -> Result<i32, ScanError> {
        let dst = results.raw_path(chroot_path);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        let dst = dst.display().to_string();
        self.exec_mock_cmd(results, &["--copyout", chroot_path, dst.as_str()])
            .await
    }

    pub async fn copy_in_resolv_conf(&self, results: &mut ScanResults) -> Result<(), ScanError> {
        self.copy_in(results, &[RESOLV_CONF]).await
    }

    /// Asks mock where the chroot lives and remembers it.
    pub async fn print_root_path(&mut self, results: &mut ScanResults) -> Result<(), ScanError> {
        let cmd = Cmd::Argv(self.get_mock_cmd(&["--print-root-path"]));
        let (rc, out) = results.get_cmd_output(&cmd).await?;
        if rc != 0 {
            return Err(results.fatal_error("failed to get the root path of the chroot", rc));
        }
        let root = out.trim().trim_end_matches('/');
        debug!(root, "Chroot root path");
        self.root = Some(PathBuf::from(root));
        Ok(())
    }

    pub async fn init(&mut self, results: &mut ScanResults) -> Result<(), ScanError> {
        info!(profile = %self.profile, "Initializing chroot");
        self.initialized = true;
        if self.exec_mock_cmd(results, &["--init"]).await? != 0 {
            return Err(results.fatal_error("failed to init mock profile", 1));
        }
        Ok(())
    }

    pub async fn install(&self, results: &mut ScanResults, pkgs: &[String]) -> Result<(), ScanError> {
        if pkgs.is_empty() {
            return Ok(());
        }
        let mut args = vec!["--install".to_string()];
        args.extend(pkgs.iter().cloned());
        if self.exec_mock_cmd(results, args.as_slice()).await? != 0 {
            return Err(results.fatal_error("failed to install tools into the chroot", 1));
        }
        Ok(())
    }

    pub async fn clean(&self, results: &mut ScanResults) -> Result<(), ScanError> {
        if self.exec_mock_cmd(results, &["--clean"]).await? != 0 {
            results.error("failed to clean the chroot", 0)?;
        }
        Ok(())
    }
}
