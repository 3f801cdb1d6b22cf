//! The build configuration shared by all plugins of a scan
//!
//! Plugins never talk to each other directly. Each one edits [`ScanProps`]
//! while it is configured, and the orchestrator then reads the result to
//! drive the chroot build.

use crate::cflags::FlagMatrix;
use crate::error::ScanError;
use crate::host::HostEnv;
use crate::pipeline::hooks::Hook;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::debug;

/// Environment of the build, exported when `rpmbuild` runs in the chroot.
pub type Env = BTreeMap<String, String>;

pub type HookList = Vec<Box<dyn Hook>>;

pub const CSWRAP_BIN: &str = "/usr/bin/cswrap";
pub const CSWRAP_CAP_FILE: &str = "/builddir/cswrap-capture.err";
pub const CSEXEC_LOADER: &str = "/usr/bin/csexec-loader";

#[derive(Default)]
pub struct ScanProps {
    /// Name of the scanned package, from the SRPM file name.
    pub pkg: Option<String>,
    pub srpm: Option<PathBuf>,

    pub env: Env,
    /// Directories prepended to `$PATH` for the build.
    pub path: Vec<String>,

    pub install_pkgs: Vec<String>,
    pub install_pkgs_blacklist: Vec<String>,
    pub copy_in_files: Vec<String>,
    pub copy_out_files: Vec<String>,
    pub rpm_opts: Vec<String>,
    pub add_repos: Vec<String>,

    pub run_check: bool,
    pub need_rpm_bi: bool,
    pub shell_cmd_to_build: Option<String>,

    pub cswrap_enabled: bool,
    pub cswrap_path: Option<String>,
    pub cswrap_timeout: u64,
    pub csexec_enabled: bool,

    /// Shell filters applied to the cswrap capture.
    pub cswrap_filters: Vec<String>,
    /// Shell filters applied to the merged results.
    pub result_filters: Vec<String>,
    pub imp_checker_set: BTreeSet<String>,
    /// `(checker, csgrep args)` selecting the important findings of a checker.
    pub imp_csgrep_filters: Vec<(String, String)>,
    pub known_false_positives: Option<PathBuf>,
    pub print_defects: bool,

    pub pre_mock_hooks: HookList,
    pub post_depinst_hooks: HookList,
    pub post_install_hooks: HookList,
    pub post_process_hooks: HookList,
    pub post_build_chroot_cmds: Vec<String>,
}

impl ScanProps {
    pub fn new(cswrap_timeout: u64) -> Self {
        Self {
            cswrap_timeout,
            ..Default::default()
        }
    }

    /// Makes gcc/clang invocations in the chroot go through cswrap.
    pub fn enable_cswrap(&mut self, host: &dyn HostEnv) -> Result<(), ScanError> {
        if self.cswrap_enabled {
            return Ok(());
        }

        let wrap_path = host
            .command_output(&["cswrap", "--print-path-to-wrap"])
            .ok_or_else(|| ScanError::usage("cswrap does not seem to be installed on the host"))?;
        debug!(path = %wrap_path, "Enabling cswrap");

        self.copy_in_files.push(CSWRAP_BIN.to_string());
        self.copy_in_files.push(wrap_path.clone());
        self.path.insert(0, wrap_path.clone());
        self.cswrap_path = Some(wrap_path);

        self.env
            .insert("CSWRAP_CAP_FILE".to_string(), CSWRAP_CAP_FILE.to_string());
        self.env
            .insert("CSWRAP_TIMEOUT".to_string(), self.cswrap_timeout.to_string());
        self.copy_out_files.push(CSWRAP_CAP_FILE.to_string());
        self.cswrap_enabled = true;
        Ok(())
    }

    /// Appends tools whose run cswrap should time out (`CSWRAP_TIMEOUT_FOR`).
    pub fn add_cswrap_timeout_for(&mut self, tools: &[&str]) {
        let entry = self
            .env
            .entry("CSWRAP_TIMEOUT_FOR".to_string())
            .or_default();
        for tool in tools {
            if !entry.is_empty() {
                entry.push(':');
            }
            entry.push_str(tool);
        }
    }

    /// Links the binaries built in `%build` against the csexec loader.
    pub fn enable_csexec(&mut self, host: &dyn HostEnv) -> Result<(), ScanError> {
        if self.csexec_enabled {
            return Ok(());
        }
        self.enable_cswrap(host)?;
        self.install_pkgs.push("csexec".to_string());

        let mut flags = FlagMatrix::new();
        flags.append_flags(&[format!("-Wl,--dynamic-linker,{}", CSEXEC_LOADER)]);
        flags.write_to_env(&mut self.env);
        self.csexec_enabled = true;
        Ok(())
    }

    /// Sets the command csexec runs the built binaries under.
    ///
    /// Only one dynamic analyzer can own the wrapper.
    pub fn set_csexec_wrap_cmd<S: AsRef<str>>(&mut self, argv: &[S]) -> Result<(), ScanError> {
        if self.env.contains_key("CSEXEC_WRAP_CMD") {
            return Err(ScanError::usage(
                "only one dynamic analyzer can wrap the execution of built binaries",
            ));
        }
        let wrap_cmd = argv
            .iter()
            .map(|a| a.as_ref())
            .collect::<Vec<_>>()
            .join("\\a");
        self.env.insert("CSEXEC_WRAP_CMD".to_string(), wrap_cmd);
        Ok(())
    }

    /// Puts `dir` in `$PATH` right before the cswrap directory, or first.
    pub fn insert_path_before_cswrap(&mut self, dir: &str) {
        let idx = self
            .path
            .iter()
            .position(|p| p.ends_with("/cswrap"))
            .unwrap_or(0);
        self.path.insert(idx, dir.to_string());
    }

    /// Whether the given package is going to be installed in the chroot.
    pub fn installs(&self, pkg: &str) -> bool {
        self.install_pkgs.iter().any(|p| p == pkg)
    }

    /// Packages to install, without the blacklisted ones.
    pub fn pkgs_to_install(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.install_pkgs
            .iter()
            .filter(|p| !self.install_pkgs_blacklist.contains(p))
            .filter(|p| seen.insert(p.as_str()))
            .cloned()
            .collect()
    }

    /// `PATH` for the build, with the plugin directories first.
    pub fn build_path(&self) -> String {
        let mut path = self.path.clone();
        path.push("$PATH".to_string());
        path.join(":")
    }
}
