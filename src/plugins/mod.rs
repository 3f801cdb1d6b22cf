//! Analyzer plugins
//!
//! A plugin owns the command-line options of one analyzer. When the scan is
//! configured it edits the shared [`ScanProps`]: packages to install, files
//! to copy in and out, environment of the build, hooks and result filters.

pub mod common;
pub mod registry;
#[cfg(test)]
pub(crate) mod testing;

mod bandit;
mod cbmc;
mod clang;
mod clippy;
mod cppcheck;
mod divine;
mod gcc;
mod gitleaks;
mod infer;
mod pylint;
mod semgrep;
mod shellcheck;
mod smatch;
mod snyk;
mod strace;
mod symbiotic;
mod unicontrol;
mod valgrind;

pub use bandit::{BanditArgs, BanditPlugin};
pub use cbmc::{CbmcArgs, CbmcPlugin};
pub use clang::{ClangArgs, ClangPlugin};
pub use clippy::ClippyPlugin;
pub use cppcheck::{CppcheckArgs, CppcheckPlugin};
pub use divine::{DivineArgs, DivinePlugin};
pub use gcc::{GccArgs, GccPlugin};
pub use gitleaks::{GitleaksArgs, GitleaksPlugin};
pub use infer::{InferArgs, InferPlugin};
pub use pylint::{PylintArgs, PylintPlugin};
pub use registry::{PluginArgs, PluginRegistry, ToolSelection};
pub use semgrep::{SemgrepArgs, SemgrepPlugin};
pub use shellcheck::{ShellcheckArgs, ShellcheckPlugin};
pub use smatch::SmatchPlugin;
pub use snyk::{SnykArgs, SnykPlugin};
pub use strace::{StraceArgs, StracePlugin};
pub use symbiotic::{SymbioticArgs, SymbioticPlugin};
pub use unicontrol::{UnicontrolArgs, UnicontrolPlugin};
pub use valgrind::{ValgrindArgs, ValgrindPlugin};

use crate::config::CsmockConfig;
use crate::error::ScanError;
use crate::host::HostEnv;
use crate::props::ScanProps;
use serde::Serialize;
use std::fmt;

pub const DEFAULT_PASS_PRIORITY: u32 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    /// Enabled by `--all-tools`.
    Stable,
    Normal,
    Experimental,
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stability::Stable => "stable",
            Stability::Normal => "normal",
            Stability::Experimental => "experimental",
        };
        f.write_str(s)
    }
}

/// What a plugin can see and change while it is configured.
pub struct PluginContext<'a> {
    pub props: &'a mut ScanProps,
    pub host: &'a dyn HostEnv,
    pub config: &'a CsmockConfig,
    /// `--all-tools` was given.
    pub all_tools: bool,
}

pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn stability(&self) -> Stability {
        Stability::Normal
    }

    /// Lower runs first among plugins not ordered by [`Plugin::pass_before`].
    fn pass_priority(&self) -> u32 {
        DEFAULT_PASS_PRIORITY
    }

    /// Plugins this one has to be configured before.
    fn pass_before(&self) -> &'static [&'static str] {
        &[]
    }

    /// Options given on the command line enable the plugin on their own.
    fn auto_enabled(&self) -> bool {
        false
    }

    fn configure(&self, cx: &mut PluginContext<'_>) -> Result<(), ScanError>;

    /// Called instead of [`Plugin::configure`] when the plugin is not enabled.
    fn configure_disabled(&self, _cx: &mut PluginContext<'_>) -> Result<(), ScanError> {
        Ok(())
    }
}
