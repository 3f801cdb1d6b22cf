//! Hooks plugins register to run at fixed points of a scan

use crate::config::CsmockConfig;
use crate::mock::MockWrapper;
use crate::props::{HookList, ScanProps};
use crate::results::{Cmd, ScanResults};
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Everything a hook may look at or change while it runs.
pub struct HookContext<'a> {
    pub results: &'a mut ScanResults,
    pub props: &'a mut ScanProps,
    pub mock: &'a MockWrapper,
    pub config: &'a CsmockConfig,
}

/// A unit of work a plugin schedules into one of the hook phases.
///
/// A non-zero return value is reported as an error of the scan. Errors
/// returned from `run` abort the scan.
#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, cx: &mut HookContext<'_>) -> Result<i32>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    PreMock,
    PostDepinst,
    PostInstall,
    PostProcess,
}

impl HookPhase {
    pub fn name(self) -> &'static str {
        match self {
            HookPhase::PreMock => "pre-mock",
            HookPhase::PostDepinst => "post-depinst",
            HookPhase::PostInstall => "post-install",
            HookPhase::PostProcess => "post-process",
        }
    }

    /// Exit code recorded when a hook of this phase fails.
    pub fn error_ec(self) -> i32 {
        match self {
            HookPhase::PostProcess => 0,
            _ => 1,
        }
    }

    pub fn hooks_mut(self, props: &mut ScanProps) -> &mut HookList {
        match self {
            HookPhase::PreMock => &mut props.pre_mock_hooks,
            HookPhase::PostDepinst => &mut props.post_depinst_hooks,
            HookPhase::PostInstall => &mut props.post_install_hooks,
            HookPhase::PostProcess => &mut props.post_process_hooks,
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `NAME-VERSION-RELEASE.ARCH` line for `tool` in the chroot package list.
pub fn version_from_rpm_list(rpm_list: &str, tool: &str) -> Option<String> {
    let prefix = format!("{}-", tool);
    let release = Regex::new(r"-[0-9].*$").ok()?;

    rpm_list
        .lines()
        .filter_map(|line| line.trim().strip_prefix(&prefix))
        .find(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
        .map(|rest| release.replace(rest, "").into_owned())
}

pub fn write_toolver(results: &mut ScanResults, tool_key: &str, ver: &str) -> Result<()> {
    results.ini_append(&format!("analyzer-version-{}", tool_key), ver)?;
    Ok(())
}

/// Records the version of an analyzer installed in the chroot.
pub struct ToolVersionHook {
    name: String,
    tool: String,
    key: String,
}

impl ToolVersionHook {
    pub fn new(tool: &str) -> Self {
        Self {
            name: format!("{}-version", tool.to_lowercase()),
            tool: tool.to_string(),
            key: tool.to_lowercase(),
        }
    }
}

#[async_trait]
impl Hook for ToolVersionHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cx: &mut HookContext<'_>) -> Result<i32> {
        let rpm_list = cx.results.dbgdir().join("rpm-list-mock.txt");
        let content = fs::read_to_string(&rpm_list).unwrap_or_default();

        match version_from_rpm_list(&content, &self.tool) {
            Some(ver) => {
                write_toolver(cx.results, &self.key, &ver)?;
                Ok(0)
            }
            None => {
                cx.results.error(
                    &format!(
                        "tool \"{}\" does not seem to be installed in build root",
                        self.tool
                    ),
                    0,
                )?;
                Ok(1)
            }
        }
    }
}

/// Runs a shell command in the chroot.
pub struct ChrootCmdHook {
    name: String,
    cmd: String,
    as_mockbuild: bool,
}

impl ChrootCmdHook {
    /// Runs as root.
    pub fn root(name: &str, cmd: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            cmd: cmd.into(),
            as_mockbuild: false,
        }
    }

    /// Runs as the unprivileged build user.
    pub fn mockbuild(name: &str, cmd: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            cmd: cmd.into(),
            as_mockbuild: true,
        }
    }
}

#[async_trait]
impl Hook for ChrootCmdHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cx: &mut HookContext<'_>) -> Result<i32> {
        let rv = if self.as_mockbuild {
            cx.mock.exec_mockbuild_cmd(cx.results, &self.cmd).await?
        } else {
            cx.mock.exec_chroot_cmd(cx.results, &self.cmd).await?
        };
        Ok(rv)
    }
}

type RenderFn = dyn Fn(&HookContext<'_>) -> Option<String> + Send + Sync;

/// Runs a shell command on the host, rendered when the hook runs.
///
/// Rendering to `None` skips the hook, e.g. when a capture file is missing.
pub struct HostCmdHook {
    name: String,
    render: Box<RenderFn>,
}

impl HostCmdHook {
    pub fn new<F>(name: &str, render: F) -> Self
    where
        F: Fn(&HookContext<'_>) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            render: Box::new(render),
        }
    }
}

#[async_trait]
impl Hook for HostCmdHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cx: &mut HookContext<'_>) -> Result<i32> {
        match (self.render)(cx) {
            Some(cmd) => Ok(cx.results.exec_cmd(&Cmd::shell(cmd)).await?),
            None => {
                debug!(hook = %self.name, "Nothing to do");
                Ok(0)
            }
        }
    }
}

/// Writes a fixed key into scan.ini.
pub struct IniHook {
    name: String,
    key: String,
    value: String,
}

impl IniHook {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            name: format!("ini-{}", key),
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

#[async_trait]
impl Hook for IniHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cx: &mut HookContext<'_>) -> Result<i32> {
        cx.results.ini_append(&self.key, &self.value)?;
        Ok(0)
    }
}

type ConvertFn = dyn Fn(&Path, &Path) -> Result<()> + Send + Sync;

/// Converts a capture copied out of the chroot in-process, then hands the
/// converted text to csgrep which writes `debug/uni-results/<output>`.
pub struct ConvertHook {
    name: String,
    capture: &'static str,
    output: &'static str,
    csgrep: String,
    convert: Box<ConvertFn>,
}

impl ConvertHook {
    pub fn new<F>(
        name: &str,
        capture: &'static str,
        output: &'static str,
        csgrep: impl Into<String>,
        convert: F,
    ) -> Self
    where
        F: Fn(&Path, &Path) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            capture,
            output,
            csgrep: csgrep.into(),
            convert: Box::new(convert),
        }
    }
}

#[async_trait]
impl Hook for ConvertHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cx: &mut HookContext<'_>) -> Result<i32> {
        let src = cx.results.raw_path(self.capture);
        if !src.is_file() {
            cx.results
                .print_with_ts(&format!("capture not found: {}", src.display()))?;
            return Ok(1);
        }

        let converted = cx.results.tmpdir().join(format!("{}.txt", self.name));
        if let Err(err) = (self.convert)(&src, &converted) {
            warn!(hook = %self.name, error = %err, "Conversion failed");
            cx.results
                .print_with_ts(&format!("{}: {:#}", self.name, err))?;
            return Ok(1);
        }

        let dst = cx.results.dbgdir_uni().join(self.output);
        let cmd = format!(
            "{} '{}' > '{}'",
            self.csgrep,
            converted.display(),
            dst.display()
        );
        Ok(cx.results.exec_cmd(&Cmd::shell(cmd)).await?)
    }
}
