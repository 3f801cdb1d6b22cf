use super::common::{
    capture_filter_hook, copy_in_script, dirs_to_scan, install_default_toolver_hook, paired_flag,
};
use super::{Plugin, PluginContext};
use crate::error::ScanError;
use clap::Args;

const SHELLCHECK_CAPTURE: &str = "/builddir/shellcheck-capture.err";

#[derive(Args, Debug, Clone, Default)]
pub struct ShellcheckArgs {
    /// Make shellcheck scan files in the build directory (disabled by default)
    #[arg(
        id = "shellcheck_scan_build",
        long = "shellcheck-scan-build",
        overrides_with = "shellcheck_no_scan_build",
    )]
    pub scan_build: bool,

    /// Disables --shellcheck-scan-build
    #[arg(
        id = "shellcheck_no_scan_build",
        long = "no-shellcheck-scan-build",
        overrides_with = "shellcheck_scan_build",
    )]
    pub no_scan_build: bool,

    /// Make shellcheck scan files in the install directory (enabled by default)
    #[arg(
        id = "shellcheck_scan_install",
        long = "shellcheck-scan-install",
        overrides_with = "shellcheck_no_scan_install",
    )]
    pub scan_install: bool,

    /// Disables --shellcheck-scan-install
    #[arg(
        id = "shellcheck_no_scan_install",
        long = "no-shellcheck-scan-install",
        overrides_with = "shellcheck_scan_install",
    )]
    pub no_scan_install: bool,
}

pub struct ShellcheckPlugin {
    args: ShellcheckArgs,
}

impl ShellcheckPlugin {
    pub fn new(args: ShellcheckArgs) -> Self {
        Self { args }
    }
}

impl Plugin for ShellcheckPlugin {
    fn name(&self) -> &'static str {
        "shellcheck"
    }

    fn description(&self) -> &'static str {
        "A static analysis tool that gives warnings and suggestions for bash/sh shell scripts."
    }

    fn pass_priority(&self) -> u32 {
        0x58
    }

    fn configure(&self, cx: &mut PluginContext<'_>) -> Result<(), ScanError> {
        let a = &self.args;
        let dirs = dirs_to_scan(
            "shellcheck",
            paired_flag(a.scan_build, a.no_scan_build),
            paired_flag(a.scan_install, a.no_scan_install),
            cx.props,
        )?;

        cx.props.install_pkgs.push("ShellCheck".to_string());
        let script = copy_in_script(cx.props, cx.host, &cx.config.script("run-shellcheck.sh"))?;
        cx.props
            .post_build_chroot_cmds
            .push(format!("{} {} > {}", script, dirs, SHELLCHECK_CAPTURE));
        cx.props.copy_out_files.push(SHELLCHECK_CAPTURE.to_string());

        install_default_toolver_hook(cx.props, "ShellCheck");
        cx.props.post_process_hooks.push(Box::new(capture_filter_hook(
            "shellcheck-filter",
            SHELLCHECK_CAPTURE,
            r"csgrep --invert-match --event '^note|warning\[SC1090\]'".to_string(),
        )));
        Ok(())
    }
}
