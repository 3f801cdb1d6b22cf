use super::common::{
    capture_filter_hook, copy_in_script, dirs_to_scan, install_default_toolver_hook, paired_flag,
};
use super::{Plugin, PluginContext};
use crate::error::ScanError;
use clap::Args;

const PYLINT_CAPTURE: &str = "/builddir/pylint-capture.err";

#[derive(Args, Debug, Clone)]
pub struct PylintArgs {
    /// Make pylint scan files in the build directory (disabled by default)
    #[arg(
        id = "pylint_scan_build",
        long = "pylint-scan-build",
        overrides_with = "pylint_no_scan_build",
    )]
    pub scan_build: bool,

    /// Disables --pylint-scan-build
    #[arg(
        id = "pylint_no_scan_build",
        long = "no-pylint-scan-build",
        overrides_with = "pylint_scan_build",
    )]
    pub no_scan_build: bool,

    /// Make pylint scan files in the install directory (enabled by default)
    #[arg(
        id = "pylint_scan_install",
        long = "pylint-scan-install",
        overrides_with = "pylint_no_scan_install",
    )]
    pub scan_install: bool,

    /// Disables --pylint-scan-install
    #[arg(
        id = "pylint_no_scan_install",
        long = "no-pylint-scan-install",
        overrides_with = "pylint_scan_install",
    )]
    pub no_scan_install: bool,

    /// Report only Pylint defects whose key event matches the given regex
    /// (use '.*' to get all defects detected by Pylint)
    #[arg(
        id = "pylint_evt_filter",
        long = "pylint-evt-filter",
        value_name = "REGEX",
        default_value = "^W[0-9]+",
    )]
    pub evt_filter: String,
}

impl Default for PylintArgs {
    fn default() -> Self {
        Self {
            scan_build: false,
            no_scan_build: false,
            scan_install: false,
            no_scan_install: false,
            evt_filter: "^W[0-9]+".to_string(),
        }
    }
}

pub struct PylintPlugin {
    args: PylintArgs,
}

impl PylintPlugin {
    pub fn new(args: PylintArgs) -> Self {
        Self { args }
    }
}

impl Plugin for PylintPlugin {
    fn name(&self) -> &'static str {
        "pylint"
    }

    fn description(&self) -> &'static str {
        "Python source code analyzer which looks for programming errors."
    }

    fn pass_priority(&self) -> u32 {
        0x50
    }

    fn configure(&self, cx: &mut PluginContext<'_>) -> Result<(), ScanError> {
        let a = &self.args;
        let dirs = dirs_to_scan(
            "pylint",
            paired_flag(a.scan_build, a.no_scan_build),
            paired_flag(a.scan_install, a.no_scan_install),
            cx.props,
        )?;

        cx.props.install_pkgs.push("pylint".to_string());
        let script = copy_in_script(cx.props, cx.host, &cx.config.script("run-pylint.sh"))?;
        cx.props.post_build_chroot_cmds.push(format!(
            "shopt -s nullglob && {} {} > {}",
            script, dirs, PYLINT_CAPTURE
        ));
        cx.props.copy_out_files.push(PYLINT_CAPTURE.to_string());

        install_default_toolver_hook(cx.props, "pylint");
        cx.props.post_process_hooks.push(Box::new(capture_filter_hook(
            "pylint-filter",
            PYLINT_CAPTURE,
            format!("csgrep --event '{}'", a.evt_filter),
        )));
        Ok(())
    }
}
