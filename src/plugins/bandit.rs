use super::common::{
    capture_filter_hook, copy_in_script, dirs_to_scan, install_default_toolver_hook, paired_flag,
};
use super::{Plugin, PluginContext};
use crate::error::ScanError;
use clap::{Args, ValueEnum};

const BANDIT_CAPTURE: &str = "/builddir/bandit-capture.err";

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[value(rename_all = "UPPER")]
pub enum BanditSeverity {
    #[default]
    Low,
    Medium,
    High,
}

impl BanditSeverity {
    fn flag(self) -> &'static str {
        match self {
            BanditSeverity::Low => "-l",
            BanditSeverity::Medium => "-ll",
            BanditSeverity::High => "-lll",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct BanditArgs {
    /// Make bandit scan files in the build directory (disabled by default)
    #[arg(
        id = "bandit_scan_build",
        long = "bandit-scan-build",
        overrides_with = "bandit_no_scan_build",
    )]
    pub scan_build: bool,

    /// Disables --bandit-scan-build
    #[arg(
        id = "bandit_no_scan_build",
        long = "no-bandit-scan-build",
        overrides_with = "bandit_scan_build",
    )]
    pub no_scan_build: bool,

    /// Make bandit scan files in the install directory (enabled by default)
    #[arg(
        id = "bandit_scan_install",
        long = "bandit-scan-install",
        overrides_with = "bandit_no_scan_install",
    )]
    pub scan_install: bool,

    /// Disables --bandit-scan-install
    #[arg(
        id = "bandit_no_scan_install",
        long = "no-bandit-scan-install",
        overrides_with = "bandit_scan_install",
    )]
    pub no_scan_install: bool,

    /// Report only Bandit defects whose key event matches the given regex
    #[arg(
        id = "bandit_evt_filter",
        long = "bandit-evt-filter",
        value_name = "REGEX",
        default_value = "^B[0-9]+",
    )]
    pub evt_filter: String,

    /// Suppress Bandit defects whose severity level is below the given level
    #[arg(long = "bandit-severity-filter", value_enum, ignore_case = true, default_value = "LOW")]
    pub severity_filter: BanditSeverity,
}

impl Default for BanditArgs {
    fn default() -> Self {
        Self {
            scan_build: false,
            no_scan_build: false,
            scan_install: false,
            no_scan_install: false,
            evt_filter: "^B[0-9]+".to_string(),
            severity_filter: BanditSeverity::Low,
        }
    }
}

pub struct BanditPlugin {
    args: BanditArgs,
}

impl BanditPlugin {
    pub fn new(args: BanditArgs) -> Self {
        Self { args }
    }
}

impl Plugin for BanditPlugin {
    fn name(&self) -> &'static str {
        "bandit"
    }

    fn description(&self) -> &'static str {
        "A tool designed to find common security issues in Python code."
    }

    fn configure(&self, cx: &mut PluginContext<'_>) -> Result<(), ScanError> {
        let a = &self.args;
        let dirs = dirs_to_scan(
            "bandit",
            paired_flag(a.scan_build, a.no_scan_build),
            paired_flag(a.scan_install, a.no_scan_install),
            cx.props,
        )?;

        cx.props.install_pkgs.push("bandit".to_string());
        let script = copy_in_script(cx.props, cx.host, &cx.config.script("run-bandit.sh"))?;
        cx.props.post_build_chroot_cmds.push(format!(
            "shopt -s nullglob && {} {} {} > {}",
            script,
            a.severity_filter.flag(),
            dirs,
            BANDIT_CAPTURE
        ));
        cx.props.copy_out_files.push(BANDIT_CAPTURE.to_string());

        install_default_toolver_hook(cx.props, "bandit");
        cx.props.post_process_hooks.push(Box::new(capture_filter_hook(
            "bandit-filter",
            BANDIT_CAPTURE,
            format!("csgrep --event '{}'", a.evt_filter),
        )));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::configure;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        bandit: BanditArgs,
    }

    #[test]
    fn test_severity_filter() {
        let cli = Cli::parse_from(["csmock", "--bandit-severity-filter", "medium"]);
        assert_eq!(cli.bandit.severity_filter, BanditSeverity::Medium);
        assert_eq!(cli.bandit.evt_filter, "^B[0-9]+");
        assert!(Cli::try_parse_from(["csmock", "--bandit-severity-filter", "CRITICAL"]).is_err());

        let props = configure(&BanditPlugin::new(cli.bandit)).unwrap();
        assert_eq!(
            props.post_build_chroot_cmds[0],
            "shopt -s nullglob && /usr/share/csmock/scripts/run-bandit.sh -ll \
             /builddir/build/BUILDROOT > /builddir/bandit-capture.err"
        );
    }
}
