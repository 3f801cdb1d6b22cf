use super::common::{capture_dir_hook, install_default_toolver_hook};
use super::{Plugin, PluginContext, Stability};
use crate::error::ScanError;
use clap::Args;

const STRACE_CAPTURE_DIR: &str = "/builddir/strace-capture";

#[derive(Args, Debug, Clone, Default)]
pub struct StraceArgs {
    /// Append the given flag when invoking strace (can be used multiple times)
    #[arg(
        id = "strace_add_flag",
        long = "strace-add-flag",
        value_name = "FLAG",
        allow_hyphen_values = true,
    )]
    pub add_flag: Vec<String>,
}

/// Records the system calls of the test suite run in `%check`.
///
/// The traces are only copied out, nothing converts them to findings yet.
pub struct StracePlugin {
    args: StraceArgs,
}

impl StracePlugin {
    pub fn new(args: StraceArgs) -> Self {
        Self { args }
    }
}

impl Plugin for StracePlugin {
    fn name(&self) -> &'static str {
        "strace"
    }

    fn description(&self) -> &'static str {
        "A dynamic analysis tool that records system calls associated with a running process."
    }

    fn stability(&self) -> Stability {
        Stability::Experimental
    }

    fn pass_priority(&self) -> u32 {
        0x02
    }

    fn configure(&self, cx: &mut PluginContext<'_>) -> Result<(), ScanError> {
        cx.props.install_pkgs.push("strace".to_string());
        install_default_toolver_hook(cx.props, "strace");
        cx.props.enable_csexec(cx.host)?;

        cx.props
            .post_depinst_hooks
            .push(Box::new(capture_dir_hook("strace", STRACE_CAPTURE_DIR)));

        let mut wrap_cmd = vec![
            "strace".to_string(),
            format!("--output={}/trace", STRACE_CAPTURE_DIR),
            "--output-separately".to_string(),
        ];
        wrap_cmd.extend(self.args.add_flag.iter().cloned());
        cx.props.set_csexec_wrap_cmd(&wrap_cmd)?;

        cx.props.run_check = true;
        cx.props.copy_out_files.push(STRACE_CAPTURE_DIR.to_string());
        Ok(())
    }
}
