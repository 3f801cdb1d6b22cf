use super::common::{
    append_to_last, capture_dir_hook, define_no_optflags, install_default_toolver_hook,
    use_compiler, write_unoptimized_flags,
};
use super::{Plugin, PluginContext};
use crate::error::ScanError;
use crate::pipeline::hooks::HostCmdHook;
use clap::Args;

const DIVINE_CAPTURE_DIR: &str = "/builddir/divine-capture";
const DIVINE_REPO: &str =
    "https://download.copr.fedorainfracloud.org/results/@aufover/divine/fedora-$releasever-$basearch/";

#[derive(Args, Debug, Clone)]
pub struct DivineArgs {
    /// Append the given flag when invoking divine (can be used multiple times)
    #[arg(
        id = "divine_add_flag",
        long = "divine-add-flag",
        value_name = "FLAG",
        allow_hyphen_values = true,
    )]
    pub add_flag: Vec<String>,

    /// Maximal amount of time taken by analysis of a single process [s]
    #[arg(
        id = "divine_timeout",
        long = "divine-timeout",
        value_name = "SECONDS",
        default_value_t = 150,
    )]
    pub timeout: u32,
}

impl Default for DivineArgs {
    fn default() -> Self {
        Self {
            add_flag: Vec::new(),
            timeout: 150,
        }
    }
}

pub struct DivinePlugin {
    args: DivineArgs,
}

impl DivinePlugin {
    pub fn new(args: DivineArgs) -> Self {
        Self { args }
    }

    fn wrap_cmd(&self) -> Vec<String> {
        let argv = vec![
            "--skip-ld-linux".to_string(),
            "csexec-divine".to_string(),
            "-l".to_string(),
            DIVINE_CAPTURE_DIR.to_string(),
            "-d".to_string(),
            format!("check --max-time {}", self.args.timeout),
        ];
        append_to_last(argv, &self.args.add_flag)
    }
}

impl Plugin for DivinePlugin {
    fn name(&self) -> &'static str {
        "divine"
    }

    fn description(&self) -> &'static str {
        "A formal verification tool based on explicit-state model checking."
    }

    fn pass_before(&self) -> &'static [&'static str] {
        &["gcc"]
    }

    fn configure(&self, cx: &mut PluginContext<'_>) -> Result<(), ScanError> {
        cx.props.add_repos.push(DIVINE_REPO.to_string());
        cx.props.install_pkgs.push("divine".to_string());

        cx.props.enable_cswrap(cx.host)?;
        cx.props.cswrap_filters.push(
            "csgrep --mode=json --invert-match --checker CLANG_WARNING --event error".to_string(),
        );

        use_compiler(cx.props, "dioscc", "diosc++");
        define_no_optflags(cx.props, true);
        install_default_toolver_hook(cx.props, "divine");

        cx.props.enable_csexec(cx.host)?;
        cx.props
            .post_depinst_hooks
            .push(Box::new(capture_dir_hook("divine", DIVINE_CAPTURE_DIR)));
        cx.props.set_csexec_wrap_cmd(&self.wrap_cmd())?;

        write_unoptimized_flags(
            cx.props,
            &[
                "-Wno-unknown-warning-option",
                "-O0",
                "-g",
                "-Wl,--dynamic-linker,/usr/bin/csexec-loader",
            ],
        );

        cx.props.run_check = true;
        cx.props.copy_out_files.push(DIVINE_CAPTURE_DIR.to_string());
        cx.props
            .post_process_hooks
            .push(Box::new(HostCmdHook::new("divine-filter", |cx| {
                let src_dir = cx.results.raw_path(DIVINE_CAPTURE_DIR);
                let dst = cx.results.dbgdir_uni().join("divine-capture.js");
                Some(format!(
                    "csgrep --mode=json --remove-duplicates '{}'/pid-*.conv > '{}'",
                    src_dir.display(),
                    dst.display()
                ))
            })));
        Ok(())
    }
}
