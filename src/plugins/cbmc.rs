use super::common::{
    append_to_last, capture_dir_hook, define_no_optflags, install_default_toolver_hook,
    use_compiler, write_unoptimized_flags,
};
use super::{Plugin, PluginContext};
use crate::error::ScanError;
use crate::pipeline::hooks::HostCmdHook;
use clap::Args;

const CBMC_CAPTURE_DIR: &str = "/builddir/cbmc-capture";
const CBMC_DEFAULT_OPTS: &str =
    "--unwind 1 --json-ui --verbosity 4 --pointer-overflow-check --memory-leak-check";

#[derive(Args, Debug, Clone)]
pub struct CbmcArgs {
    /// Append the given flag when invoking cbmc (can be used multiple times)
    #[arg(
        id = "cbmc_add_flag",
        long = "cbmc-add-flag",
        value_name = "FLAG",
        allow_hyphen_values = true,
    )]
    pub add_flag: Vec<String>,

    /// Maximal amount of time taken by analysis of a single process [s]
    #[arg(id = "cbmc_timeout", long = "cbmc-timeout", value_name = "SECONDS", default_value_t = 42)]
    pub timeout: u32,
}

impl Default for CbmcArgs {
    fn default() -> Self {
        Self {
            add_flag: Vec::new(),
            timeout: 42,
        }
    }
}

pub struct CbmcPlugin {
    args: CbmcArgs,
}

impl CbmcPlugin {
    pub fn new(args: CbmcArgs) -> Self {
        Self { args }
    }

    fn wrap_cmd(&self) -> Vec<String> {
        let argv = vec![
            "--skip-ld-linux".to_string(),
            "/usr/bin/csexec-cbmc".to_string(),
            "-t".to_string(),
            self.args.timeout.to_string(),
            "-l".to_string(),
            CBMC_CAPTURE_DIR.to_string(),
            "-c".to_string(),
            CBMC_DEFAULT_OPTS.to_string(),
        ];
        append_to_last(argv, &self.args.add_flag)
    }
}

fn convert_and_filter_cmd(src_dir: &str, dst: &str) -> String {
    format!(
        "set -ex\n\
         chmod -R +r '{src_dir}'\n\
         cd '{src_dir}'\n\
         for file in pid-*.out; do\n\
         \x20   cbmc-convert-output -a < \"$file\" > \"$file.conv\"\n\
         done\n\
         csgrep --mode=json --remove-duplicates pid-*.out.conv > '{dst}'\n"
    )
}

impl Plugin for CbmcPlugin {
    fn name(&self) -> &'static str {
        "cbmc"
    }

    fn description(&self) -> &'static str {
        "Bounded Model Checker for C and C++ programs."
    }

    fn pass_before(&self) -> &'static [&'static str] {
        &["gcc"]
    }

    fn configure(&self, cx: &mut PluginContext<'_>) -> Result<(), ScanError> {
        cx.props
            .install_pkgs
            .extend(["cbmc", "cbmc-utils"].iter().map(|p| p.to_string()));
        install_default_toolver_hook(cx.props, "cbmc");

        cx.props.enable_cswrap(cx.host)?;
        cx.props.cswrap_filters.push(
            "csgrep --mode=json --invert-match --checker GCC_WARNING --event error".to_string(),
        );

        use_compiler(cx.props, "goto-gcc", "goto-gcc");
        define_no_optflags(cx.props, false);

        cx.props.enable_csexec(cx.host)?;
        cx.props
            .post_depinst_hooks
            .push(Box::new(capture_dir_hook("cbmc", CBMC_CAPTURE_DIR)));
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
        cx.props.copy_out_files.push(CBMC_CAPTURE_DIR.to_string());
        cx.props
            .post_process_hooks
            .push(Box::new(HostCmdHook::new("cbmc-filter", |cx| {
                let src_dir = cx.results.raw_path(CBMC_CAPTURE_DIR);
                let dst = cx.results.dbgdir_uni().join("cbmc-capture.js");
                Some(convert_and_filter_cmd(
                    &src_dir.display().to_string(),
                    &dst.display().to_string(),
                ))
            })));
        Ok(())
    }
}
