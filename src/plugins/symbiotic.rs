use super::common::{
    append_to_last, capture_dir_hook, define_no_optflags, install_default_toolver_hook,
    use_compiler, write_unoptimized_flags,
};
use super::{Plugin, PluginContext};
use crate::error::ScanError;
use crate::pipeline::hooks::{ChrootCmdHook, HostCmdHook};
use clap::Args;

const SYMBIOTIC_CAPTURE_DIR: &str = "/builddir/symbiotic-capture";
const COPR_REPOS: &[&str] = &[
    "https://download.copr.fedorainfracloud.org/results/@aufover/symbiotic/fedora-$releasever-$basearch/",
    "https://download.copr.fedorainfracloud.org/results/@aufover/gllvm/fedora-$releasever-$basearch/",
];

const COMPILER_FLAGS: &[&str] = &[
    "-Wno-unused-command-line-argument",
    "-Wno-unused-parameter",
    "-Wno-unknown-attributes",
    "-Wno-unused-label",
    "-Wno-unknown-pragmas",
    "-fsanitize-address-use-after-scope",
    "-O0",
    "-Xclang",
    "-disable-llvm-passes",
    "-D__inline=",
    "-g",
    "-Wl,--dynamic-linker,/usr/bin/csexec-loader",
];

#[derive(Args, Debug, Clone)]
pub struct SymbioticArgs {
    /// Append the given flag when invoking symbiotic (can be used multiple times)
    #[arg(
        id = "symbiotic_add_flag",
        long = "symbiotic-add-flag",
        value_name = "FLAG",
        allow_hyphen_values = true,
    )]
    pub add_flag: Vec<String>,

    /// Maximal amount of time taken by analysis of a single process [s]
    #[arg(
        id = "symbiotic_timeout",
        long = "symbiotic-timeout",
        value_name = "SECONDS",
        default_value_t = 30,
    )]
    pub timeout: u32,
}

impl Default for SymbioticArgs {
    fn default() -> Self {
        Self {
            add_flag: Vec::new(),
            timeout: 30,
        }
    }
}

pub struct SymbioticPlugin {
    args: SymbioticArgs,
}

impl SymbioticPlugin {
    pub fn new(args: SymbioticArgs) -> Self {
        Self { args }
    }

    fn wrap_cmd(&self) -> Vec<String> {
        let t = self.args.timeout;
        let argv = vec![
            "--skip-ld-linux".to_string(),
            "/usr/bin/csexec-symbiotic".to_string(),
            "-l".to_string(),
            SYMBIOTIC_CAPTURE_DIR.to_string(),
            "-s".to_string(),
            format!(
                "--prp=memsafety --timeout={t} --instrumentation-timeout={t} --slicer-timeout={t}"
            ),
        ];
        append_to_last(argv, &self.args.add_flag)
    }
}

impl Plugin for SymbioticPlugin {
    fn name(&self) -> &'static str {
        "symbiotic"
    }

    fn description(&self) -> &'static str {
        "A formal verification tool based on instrumentation, program slicing and KLEE."
    }

    fn pass_before(&self) -> &'static [&'static str] {
        &["gcc"]
    }

    fn configure(&self, cx: &mut PluginContext<'_>) -> Result<(), ScanError> {
        cx.props
            .add_repos
            .extend(COPR_REPOS.iter().map(|r| r.to_string()));
        cx.props
            .install_pkgs
            .extend(["symbiotic", "gllvm"].iter().map(|p| p.to_string()));

        cx.props.enable_cswrap(cx.host)?;
        cx.props.cswrap_filters.push(
            "csgrep --mode=json --invert-match --checker CLANG_WARNING --event error".to_string(),
        );

        use_compiler(cx.props, "gclang", "gclang++");
        cx.props
            .post_depinst_hooks
            .push(Box::new(ChrootCmdHook::mockbuild("gllvm-sanity-check", "gsanity-check")));
        define_no_optflags(cx.props, true);
        install_default_toolver_hook(cx.props, "symbiotic");

        cx.props.enable_csexec(cx.host)?;
        cx.props
            .post_depinst_hooks
            .push(Box::new(capture_dir_hook("symbiotic", SYMBIOTIC_CAPTURE_DIR)));
        cx.props.set_csexec_wrap_cmd(&self.wrap_cmd())?;

        write_unoptimized_flags(cx.props, COMPILER_FLAGS);

        cx.props.run_check = true;
        cx.props.copy_out_files.push(SYMBIOTIC_CAPTURE_DIR.to_string());
        cx.props
            .post_process_hooks
            .push(Box::new(HostCmdHook::new("symbiotic-filter", |cx| {
                let src_dir = cx.results.raw_path(SYMBIOTIC_CAPTURE_DIR);
                let dst = cx.results.dbgdir_uni().join("symbiotic-capture.js");
                Some(format!(
                    "chmod -R +r '{src}' && cd '{src}' && \
                     csgrep --mode=json --remove-duplicates pid-*.conv > '{dst}'",
                    src = src_dir.display(),
                    dst = dst.display()
                ))
            })));
        Ok(())
    }
}
