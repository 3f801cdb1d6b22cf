use super::common::wrap_compiler;
use super::{Plugin, PluginContext, Stability};
use crate::error::ScanError;
use crate::pipeline::hooks::{write_toolver, Hook, HookContext};
use crate::results::Cmd;
use crate::util::shell::serialize_flags;
use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use std::path::Path;

const TINYXML2_PROBE: &str = "rpm -q cppcheck --requires | grep tinyxml2 > /dev/null";

#[derive(Args, Debug, Clone, Default)]
pub struct CppcheckArgs {
    /// Use statically linked cppcheck installed on the host (enables the cppcheck plugin)
    #[arg(long = "use-host-cppcheck")]
    pub use_host_cppcheck: bool,

    /// Append the given flag when invoking cppcheck (can be used multiple times)
    #[arg(
        id = "cppcheck_add_flag",
        long = "cppcheck-add-flag",
        value_name = "FLAG",
        allow_hyphen_values = true,
    )]
    pub add_flag: Vec<String>,
}

pub struct CppcheckPlugin {
    args: CppcheckArgs,
}

impl CppcheckPlugin {
    pub fn new(args: CppcheckArgs) -> Self {
        Self { args }
    }
}

impl Plugin for CppcheckPlugin {
    fn name(&self) -> &'static str {
        "cppcheck"
    }

    fn description(&self) -> &'static str {
        "Static analysis tool for C/C++ code."
    }

    fn stability(&self) -> Stability {
        Stability::Stable
    }

    fn pass_priority(&self) -> u32 {
        0x20
    }

    fn auto_enabled(&self) -> bool {
        self.args.use_host_cppcheck
    }

    fn configure(&self, cx: &mut PluginContext<'_>) -> Result<(), ScanError> {
        cx.props.enable_cswrap(cx.host)?;
        cx.props.add_cswrap_timeout_for(&["cppcheck"]);
        cx.props.cswrap_filters.push(
            "csgrep --mode=json --invert-match --checker CPPCHECK_WARNING \
             --event 'cppcheckError|internalAstError|normalCheckLevelMaxBranches|preprocessorErrorDirective|syntaxError|unknownMacro'"
                .to_string(),
        );

        if !self.args.add_flag.is_empty() {
            cx.props.env.insert(
                "CSCPPC_ADD_OPTS".to_string(),
                serialize_flags(&self.args.add_flag, ":"),
            );
        }

        wrap_compiler(cx.props, cx.host, "cscppc")?;
        cx.props.copy_in_files.push("/usr/share/cscppc".to_string());

        if self.args.use_host_cppcheck {
            if cx.host.shell_succeeds(TINYXML2_PROBE) {
                cx.props.install_pkgs.push("tinyxml2".to_string());
            }
            cx.props.copy_in_files.push("/usr/bin/cppcheck".to_string());
            for data_dir in ["/usr/share/Cppcheck", "/usr/share/cppcheck"] {
                if cx.host.is_dir(Path::new(data_dir)) {
                    cx.props.copy_in_files.push(data_dir.to_string());
                }
            }
        } else {
            cx.props.install_pkgs.push("cppcheck".to_string());
        }

        cx.props.post_depinst_hooks.push(Box::new(CppcheckVersionHook {
            use_host_cppcheck: self.args.use_host_cppcheck,
        }));
        Ok(())
    }
}

struct CppcheckVersionHook {
    use_host_cppcheck: bool,
}

#[async_trait]
impl Hook for CppcheckVersionHook {
    fn name(&self) -> &str {
        "cppcheck-version"
    }

    async fn run(&self, cx: &mut HookContext<'_>) -> Result<i32> {
        let cmd = Cmd::Argv(cx.mock.get_mock_cmd(&["--chroot", "cppcheck --version"]));
        let (ec, out) = cx.results.get_cmd_output(&cmd).await?;
        if ec != 0 {
            if self.use_host_cppcheck {
                cx.results.error(
                    "--use-host-cppcheck expects statically linked cppcheck installed on the host",
                    0,
                )?;
            }
            cx.results.error("failed to query cppcheck version", ec)?;
            return Ok(ec);
        }

        let out = out.trim();
        let ver = out.strip_prefix("Cppcheck ").unwrap_or(out);
        write_toolver(cx.results, "cppcheck", ver)?;
        Ok(0)
    }
}
