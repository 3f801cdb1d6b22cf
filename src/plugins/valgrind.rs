use super::common::{capture_dir_hook, install_default_toolver_hook};
use super::{Plugin, PluginContext};
use crate::error::ScanError;
use crate::pipeline::hooks::{Hook, HookContext, HostCmdHook};
use crate::results::Cmd;
use anyhow::Result;
use async_trait::async_trait;
use clap::Args;

const VALGRIND_CAPTURE_DIR: &str = "/builddir/valgrind-capture";

#[derive(Args, Debug, Clone, Default)]
pub struct ValgrindArgs {
    /// Append the given flag when invoking valgrind (can be used multiple times)
    #[arg(
        id = "valgrind_add_flag",
        long = "valgrind-add-flag",
        value_name = "FLAG",
        allow_hyphen_values = true,
    )]
    pub add_flag: Vec<String>,
}

pub struct ValgrindPlugin {
    args: ValgrindArgs,
}

impl ValgrindPlugin {
    pub fn new(args: ValgrindArgs) -> Self {
        Self { args }
    }

    fn wrap_cmd(&self) -> Vec<String> {
        let mut argv = vec![
            "valgrind".to_string(),
            "--xml=yes".to_string(),
            format!("--xml-file={}/pid-%p-%n.xml", VALGRIND_CAPTURE_DIR),
            format!("--log-file={}/pid-%p-%n.log", VALGRIND_CAPTURE_DIR),
            "--child-silent-after-fork=yes".to_string(),
        ];
        argv.extend(self.args.add_flag.iter().cloned());
        argv
    }
}

impl Plugin for ValgrindPlugin {
    fn name(&self) -> &'static str {
        "valgrind"
    }

    fn description(&self) -> &'static str {
        "A dynamic analysis tool for finding memory management bugs in programs."
    }

    /// Goes before gcc so that csexec is hooked in first.
    fn pass_priority(&self) -> u32 {
        0x01
    }

    fn configure(&self, cx: &mut PluginContext<'_>) -> Result<(), ScanError> {
        cx.props.install_pkgs.push("valgrind".to_string());
        install_default_toolver_hook(cx.props, "valgrind");
        cx.props.enable_csexec(cx.host)?;

        cx.props
            .post_depinst_hooks
            .push(Box::new(capture_dir_hook("valgrind", VALGRIND_CAPTURE_DIR)));
        cx.props.set_csexec_wrap_cmd(&self.wrap_cmd())?;
        cx.props.run_check = true;
        cx.props.copy_out_files.push(VALGRIND_CAPTURE_DIR.to_string());

        cx.props.post_process_hooks.push(Box::new(EmptyLogCleanupHook));
        cx.props
            .post_process_hooks
            .push(Box::new(HostCmdHook::new("valgrind-filter", |cx| {
                let src_dir = cx.results.raw_path(VALGRIND_CAPTURE_DIR);
                let dst = cx.results.dbgdir_uni().join("valgrind-capture.js");
                Some(format!(
                    "csgrep --mode=json --quiet --remove-duplicates '{}'/*.xml > '{}'",
                    src_dir.display(),
                    dst.display()
                ))
            })));
        Ok(())
    }
}

/// Valgrind leaves an empty log behind for every process it ran.
struct EmptyLogCleanupHook;

#[async_trait]
impl Hook for EmptyLogCleanupHook {
    fn name(&self) -> &str {
        "valgrind-cleanup"
    }

    async fn run(&self, cx: &mut HookContext<'_>) -> Result<i32> {
        let dir = cx.results.raw_path(VALGRIND_CAPTURE_DIR);
        let cmd = Cmd::argv([
            "find".to_string(),
            dir.display().to_string(),
            "-name".to_string(),
            "pid-*.log".to_string(),
            "-empty".to_string(),
            "-delete".to_string(),
        ]);
        Ok(cx.results.exec_cmd(&cmd).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::configure;

    #[test]
    fn test_configure() {
        let plugin = ValgrindPlugin::new(ValgrindArgs {
            add_flag: vec!["--leak-check=full".to_string()],
        });
        let props = configure(&plugin).unwrap();

        assert!(props.installs("valgrind"));
        assert!(props.installs("csexec"));
        assert!(props.run_check);
        assert!(props.csexec_enabled);
        assert_eq!(
            props.env["CSEXEC_WRAP_CMD"],
            "valgrind\\a--xml=yes\\a--xml-file=/builddir/valgrind-capture/pid-%p-%n.xml\\a\
             --log-file=/builddir/valgrind-capture/pid-%p-%n.log\\a--child-silent-after-fork=yes\\a\
             --leak-check=full"
        );
        assert!(props.copy_out_files.contains(&VALGRIND_CAPTURE_DIR.to_string()));

        let hooks: Vec<&str> = props.post_process_hooks.iter().map(|h| h.name()).collect();
        assert_eq!(hooks, vec!["valgrind-cleanup", "valgrind-filter"]);
    }
}
