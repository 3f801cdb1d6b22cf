use super::common::{copy_in_script, install_default_toolver_hook};
use super::{Plugin, PluginContext};
use crate::error::ScanError;
use crate::pipeline::hooks::{ChrootCmdHook, ConvertHook};
use crate::scripts::convert_clippy;
use anyhow::Context;
use std::fs::File;
use std::io::{BufReader, BufWriter};

const CLIPPY_OUTPUT: &str = "/builddir/clippy-output.txt";

pub struct ClippyPlugin;

impl Plugin for ClippyPlugin {
    fn name(&self) -> &'static str {
        "clippy"
    }

    fn description(&self) -> &'static str {
        "Rust source code analyzer which looks for programming errors."
    }

    fn configure(&self, cx: &mut PluginContext<'_>) -> Result<(), ScanError> {
        let script = copy_in_script(cx.props, cx.host, &cx.config.script("inject-clippy.sh"))?;
        cx.props
            .post_depinst_hooks
            .push(Box::new(ChrootCmdHook::root("inject-clippy", script)));

        cx.props.install_pkgs.push("clippy".to_string());
        cx.props.copy_out_files.push(CLIPPY_OUTPUT.to_string());
        install_default_toolver_hook(cx.props, "clippy");

        cx.props.post_process_hooks.push(Box::new(ConvertHook::new(
            "clippy-convert",
            CLIPPY_OUTPUT,
            "clippy-capture.err",
            "csgrep --remove-duplicates",
            |src, dst| {
                let input = File::open(src)
                    .with_context(|| format!("Failed to open {}", src.display()))?;
                let output = File::create(dst)
                    .with_context(|| format!("Failed to create {}", dst.display()))?;
                convert_clippy::convert(BufReader::new(input), BufWriter::new(output))?;
                Ok(())
            },
        )));
        Ok(())
    }
}
