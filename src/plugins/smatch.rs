use super::common::{install_default_toolver_hook, wrap_compiler};
use super::{Plugin, PluginContext, Stability};
use crate::error::ScanError;

pub struct SmatchPlugin;

impl Plugin for SmatchPlugin {
    fn name(&self) -> &'static str {
        "smatch"
    }

    fn description(&self) -> &'static str {
        "Source code analysis for C, based on sparse."
    }

    fn stability(&self) -> Stability {
        Stability::Experimental
    }

    fn pass_priority(&self) -> u32 {
        0x38
    }

    fn configure(&self, cx: &mut PluginContext<'_>) -> Result<(), ScanError> {
        cx.props.enable_cswrap(cx.host)?;
        cx.props.add_cswrap_timeout_for(&["smatch"]);
        cx.props.cswrap_filters.push(
            "csgrep --mode=json --invert-match --checker SMATCH_WARNING --event error".to_string(),
        );
        cx.props.install_pkgs.push("smatch".to_string());

        wrap_compiler(cx.props, cx.host, "csmatch")?;
        install_default_toolver_hook(cx.props, "smatch");
        Ok(())
    }
}
