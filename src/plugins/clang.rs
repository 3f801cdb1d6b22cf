use super::common::{install_default_toolver_hook, wrap_compiler};
use super::{Plugin, PluginContext};
use crate::error::ScanError;
use crate::util::shell::serialize_flags;
use clap::Args;
use std::path::Path;

const CSCLNGXX_BIN: &str = "/usr/bin/csclng++";

#[derive(Args, Debug, Clone, Default)]
pub struct ClangArgs {
    /// Append the given flag when invoking clang static analyzer (can be used multiple times)
    #[arg(
        id = "clang_add_flag",
        long = "clang-add-flag",
        value_name = "FLAG",
        allow_hyphen_values = true,
    )]
    pub add_flag: Vec<String>,
}

pub struct ClangPlugin {
    args: ClangArgs,
}

impl ClangPlugin {
    pub fn new(args: ClangArgs) -> Self {
        Self { args }
    }
}

impl Plugin for ClangPlugin {
    fn name(&self) -> &'static str {
        "clang"
    }

    fn description(&self) -> &'static str {
        "Source code analysis tool that finds bugs in C, C++, and Objective-C programs."
    }

    fn pass_priority(&self) -> u32 {
        0x30
    }

    fn configure(&self, cx: &mut PluginContext<'_>) -> Result<(), ScanError> {
        cx.props.enable_cswrap(cx.host)?;
        cx.props.add_cswrap_timeout_for(&["clang", "clang++"]);
        if !self.args.add_flag.is_empty() {
            cx.props.env.insert(
                "CSCLNG_ADD_OPTS".to_string(),
                serialize_flags(&self.args.add_flag, ":"),
            );
        }

        cx.props.cswrap_filters.push(
            "csgrep --mode=json --invert-match --checker CLANG_WARNING --event error".to_string(),
        );
        cx.props.install_pkgs.push("clang".to_string());

        wrap_compiler(cx.props, cx.host, "csclng")?;
        if cx.host.exists(Path::new(CSCLNGXX_BIN)) {
            cx.props.copy_in_files.push(CSCLNGXX_BIN.to_string());
        }

        install_default_toolver_hook(cx.props, "clang");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::{configure, configure_with, wrapper_host};
    use crate::props::ScanProps;

    #[test]
    fn test_configure() {
        let plugin = ClangPlugin::new(ClangArgs {
            add_flag: vec!["-Xanalyzer".into(), "-analyzer-checker=core".into()],
        });
        let props = configure(&plugin).unwrap();

        assert_eq!(props.path[0], "/usr/lib64/csclng");
        assert_eq!(props.path[1], "/usr/lib64/cswrap");
        assert_eq!(props.env["CSWRAP_TIMEOUT_FOR"], "clang:clang++");
        assert_eq!(props.env["CSCLNG_ADD_OPTS"], "-Xanalyzer:-analyzer-checker=core");
        assert!(props.installs("clang"));
        assert!(!props.copy_in_files.contains(&CSCLNGXX_BIN.to_string()));
    }

    #[test]
    fn test_copies_cxx_wrapper_when_present() {
        let host = wrapper_host();
        host.add_file(CSCLNGXX_BIN, "");
        let mut props = ScanProps::new(30);
        configure_with(&ClangPlugin::new(ClangArgs::default()), &host, &mut props).unwrap();
        assert!(props.copy_in_files.contains(&CSCLNGXX_BIN.to_string()));
        assert!(!props.env.contains_key("CSCLNG_ADD_OPTS"));
    }
}
