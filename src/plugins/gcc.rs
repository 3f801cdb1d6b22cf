use super::common::install_default_toolver_hook;
use super::{Plugin, PluginContext, Stability};
use crate::cflags::{CustomFlagArgs, FlagMatrix};
use crate::error::ScanError;
use crate::pipeline::hooks::{write_toolver, Hook, HookContext};
use crate::results::Cmd;
use crate::util::shell::serialize_flags;
use anyhow::Result;
use async_trait::async_trait;
use clap::Args;

const CSGCCA_BIN: &str = "/usr/bin/csgcca";
const GCC_WRAPPER_NAME: &str = "csmock-gcc-wrapper";
const GCC_WRAPPER_PATH: &str = "/usr/bin/csmock-gcc-wrapper";

#[derive(Args, Debug, Clone, Default)]
pub struct GccArgs {
    /// Adjust GCC warning level: 0 keeps default flags, 1 appends -Wall and -Wextra,
    /// 2 enables other useful warnings (enables the gcc plugin)
    #[arg(short = 'w', long = "gcc-warning-level", value_name = "LEVEL",
          value_parser = clap::value_parser!(u8).range(0..=2))]
    pub warning_level: Option<u8>,

    /// Run `gcc -fanalyzer` in a separate process
    #[arg(long = "gcc-analyze")]
    pub analyze: bool,

    /// Use a custom build of gcc to perform the analysis (absolute path)
    #[arg(long = "gcc-analyzer-bin", value_name = "PATH")]
    pub analyzer_bin: Option<String>,

    /// Append the given flag when invoking `gcc -fanalyzer` (can be used multiple times)
    #[arg(
        id = "gcc_analyze_add_flag",
        long = "gcc-analyze-add-flag",
        value_name = "FLAG",
        allow_hyphen_values = true,
    )]
    pub analyze_add_flag: Vec<String>,

    /// Set $CC and $CXX to gcc and g++ for the build
    #[arg(long = "gcc-set-env")]
    pub set_env: bool,

    /// Enable %check and compile with -fsanitize=address
    #[arg(long = "gcc-sanitize-address", conflicts_with_all = ["sanitize_leak", "sanitize_thread"])]
    pub sanitize_address: bool,

    /// Enable %check and compile with -fsanitize=leak
    #[arg(long = "gcc-sanitize-leak", conflicts_with = "sanitize_thread")]
    pub sanitize_leak: bool,

    /// Enable %check and compile with -fsanitize=thread
    #[arg(long = "gcc-sanitize-thread")]
    pub sanitize_thread: bool,

    /// Enable %check and compile with -fsanitize=undefined
    #[arg(long = "gcc-sanitize-undefined")]
    pub sanitize_undefined: bool,

    #[command(flatten)]
    pub custom: CustomFlagArgs,
}

impl GccArgs {
    fn any_sanitizer(&self) -> bool {
        self.sanitize_address || self.sanitize_leak || self.sanitize_thread || self.sanitize_undefined
    }
}

pub struct GccPlugin {
    args: GccArgs,
}

impl GccPlugin {
    pub fn new(args: GccArgs) -> Self {
        Self { args }
    }
}

fn enable_sanitizer(cx: &mut PluginContext<'_>, flags: &mut FlagMatrix, pkgs: &[&str], flag: &str) {
    cx.props.run_check = true;
    cx.props
        .install_pkgs
        .extend(pkgs.iter().map(|p| p.to_string()));
    flags.append_flags(&[flag]);

    // sanitizers and valgrind do not mix
    cx.props.install_pkgs_blacklist.push("valgrind".to_string());
}

impl Plugin for GccPlugin {
    fn name(&self) -> &'static str {
        "gcc"
    }

    fn description(&self) -> &'static str {
        "Plugin capturing GCC warnings, optionally with customized compiler flags."
    }

    fn stability(&self) -> Stability {
        Stability::Stable
    }

    fn auto_enabled(&self) -> bool {
        let a = &self.args;
        a.warning_level.is_some()
            || a.analyze
            || a.analyzer_bin.is_some()
            || a.set_env
            || a.any_sanitizer()
            || !a.custom.is_empty()
    }

    fn configure_disabled(&self, cx: &mut PluginContext<'_>) -> Result<(), ScanError> {
        cx.props
            .cswrap_filters
            .push("csgrep --mode=json --invert-match --checker COMPILER_WARNING".to_string());
        Ok(())
    }

    fn configure(&self, cx: &mut PluginContext<'_>) -> Result<(), ScanError> {
        let args = &self.args;
        let mut flags = FlagMatrix::by_warning_level(args.warning_level.unwrap_or(0));

        let mut csgcca_path = None;
        if args.analyze || args.analyzer_bin.is_some() || cx.all_tools {
            if let Some(bin) = args.analyzer_bin.as_deref().filter(|b| !b.starts_with('/')) {
                return Err(ScanError::usage(format!(
                    "--gcc-analyzer-bin should be an absolute path. Found value: '{}'.",
                    bin
                )));
            }

            let path = cx
                .host
                .command_output(&[CSGCCA_BIN, "--print-path-to-wrap"])
                .ok_or_else(|| {
                    ScanError::usage(format!("--gcc-analyze requires {} to be available", CSGCCA_BIN))
                })?;
            cx.props.copy_in_files.push(CSGCCA_BIN.to_string());
            cx.props.copy_in_files.push(path.clone());
            csgcca_path = Some(path);
        }

        if args.set_env {
            cx.props.env.insert("CC".to_string(), "gcc".to_string());
            cx.props.env.insert("CXX".to_string(), "g++".to_string());
        }

        if args.sanitize_address {
            enable_sanitizer(cx, &mut flags, &["libasan"], "-fsanitize=address");
            // the leak checker is too picky even for standard libraries
            cx.props
                .env
                .insert("ASAN_OPTIONS".to_string(), "detect_leaks=0".to_string());
            flags.remove_flags(&["-static"]);
        }

        if args.sanitize_leak {
            enable_sanitizer(cx, &mut flags, &["liblsan"], "-fsanitize=leak");
            flags.remove_flags(&["-static"]);
        }

        if args.sanitize_thread {
            enable_sanitizer(cx, &mut flags, &["libtsan"], "-fsanitize=thread");
            flags.remove_flags(&["-static"]);
        }

        if args.sanitize_undefined {
            enable_sanitizer(
                cx,
                &mut flags,
                &["libubsan", "libubsan-static"],
                "-fsanitize=undefined",
            );
        }

        flags.append_custom_flags(&args.custom);

        if args.any_sanitizer() && cx.props.installs("valgrind") {
            return Err(ScanError::usage(
                "GCC sanitizers are not compatible with valgrind",
            ));
        }

        cx.props.install_pkgs.push("gcc".to_string());
        cx.props.enable_cswrap(cx.host)?;
        cx.props.cswrap_filters.push(
            "csgrep --mode=json --invert-match --checker COMPILER_WARNING --event error".to_string(),
        );
        flags.write_to_env(&mut cx.props.env);

        install_default_toolver_hook(cx.props, "gcc");

        if let Some(csgcca_path) = csgcca_path {
            cx.props.post_depinst_hooks.push(Box::new(CsgccaHook {
                csgcca_path,
                analyzer_bin: args.analyzer_bin.clone(),
                add_flags: args.analyze_add_flag.clone(),
            }));
        }
        Ok(())
    }
}

/// Checks that `gcc -fanalyzer` works in the chroot and hooks csgcca into the build.
struct CsgccaHook {
    csgcca_path: String,
    analyzer_bin: Option<String>,
    add_flags: Vec<String>,
}

#[async_trait]
impl Hook for CsgccaHook {
    fn name(&self) -> &str {
        "gcc-analyzer"
    }

    async fn run(&self, cx: &mut HookContext<'_>) -> Result<i32> {
        let analyzer_bin = self.analyzer_bin.as_deref().unwrap_or("gcc");

        let cmd = format!(
            "echo 'int main() {{}}' | {} -xc - -c -o /dev/null \
             -fanalyzer -fdiagnostics-path-format=separate-events",
            analyzer_bin
        );
        if cx.mock.exec_mockbuild_cmd(cx.results, &cmd).await? != 0 {
            cx.results.error(
                &format!(
                    "`{} -fanalyzer` does not seem to work, disabling the tool",
                    analyzer_bin
                ),
                0,
            )?;
            return Ok(0);
        }

        if self.analyzer_bin.is_some() {
            let cmd = format!(
                "echo '#!/bin/bash\nexec {} \"$@\"' > {} && chmod 755 {}",
                analyzer_bin, GCC_WRAPPER_PATH, GCC_WRAPPER_PATH
            );
            let rv = cx.mock.exec_chroot_cmd(cx.results, &cmd).await?;
            if rv != 0 {
                cx.results
                    .error("failed to create csmock gcc wrapper script", 1)?;
                return Ok(rv);
            }

            let cswrap_path = cx.props.cswrap_path.clone().unwrap_or_default();
            let cmd = format!("ln -sf ../../bin/cswrap {}/{}", cswrap_path, GCC_WRAPPER_NAME);
            let rv = cx.mock.exec_chroot_cmd(cx.results, &cmd).await?;
            if rv != 0 {
                cx.results
                    .error("failed to create csmock gcc wrapper symlink", 1)?;
                return Ok(rv);
            }

            cx.props
                .env
                .insert("CSGCCA_ANALYZER_BIN".to_string(), GCC_WRAPPER_NAME.to_string());
        }

        // csgcca goes right before cswrap so that `gcc -fanalyzer` is not
        // chained through the other compiler wrappers
        cx.props.insert_path_before_cswrap(&self.csgcca_path);

        let timeout_for = if self.analyzer_bin.is_some() {
            GCC_WRAPPER_NAME
        } else {
            "gcc"
        };
        cx.props.add_cswrap_timeout_for(&[timeout_for]);

        if !self.add_flags.is_empty() {
            cx.props.env.insert(
                "CSGCCA_ADD_OPTS".to_string(),
                serialize_flags(&self.add_flags, ":"),
            );
        }

        let version_cmd = format!("{} --version", analyzer_bin);
        let cmd = Cmd::Argv(cx.mock.get_mock_cmd(&["--chroot", version_cmd.as_str()]));
        let (rc, out) = cx.results.get_cmd_output(&cmd).await?;
        if rc != 0 {
            return Ok(rc);
        }
        let first_line = out.lines().next().unwrap_or("").trim();
        let ver = first_line.split(' ').nth(2).unwrap_or(first_line);
        write_toolver(cx.results, "gcc-analyzer", ver)?;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cflags::{ENV_ADD_CFLAGS, ENV_DEL_CFLAGS};
    use crate::config::CsmockConfig;
    use crate::host::MockHost;
    use crate::props::ScanProps;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        gcc: GccArgs,
    }

    fn parse(argv: &[&str]) -> GccArgs {
        let mut full = vec!["csmock"];
        full.extend_from_slice(argv);
        Cli::parse_from(full).gcc
    }

    fn host() -> MockHost {
        let host = MockHost::new();
        host.add_command(&["cswrap", "--print-path-to-wrap"], "/usr/lib64/cswrap");
        host.add_command(&[CSGCCA_BIN, "--print-path-to-wrap"], "/usr/lib64/csgcca");
        host
    }

    fn configure(plugin: &GccPlugin, props: &mut ScanProps, all_tools: bool) -> Result<(), ScanError> {
        let host = host();
        let config = CsmockConfig::default();
        let mut cx = PluginContext {
            props,
            host: &host,
            config: &config,
            all_tools,
        };
        plugin.configure(&mut cx)
    }

    #[test]
    fn test_auto_enable() {
        assert!(!GccPlugin::new(parse(&[])).auto_enabled());
        assert!(GccPlugin::new(parse(&["-w1"])).auto_enabled());
        assert!(GccPlugin::new(parse(&["--gcc-add-flag=-Wformat"])).auto_enabled());
        assert!(GccPlugin::new(parse(&["--gcc-sanitize-undefined"])).auto_enabled());
    }

    #[test]
    fn test_sanitizers_are_exclusive() {
        let cli = Cli::try_parse_from(["csmock", "--gcc-sanitize-address", "--gcc-sanitize-thread"]);
        assert!(cli.is_err());
        let cli = Cli::try_parse_from(["csmock", "--gcc-sanitize-address", "--gcc-sanitize-undefined"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_configure_warning_level() {
        let plugin = GccPlugin::new(parse(&["-w1", "--gcc-del-flag", "-O2"]));
        let mut props = ScanProps::new(30);
        configure(&plugin, &mut props, false).unwrap();

        assert!(props.installs("gcc"));
        assert!(props.cswrap_enabled);
        assert!(props.env[ENV_ADD_CFLAGS].contains("-Wall:-Wextra"));
        assert!(props.env[ENV_DEL_CFLAGS].ends_with(":-O2"));
        assert_eq!(props.post_depinst_hooks.len(), 1);
        assert_eq!(props.post_depinst_hooks[0].name(), "gcc-version");
    }

    #[test]
    fn test_configure_analyzer() {
        let plugin = GccPlugin::new(parse(&["--gcc-analyzer-bin", "/opt/gcc/bin/gcc"]));
        let mut props = ScanProps::new(30);
        configure(&plugin, &mut props, false).unwrap();
        assert!(props.copy_in_files.contains(&CSGCCA_BIN.to_string()));
        assert!(props.copy_in_files.contains(&"/usr/lib64/csgcca".to_string()));
        assert_eq!(props.post_depinst_hooks[1].name(), "gcc-analyzer");

        let plugin = GccPlugin::new(parse(&["--gcc-analyzer-bin", "gcc-14"]));
        let err = configure(&plugin, &mut ScanProps::new(30), false).unwrap_err();
        assert!(err.to_string().contains("absolute path"));
    }

    #[test]
    fn test_all_tools_enables_analyzer() {
        let plugin = GccPlugin::new(parse(&[]));
        let mut props = ScanProps::new(30);
        configure(&plugin, &mut props, true).unwrap();
        assert_eq!(props.post_depinst_hooks.len(), 2);
    }

    #[test]
    fn test_sanitizer_conflicts_with_valgrind() {
        let plugin = GccPlugin::new(parse(&["--gcc-sanitize-address"]));
        let mut props = ScanProps::new(30);
        props.install_pkgs.push("valgrind".to_string());
        let err = configure(&plugin, &mut props, false).unwrap_err();
        assert!(matches!(err, ScanError::Usage(_)));

        let mut props = ScanProps::new(30);
        configure(&plugin, &mut props, false).unwrap();
        assert!(props.run_check);
        assert!(props.installs("libasan"));
        assert_eq!(props.env["ASAN_OPTIONS"], "detect_leaks=0");
        assert!(props.install_pkgs_blacklist.contains(&"valgrind".to_string()));
    }

    #[test]
    fn test_configure_disabled_drops_compiler_warnings() {
        let plugin = GccPlugin::new(GccArgs::default());
        let host = host();
        let config = CsmockConfig::default();
        let mut props = ScanProps::new(30);
        let mut cx = PluginContext {
            props: &mut props,
            host: &host,
            config: &config,
            all_tools: false,
        };
        plugin.configure_disabled(&mut cx).unwrap();
        assert_eq!(
            props.cswrap_filters,
            vec!["csgrep --mode=json --invert-match --checker COMPILER_WARNING"]
        );
    }
}
