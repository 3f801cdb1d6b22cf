use super::common::{copy_in_script, paired_flag};
use super::{Plugin, PluginContext};
use crate::error::ScanError;
use crate::host::HostEnv;
use crate::pipeline::hooks::{ChrootCmdHook, ConvertHook};
use crate::scripts::filter_infer::{self, FilterOptions};
use crate::util::shell::serialize_flags;
use anyhow::Context;
use clap::Args;
use regex::Regex;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

const INFER_OUT_DIR: &str = "/builddir/infer-out";
const INFER_REPORT: &str = "/builddir/infer-out/report.json";
const DEFAULT_ANALYZE_FLAGS: &str = "--pulse --bufferoverrun";
const ARCHIVE_SEARCH_DIR: &str = "/opt";

const MISSING_ARCHIVE: &str = "The Infer plugin requires an archive with the binary release of Infer. \
The archive can be downloaded from https://github.com/facebook/infer/releases. \
By default, the plugin looks for the archive in /opt/infer-linux*.tar.xz. \
Alternatively, the \"--infer-archive-path INFER_ARCHIVE_PATH\" option can be used to specify the path to the archive.";

#[derive(Args, Debug, Clone, Default)]
pub struct InferArgs {
    /// Append the given flag (except '-o') when invoking 'infer analyze' (can be used multiple times)
    #[arg(
        id = "infer_analyze_add_flag",
        long = "infer-analyze-add-flag",
        value_name = "FLAG",
        allow_hyphen_values = true,
    )]
    pub analyze_add_flag: Vec<String>,

    /// Use the given archive to install Infer (default is /opt/infer-linux*.tar.xz)
    #[arg(long = "infer-archive-path", value_name = "PATH")]
    pub archive_path: Option<String>,

    /// Apply false positive filter (enabled by default)
    #[arg(long = "infer-filter", overrides_with = "no_filter")]
    pub filter: bool,
    #[arg(long = "no-infer-filter", overrides_with = "filter")]
    pub no_filter: bool,

    /// Apply false positive bi-abduction filter (enabled by default)
    #[arg(long = "infer-biabduction-filter", overrides_with = "no_biabduction_filter")]
    pub biabduction_filter: bool,
    #[arg(long = "no-infer-biabduction-filter", overrides_with = "biabduction_filter")]
    pub no_biabduction_filter: bool,

    /// Apply false positive inferbo filter (enabled by default)
    #[arg(long = "infer-inferbo-filter", overrides_with = "no_inferbo_filter")]
    pub inferbo_filter: bool,
    #[arg(long = "no-infer-inferbo-filter", overrides_with = "inferbo_filter")]
    pub no_inferbo_filter: bool,

    /// Apply false positive uninit filter (enabled by default)
    #[arg(long = "infer-uninit-filter", overrides_with = "no_uninit_filter")]
    pub uninit_filter: bool,
    #[arg(long = "no-infer-uninit-filter", overrides_with = "uninit_filter")]
    pub no_uninit_filter: bool,

    /// Lower dead store severity (enabled by default)
    #[arg(long = "infer-dead-store-severity", overrides_with = "no_dead_store_severity")]
    pub dead_store_severity: bool,
    #[arg(long = "no-infer-dead-store-severity", overrides_with = "dead_store_severity")]
    pub no_dead_store_severity: bool,
}

impl InferArgs {
    fn filter_options(&self) -> FilterOptions {
        let on = |yes, no| paired_flag(yes, no).unwrap_or(true);
        if !on(self.filter, self.no_filter) {
            return FilterOptions::transform_only();
        }
        FilterOptions {
            biabduction: on(self.biabduction_filter, self.no_biabduction_filter),
            inferbo: on(self.inferbo_filter, self.no_inferbo_filter),
            uninit: on(self.uninit_filter, self.no_uninit_filter),
            dead_store: on(self.dead_store_severity, self.no_dead_store_severity),
        }
    }

    fn analyze_cmd(&self) -> String {
        let flags = if self.analyze_add_flag.is_empty() {
            DEFAULT_ANALYZE_FLAGS.to_string()
        } else {
            serialize_flags(&self.analyze_add_flag, " ")
        };
        format!("infer analyze --keep-going {} -o {}", flags, INFER_OUT_DIR)
    }
}

/// Archive with the binary release of Infer to install in the chroot.
fn find_archive(host: &dyn HostEnv, given: Option<&str>) -> Result<String, ScanError> {
    if let Some(path) = given {
        if !host.is_file(Path::new(path)) {
            return Err(ScanError::usage(format!(
                "--infer-archive-path: given path \"{}\" doesn't exist",
                path
            )));
        }
        let abs = std::path::absolute(path).map_err(ScanError::Io)?;
        return Ok(abs.display().to_string());
    }

    let re = Regex::new(r"infer-linux.*\.tar\.xz").map_err(|e| ScanError::usage(e.to_string()))?;
    host.read_dir_names(Path::new(ARCHIVE_SEARCH_DIR))
        .unwrap_or_default()
        .into_iter()
        .filter(|name| re.is_match(name))
        .max()
        .map(|name| format!("{}/{}", ARCHIVE_SEARCH_DIR, name))
        .ok_or_else(|| ScanError::usage(MISSING_ARCHIVE))
}

pub struct InferPlugin {
    args: InferArgs,
}

impl InferPlugin {
    pub fn new(args: InferArgs) -> Self {
        Self { args }
    }
}

impl Plugin for InferPlugin {
    fn name(&self) -> &'static str {
        "infer"
    }

    fn description(&self) -> &'static str {
        "Static analysis tool for Java/C/C++ code."
    }

    fn configure(&self, cx: &mut PluginContext<'_>) -> Result<(), ScanError> {
        // python for the reporting module, libtinfo.so.5 and libtinfo.so.6
        cx.props.install_pkgs.extend(
            ["python", "ncurses-compat-libs", "ncurses-libs"]
                .iter()
                .map(|p| p.to_string()),
        );

        let archive = find_archive(cx.host, self.args.archive_path.as_deref())?;
        cx.props.copy_in_files.push(archive.clone());

        let script = copy_in_script(cx.props, cx.host, &cx.config.script("install-infer.sh"))?;
        cx.props.post_depinst_hooks.push(Box::new(ChrootCmdHook::root(
            "install-infer",
            format!("{} {} {}", script, archive, INFER_OUT_DIR),
        )));

        cx.props.post_build_chroot_cmds.push(self.args.analyze_cmd());
        cx.props.copy_out_files.push(INFER_REPORT.to_string());

        let options = self.args.filter_options();
        cx.props.post_process_hooks.push(Box::new(ConvertHook::new(
            "infer-filter",
            INFER_REPORT,
            "infer-results.err",
            "csgrep --quiet",
            move |src, dst| {
                let input = File::open(src)
                    .with_context(|| format!("Failed to open {}", src.display()))?;
                let output = File::create(dst)
                    .with_context(|| format!("Failed to create {}", dst.display()))?;
                filter_infer::filter(BufReader::new(input), BufWriter::new(output), options)?;
                Ok(())
            },
        )));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::{configure_with, wrapper_host};
    use crate::props::ScanProps;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        infer: InferArgs,
    }

    fn host_with_archive() -> crate::host::MockHost {
        let host = wrapper_host();
        host.add_dir("/opt");
        host.add_file("/opt/infer-linux64-v1.0.0.tar.xz", "");
        host.add_file("/opt/infer-linux-x86_64-v1.1.0.tar.xz", "");
        host.add_file("/opt/README", "");
        host
    }

    #[test]
    fn test_configure_default_archive() {
        let mut props = ScanProps::new(30);
        let plugin = InferPlugin::new(InferArgs::default());
        configure_with(&plugin, &host_with_archive(), &mut props).unwrap();

        assert!(props.installs("ncurses-compat-libs"));
        assert_eq!(props.copy_in_files[0], "/opt/infer-linux64-v1.0.0.tar.xz");
        assert_eq!(
            props.post_build_chroot_cmds,
            vec!["infer analyze --keep-going --pulse --bufferoverrun -o /builddir/infer-out"]
        );
        assert_eq!(props.copy_out_files, vec![INFER_REPORT]);
        assert_eq!(props.post_depinst_hooks[0].name(), "install-infer");
        assert_eq!(props.post_process_hooks[0].name(), "infer-filter");
    }

    #[test]
    fn test_missing_archive() {
        let mut props = ScanProps::new(30);
        let plugin = InferPlugin::new(InferArgs::default());
        let err = configure_with(&plugin, &wrapper_host(), &mut props).unwrap_err();
        assert!(err.to_string().contains("/opt/infer-linux*.tar.xz"));

        let plugin = InferPlugin::new(InferArgs {
            archive_path: Some("/nonexistent/infer.tar.xz".into()),
            ..Default::default()
        });
        let err = configure_with(&plugin, &host_with_archive(), &mut props).unwrap_err();
        assert!(err.to_string().contains("doesn't exist"));
    }

    #[test]
    fn test_flags() {
        let cli = Cli::parse_from([
            "csmock",
            "--infer-analyze-add-flag=--quandary",
            "--infer-analyze-add-flag",
            "--no-pulse",
            "--no-infer-inferbo-filter",
            "--no-infer-dead-store-severity",
        ]);
        assert_eq!(
            cli.infer.analyze_cmd(),
            "infer analyze --keep-going --quandary --no-pulse -o /builddir/infer-out"
        );
        let opts = cli.infer.filter_options();
        assert!(opts.biabduction && opts.uninit);
        assert!(!opts.inferbo && !opts.dead_store);

        let cli = Cli::parse_from(["csmock", "--no-infer-filter", "--infer-uninit-filter"]);
        assert_eq!(cli.infer.filter_options(), FilterOptions::transform_only());
    }
}
