use crate::plugins::PluginArgs;
use crate::scripts::{FilterInferArgs, FindUnicodeControlArgs};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Build source RPMs in a mock chroot and capture diagnostics of static analyzers
#[derive(Parser, Debug)]
#[command(
    name = "csmock",
    about = "Build source RPMs in a mock chroot and capture diagnostics of static analyzers",
    version,
    long_about = "csmock rebuilds a source RPM in a mock chroot with the selected analyzers \
                  hooked into the build, then merges their findings into a single set of \
                  results (JSON, plain text, HTML and a summary).\n\n\
                  Examples:\n  \
                  csmock scan units-2.21-4.fc38.src.rpm\n  \
                  csmock scan -t gcc,clang,shellcheck -o units.tar.xz units-2.21-4.fc38.src.rpm\n  \
                  csmock list-tools --format json"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, help = "Print debugging messages of csmock itself")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Scan a source RPM",
        long_about = "Builds the given source RPM in a mock chroot with the enabled analyzers \
                      and stores the results in a directory or a tarball.\n\n\
                      Without --tools or --all-tools the clang, cppcheck and gcc plugins are \
                      enabled. Plugin options that only make sense for one plugin enable it."
    )]
    Scan(ScanArgs),

    #[command(about = "List available analyzer plugins")]
    ListTools(ListToolsArgs),

    #[command(hide = true, about = "Convert cargo clippy JSON messages to csdiff format")]
    ConvertClippy,

    #[command(hide = true, about = "Convert and filter an Infer report")]
    FilterInfer(FilterInferArgs),

    #[command(hide = true, about = "Look for Unicode control characters in sources")]
    FindUnicodeControl(FindUnicodeControlArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    #[arg(value_name = "SRPM", help = "Source RPM to scan")]
    pub srpm: PathBuf,

    #[arg(
        short = 'o',
        long,
        value_name = "PATH",
        help = "Results directory or tarball (.tar, .tar.gz, .tgz, .tar.xz), NVR.tar.xz by default"
    )]
    pub output: Option<PathBuf>,

    #[arg(
        short = 't',
        long,
        value_name = "TOOLS",
        value_delimiter = ',',
        help = "Comma-separated list of plugins to enable (see 'csmock list-tools')"
    )]
    pub tools: Option<Vec<String>>,

    #[arg(short = 'a', long, help = "Enable all stable plugins")]
    pub all_tools: bool,

    #[arg(short = 'r', long = "root", value_name = "PROFILE", help = "Mock profile to use")]
    pub mock_profile: Option<String>,

    #[arg(long = "addrepo", value_name = "URL", help = "Additional repository for mock (can be used multiple times)")]
    pub add_repos: Vec<String>,

    #[arg(short = 'k', long, help = "Continue as much as possible after an error")]
    pub keep_going: bool,

    #[arg(long, help = "Do not clean the chroot and temporary files after the scan")]
    pub no_clean: bool,

    #[arg(
        long,
        value_name = "CMD",
        help = "Build the package with CMD in the BUILD directory instead of rpmbuild -bc"
    )]
    pub shell_cmd: Option<String>,

    #[arg(
        long,
        value_name = "PKGS",
        help = "Space-separated list of extra packages to install into the chroot"
    )]
    pub install: Option<String>,

    #[arg(
        long,
        value_name = "FILE",
        help = "Suppress findings listed in FILE (csdiff JSON)"
    )]
    pub known_false_positives: Option<PathBuf>,

    #[arg(long, help = "Print the final findings to stdout")]
    pub print_defects: bool,

    #[arg(
        long,
        value_name = "SECONDS",
        help = "Time limit for analyzers run by cswrap (default 30, CSMOCK_CSWRAP_TIMEOUT)"
    )]
    pub cswrap_timeout: Option<u64>,

    #[command(flatten)]
    pub plugins: PluginArgs,
}

impl ScanArgs {
    /// Packages given by `--install`.
    pub fn install_pkgs(&self) -> Vec<String> {
        self.install
            .as_deref()
            .map(|pkgs| pkgs.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

#[derive(Args, Debug, Clone)]
pub struct ListToolsArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn scan_args(argv: &[&str]) -> ScanArgs {
        let mut full = vec!["csmock", "scan"];
        full.extend_from_slice(argv);
        match CliArgs::parse_from(full).command {
            Commands::Scan(args) => args,
            other => panic!("Expected Scan command, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_default_scan_args() {
        let args = scan_args(&["units-2.21-4.fc38.src.rpm"]);
        assert_eq!(args.srpm, PathBuf::from("units-2.21-4.fc38.src.rpm"));
        assert!(args.output.is_none());
        assert!(args.tools.is_none());
        assert!(!args.all_tools);
        assert!(!args.keep_going);
        assert!(args.install_pkgs().is_empty());
        assert!(args.cswrap_timeout.is_none());
    }

    #[test]
    fn test_scan_with_options() {
        let args = scan_args(&[
            "-t",
            "gcc,shellcheck",
            "-o",
            "out.tar.gz",
            "-r",
            "fedora-rawhide-x86_64",
            "-k",
            "--install",
            "valgrind  strace",
            "--cswrap-timeout",
            "60",
            "--gcc-warning-level",
            "2",
            "--no-shellcheck-scan-install",
            "units.src.rpm",
        ]);
        assert_eq!(
            args.tools,
            Some(vec!["gcc".to_string(), "shellcheck".to_string()])
        );
        assert_eq!(args.output, Some(PathBuf::from("out.tar.gz")));
        assert_eq!(args.mock_profile.as_deref(), Some("fedora-rawhide-x86_64"));
        assert!(args.keep_going);
        assert_eq!(args.install_pkgs(), vec!["valgrind", "strace"]);
        assert_eq!(args.cswrap_timeout, Some(60));
        assert_eq!(args.plugins.gcc.warning_level, Some(2));
        assert!(args.plugins.shellcheck.no_scan_install);
    }

    #[test]
    fn test_list_tools_format() {
        let args = CliArgs::parse_from(["csmock", "list-tools"]);
        match args.command {
            Commands::ListTools(list) => assert_eq!(list.format, OutputFormatArg::Human),
            _ => panic!("Expected ListTools command"),
        }

        let args = CliArgs::parse_from(["csmock", "list-tools", "--format", "json"]);
        match args.command {
            Commands::ListTools(list) => assert_eq!(list.format, OutputFormatArg::Json),
            _ => panic!("Expected ListTools command"),
        }
    }

    #[test]
    fn test_hidden_helpers() {
        let help = CliArgs::command().render_long_help().to_string();
        assert!(help.contains("list-tools"));
        assert!(!help.contains("convert-clippy"));

        let args = CliArgs::parse_from(["csmock", "filter-infer", "--no-uninit"]);
        assert!(matches!(args.command, Commands::FilterInfer(ref a) if a.no_uninit));

        let args = CliArgs::parse_from(["csmock", "find-unicode-control", "-p", "bidi", "-v", "src"]);
        match args.command {
            Commands::FindUnicodeControl(a) => {
                assert!(a.verbose);
                assert_eq!(a.paths, vec![PathBuf::from("src")]);
            }
            _ => panic!("Expected FindUnicodeControl command"),
        }
    }

    #[test]
    fn test_global_flags() {
        let args = CliArgs::parse_from(["csmock", "-v", "list-tools"]);
        assert!(args.verbose);
        assert!(!args.quiet);

        let args = CliArgs::parse_from(["csmock", "--log-level", "debug", "list-tools"]);
        assert_eq!(args.log_level, Some("debug".to_string()));
    }
}
