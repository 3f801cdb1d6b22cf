use super::{Plugin, PluginContext};
use crate::error::ScanError;
use crate::pipeline::hooks::{write_toolver, Hook, HookContext, HostCmdHook};
use crate::results::Cmd;
use crate::util::shell::sanitize_opts;
use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use std::fs;
use std::path::{Path, PathBuf};

const SEMGREP_CLI_VERSION: &str = "1.56.0";
const SEMGREP_SCAN_DIR: &str = "/builddir/build/BUILD";
const SEMGREP_SCAN_OUTPUT: &str = "/builddir/semgrep-scan-results.sarif";
const SEMGREP_SCAN_LOG: &str = "/builddir/semgrep-scan.log";

#[derive(Args, Debug, Clone)]
pub struct SemgrepArgs {
    /// Configure whether usage metrics are sent to the Semgrep server
    #[arg(long = "semgrep-metrics", value_name = "MODE", default_value = "off")]
    pub metrics: String,

    /// Semgrep rules repo, assuming rules are located under the 'rules' sub-directory
    #[arg(long = "semgrep-rules-repo", value_name = "URL")]
    pub rules_repo: Option<String>,

    /// Show more details about what rules are running, which files failed to parse, etc.
    #[arg(long = "semgrep-verbose")]
    pub verbose: bool,

    /// Space-separated list of additional options passed to the 'semgrep scan' command
    #[arg(long = "semgrep-scan-opts", value_name = "OPTS", allow_hyphen_values = true)]
    pub scan_opts: Option<String>,
}

impl Default for SemgrepArgs {
    fn default() -> Self {
        Self {
            metrics: "off".to_string(),
            rules_repo: None,
            verbose: false,
            scan_opts: None,
        }
    }
}

/// Both semgrep and its rules live in the results temp dir on the host.
fn lib_dir(tmpdir: &Path) -> PathBuf {
    tmpdir.join("semgrep_lib")
}

fn rules_dir(tmpdir: &Path) -> PathBuf {
    tmpdir.join("semgrep_rules")
}

fn env_prefix(tmpdir: &Path) -> String {
    let lib = lib_dir(tmpdir);
    format!(
        "env PATH={}/bin:$PATH PYTHONPATH={}",
        lib.display(),
        lib.display()
    )
}

fn exit_status_message(ec: i32) -> Option<String> {
    match ec {
        0 => None,
        123 => Some("Indiscriminate errors reported on standard error.".to_string()),
        124 => Some("Command line parsing errors.".to_string()),
        125 => Some("Unexpected internal errors (bugs).".to_string()),
        ec => Some(format!("Scan failed with exit code {}.", ec)),
    }
}

pub struct SemgrepPlugin {
    args: SemgrepArgs,
}

impl SemgrepPlugin {
    pub fn new(args: SemgrepArgs) -> Self {
        Self { args }
    }
}

impl Plugin for SemgrepPlugin {
    fn name(&self) -> &'static str {
        "semgrep"
    }

    fn description(&self) -> &'static str {
        "A fast, open-source, static analysis engine for finding bugs, detecting dependency \
         vulnerabilities, and enforcing code standards."
    }

    fn configure(&self, cx: &mut PluginContext<'_>) -> Result<(), ScanError> {
        let rules_repo = self
            .args
            .rules_repo
            .clone()
            .ok_or_else(|| ScanError::usage("'--semgrep-rules-repo' is required to run semgrep scan"))?;

        let scan_opts = match &self.args.scan_opts {
            Some(opts) => Some(sanitize_opts("--semgrep-scan-opts", opts)?),
            None => None,
        };

        cx.props
            .pre_mock_hooks
            .push(Box::new(PrepareSemgrepHook { rules_repo }));
        cx.props.post_install_hooks.push(Box::new(SemgrepScanHook {
            metrics: self.args.metrics.clone(),
            verbose: self.args.verbose,
            scan_opts,
        }));
        cx.props
            .post_process_hooks
            .push(Box::new(HostCmdHook::new("semgrep-filter", |cx| {
                let src = cx.results.raw_path(SEMGREP_SCAN_OUTPUT);
                if !src.exists() {
                    return None;
                }
                let root = cx.mock.root()?;
                let dst = cx.results.dbgdir_uni().join("semgrep-scan-results.json");

                // rule ids carry the path of the rules checkout, dotted
                let tmp_base = cx
                    .results
                    .tmpdir()
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let rules_re = format!("{}/semgrep_rules/", tmp_base).replace('/', r"\.");

                Some(format!(
                    r"csgrep '{}' --mode=json --strip-path-prefix '{}{}/' | sed 's|[^\[]*{}||' > '{}'",
                    src.display(),
                    root.display(),
                    SEMGREP_SCAN_DIR,
                    rules_re,
                    dst.display()
                ))
            })));
        Ok(())
    }
}

/// Installs the semgrep CLI with pip and clones the rules.
struct PrepareSemgrepHook {
    rules_repo: String,
}

#[async_trait]
impl Hook for PrepareSemgrepHook {
    fn name(&self) -> &str {
        "semgrep-prepare"
    }

    async fn run(&self, cx: &mut HookContext<'_>) -> Result<i32> {
        let tmpdir = cx.results.tmpdir().to_path_buf();
        let lib = lib_dir(&tmpdir);
        if let Err(err) = fs::create_dir_all(&lib) {
            cx.results
                .error(&format!("failed to create semgrep lib directory: {}", err), 1)?;
            return Ok(1);
        }

        let install = format!(
            "python3 -m pip install --target={} semgrep=={}",
            lib.display(),
            SEMGREP_CLI_VERSION
        );
        if cx.results.exec_cmd(&Cmd::shell(install)).await? != 0 {
            cx.results.error("failed to install semgrep cli using pip", 1)?;
            return Ok(1);
        }

        let clone = Cmd::argv([
            "git".to_string(),
            "clone".to_string(),
            "--depth".to_string(),
            "1".to_string(),
            self.rules_repo.clone(),
            rules_dir(&tmpdir).display().to_string(),
        ]);
        let ec = cx.results.exec_cmd(&clone).await?;
        if ec != 0 {
            cx.results.error("failed to download semgrep rules", 1)?;
            return Ok(ec);
        }

        let version = Cmd::shell(format!("{} semgrep --version", env_prefix(&tmpdir)));
        let (ec, out) = cx.results.get_cmd_output(&version).await?;
        if ec != 0 {
            cx.results.error("failed to query semgrep cli version", ec)?;
            return Ok(ec);
        }
        write_toolver(cx.results, "semgrep-cli", out.trim_end())?;

        cx.props
            .copy_out_files
            .extend([SEMGREP_SCAN_OUTPUT.to_string(), SEMGREP_SCAN_LOG.to_string()]);
        Ok(0)
    }
}

/// Scans the unpacked sources from the host through the chroot root.
struct SemgrepScanHook {
    metrics: String,
    verbose: bool,
    scan_opts: Option<String>,
}

impl SemgrepScanHook {
    fn scan_cmd(&self, tmpdir: &Path, root: &Path) -> String {
        let root = root.display();
        let mut cmd = format!(
            "{} semgrep scan --metrics={} --sarif --config={}",
            env_prefix(tmpdir),
            self.metrics,
            rules_dir(tmpdir).join("rules").display()
        );
        if self.verbose {
            cmd.push_str(" --verbose");
        }
        if let Some(opts) = &self.scan_opts {
            cmd.push(' ');
            cmd.push_str(opts);
        }
        cmd.push_str(&format!(
            " --output={root}{SEMGREP_SCAN_OUTPUT} {root}{SEMGREP_SCAN_DIR} 2>{root}{SEMGREP_SCAN_LOG}"
        ));
        cmd
    }
}

#[async_trait]
impl Hook for SemgrepScanHook {
    fn name(&self) -> &str {
        "semgrep-scan"
    }

    async fn run(&self, cx: &mut HookContext<'_>) -> Result<i32> {
        let Some(root) = cx.mock.root() else {
            cx.results.error("semgrep: mock root path is not known", 1)?;
            return Ok(0);
        };

        let cmd = self.scan_cmd(cx.results.tmpdir(), root);
        let ec = cx.results.exec_cmd(&Cmd::shell(cmd.clone())).await?;
        if let Some(msg) = exit_status_message(ec) {
            cx.results
                .error(&format!("semgrep: {} Command: {}", msg, cmd), 1)?;
        }
        Ok(0)
    }
}
