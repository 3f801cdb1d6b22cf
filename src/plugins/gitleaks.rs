use super::common::{extract_member, fetch_to_cache, make_executable, require_file};
use super::{Plugin, PluginContext, Stability};
use crate::error::ScanError;
use crate::host::expand_tilde;
use crate::pipeline::hooks::{write_toolver, Hook, HookContext, HostCmdHook};
use crate::results::Cmd;
use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use std::fs;
use std::path::PathBuf;

const GITLEAKS_BIN_URL: &str = "https://github.com/zricethezav/gitleaks/releases/download/v8.15.1/gitleaks_8.15.1_linux_x64.tar.gz";
const GITLEAKS_SCAN_DIR: &str = "/builddir/build/BUILD";
const GITLEAKS_OUTPUT: &str = "/builddir/gitleaks-capture.sarif";
const GITLEAKS_LOG: &str = "/builddir/gitleaks-capture.log";

#[derive(Args, Debug, Clone)]
pub struct GitleaksArgs {
    /// URL to download gitleaks binary executable (in a .tar.gz) from
    #[arg(
        id = "gitleaks_bin_url",
        long = "gitleaks-bin-url",
        value_name = "URL",
        default_value = GITLEAKS_BIN_URL,
    )]
    pub bin_url: String,

    /// Directory where downloaded gitleaks tarballs are cached across runs
    #[arg(id = "gitleaks_cache_dir", long = "gitleaks-cache-dir", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Local configuration file to be used for gitleaks (enables the gitleaks plugin)
    #[arg(long = "gitleaks-config", value_name = "FILE")]
    pub config: Option<String>,

    /// Drop warnings if their count exceeds the specified limit
    #[arg(long = "gitleaks-rate-limit", value_name = "N", default_value_t = 1024)]
    pub rate_limit: u32,

    /// Trim message if it exceeds max message length
    #[arg(long = "gitleaks-limit-msg-len", value_name = "N", default_value_t = 512)]
    pub limit_msg_len: u32,

    /// Force download of gitleaks binary executable
    #[arg(id = "gitleaks_refresh", long = "gitleaks-refresh")]
    pub refresh: bool,
}

impl Default for GitleaksArgs {
    fn default() -> Self {
        Self {
            bin_url: GITLEAKS_BIN_URL.to_string(),
            cache_dir: None,
            config: None,
            rate_limit: 1024,
            limit_msg_len: 512,
            refresh: false,
        }
    }
}

pub struct GitleaksPlugin {
    args: GitleaksArgs,
}

impl GitleaksPlugin {
    pub fn new(args: GitleaksArgs) -> Self {
        Self { args }
    }
}

impl Plugin for GitleaksPlugin {
    fn name(&self) -> &'static str {
        "gitleaks"
    }

    fn description(&self) -> &'static str {
        "Tool for finding secrets in source code."
    }

    fn stability(&self) -> Stability {
        Stability::Stable
    }

    fn auto_enabled(&self) -> bool {
        self.args.config.is_some()
    }

    fn configure(&self, cx: &mut PluginContext<'_>) -> Result<(), ScanError> {
        let config = match &self.args.config {
            Some(path) => {
                let path = expand_tilde(cx.host, path);
                require_file(cx.host, &path)?;
                Some(PathBuf::from(path))
            }
            None => None,
        };

        let cache_dir = self
            .args
            .cache_dir
            .clone()
            .unwrap_or_else(|| cx.config.cache_dir.join("gitleaks"));

        cx.props.pre_mock_hooks.push(Box::new(FetchGitleaksHook {
            url: self.args.bin_url.clone(),
            cache_dir,
            refresh: self.args.refresh,
            config,
        }));

        let rate_limit = self.args.rate_limit;
        let limit_msg_len = self.args.limit_msg_len;
        cx.props
            .post_process_hooks
            .push(Box::new(HostCmdHook::new("gitleaks-filter", move |cx| {
                let src = cx.results.raw_path(GITLEAKS_OUTPUT);
                let dst = cx.results.dbgdir_uni().join("gitleaks-capture.js");
                Some(format!(
                    "csgrep '{}' --mode=json --warning-rate-limit={} --limit-msg-len={} > '{}'",
                    src.display(),
                    rate_limit,
                    limit_msg_len,
                    dst.display()
                ))
            })));
        Ok(())
    }
}

/// Downloads gitleaks, records its version and schedules the scan.
struct FetchGitleaksHook {
    url: String,
    cache_dir: PathBuf,
    refresh: bool,
    config: Option<PathBuf>,
}

#[async_trait]
impl Hook for FetchGitleaksHook {
    fn name(&self) -> &str {
        "gitleaks-fetch"
    }

    async fn run(&self, cx: &mut HookContext<'_>) -> Result<i32> {
        let Some(tgz) =
            fetch_to_cache(cx.results, "gitleaks", &self.url, &self.cache_dir, self.refresh).await?
        else {
            return Ok(1);
        };

        let tmpdir = cx.results.tmpdir().to_path_buf();
        let bin = match extract_member(&tgz, "gitleaks", &tmpdir) {
            Ok(bin) => bin,
            Err(err) => {
                cx.results.error(
                    &format!(
                        "failed to extract gitleaks binary executable from .tar.gz: {}: {:#}",
                        self.url, err
                    ),
                    1,
                )?;
                return Ok(1);
            }
        };
        make_executable(&bin)?;
        let bin = bin.display().to_string();

        let (ec, out) = cx
            .results
            .get_cmd_output(&Cmd::argv([bin.as_str(), "version"]))
            .await?;
        if ec != 0 {
            return Ok(ec);
        }
        write_toolver(cx.results, "gitleaks", out.trim().trim_start_matches('v'))?;

        cx.props.copy_in_files.push(bin.clone());
        cx.props
            .copy_out_files
            .extend([GITLEAKS_OUTPUT.to_string(), GITLEAKS_LOG.to_string()]);

        let mut cmd = format!(
            "{} detect --no-git --source={} --report-path={} --report-format=sarif",
            bin, GITLEAKS_SCAN_DIR, GITLEAKS_OUTPUT
        );
        if let Some(config) = &self.config {
            let dst = tmpdir.join("gitleaks-config.js");
            fs::copy(config, &dst)?;
            cx.props.copy_in_files.push(dst.display().to_string());
            cmd.push_str(&format!(" --config-path={}", dst.display()));
        }
        cmd.push_str(&format!(" 2>{}", GITLEAKS_LOG));
        cx.props.post_build_chroot_cmds.push(cmd);
        Ok(0)
    }
}
