use super::common::{fetch_to_cache, make_executable, url_basename};
use super::{Plugin, PluginContext};
use crate::error::ScanError;
use crate::host::expand_tilde;
use crate::pipeline::hooks::{write_toolver, Hook, HookContext, HostCmdHook};
use crate::results::Cmd;
use crate::util::shell::sanitize_opts;
use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use serde_json::Value;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const SNYK_BIN_URL: &str = "https://static.snyk.io/cli/latest/snyk-linux";
const SNYK_SCAN_DIR: &str = "/builddir/build/BUILD";
const SNYK_OUTPUT: &str = "/builddir/snyk-results.sarif";
const SNYK_LOG: &str = "/builddir/snyk-scan.log";
const SNYK_AUTH_DIR: &str = "/builddir/.config/configstore";
const SNYK_STATS_HOOK: &str = "snyk-stats";

/// `snyk code test` found nothing it could analyze.
const NO_SUPPORTED_PROJECT: i32 = 3;

#[derive(Args, Debug, Clone)]
pub struct SnykArgs {
    /// URL to download snyk binary executable
    #[arg(id = "snyk_bin_url", long = "snyk-bin-url", value_name = "URL", conflicts_with = "bin")]
    pub bin_url: Option<String>,

    /// Path to local snyk binary executable (skips download)
    #[arg(long = "snyk-bin", value_name = "PATH")]
    pub bin: Option<String>,

    /// File containing snyk authentication token
    #[arg(long = "snyk-auth", value_name = "FILE", default_value = "~/.config/configstore/snyk.json")]
    pub auth: String,

    /// Directory where downloaded snyk executables are cached across runs
    #[arg(id = "snyk_cache_dir", long = "snyk-cache-dir", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Force download of snyk binary executable
    #[arg(id = "snyk_refresh", long = "snyk-refresh")]
    pub refresh: bool,

    /// Maximum amount of time taken by invocation of Snyk [s]
    #[arg(
        id = "snyk_timeout",
        long = "snyk-timeout",
        value_name = "SECONDS",
        default_value_t = 18000,
    )]
    pub timeout: u64,

    /// Space-separated list of additional options passed to the 'snyk code test' command
    #[arg(long = "snyk-code-test-opts", value_name = "OPTS", allow_hyphen_values = true)]
    pub code_test_opts: Option<String>,
}

impl Default for SnykArgs {
    fn default() -> Self {
        Self {
            bin_url: None,
            bin: None,
            auth: "~/.config/configstore/snyk.json".to_string(),
            cache_dir: None,
            refresh: false,
            timeout: 18000,
            code_test_opts: None,
        }
    }
}

/// Supported, total and percentage of scanned files from a SARIF report.
pub fn coverage_stats(sarif: &Value) -> Option<(u64, u64, u64)> {
    let coverage = sarif
        .get("runs")?
        .get(0)?
        .get("properties")?
        .get("coverage")?
        .as_array()?;

    let mut total = 0;
    let mut supported = 0;
    for lang in coverage {
        let files = lang.get("files")?.as_u64()?;
        total += files;
        if lang.get("type")?.as_str()? == "SUPPORTED" {
            supported += files;
        }
    }
    let ratio = if total > 0 { supported * 100 / total } else { 0 };
    Some((ratio, supported, total))
}

pub struct SnykPlugin {
    args: SnykArgs,
}

impl SnykPlugin {
    pub fn new(args: SnykArgs) -> Self {
        Self { args }
    }
}

impl Plugin for SnykPlugin {
    fn name(&self) -> &'static str {
        "snyk"
    }

    fn description(&self) -> &'static str {
        "Tool to find vulnerabilities in source code."
    }

    fn configure(&self, cx: &mut PluginContext<'_>) -> Result<(), ScanError> {
        let auth = expand_tilde(cx.host, &self.args.auth);
        if !cx.host.is_readable(Path::new(&auth)) {
            return Err(ScanError::usage(format!(
                "unable to read snyk authentication token: {}",
                auth
            )));
        }

        let code_test_opts = match &self.args.code_test_opts {
            Some(opts) => Some(sanitize_opts("--snyk-code-test-opts", opts)?),
            None => None,
        };

        cx.props.imp_checker_set.insert("SNYK_CODE_WARNING".to_string());
        cx.props
            .imp_csgrep_filters
            .push(("SNYK_CODE_WARNING".to_string(), "--event=^error".to_string()));

        let source = match &self.args.bin {
            Some(bin) => SnykSource::Local(PathBuf::from(expand_tilde(cx.host, bin))),
            None => {
                let url = self
                    .args
                    .bin_url
                    .clone()
                    .unwrap_or_else(|| SNYK_BIN_URL.to_string());
                let cache_dir = self
                    .args
                    .cache_dir
                    .clone()
                    .unwrap_or_else(|| cx.config.cache_dir.join("snyk"));
                SnykSource::Download {
                    url,
                    cache_dir,
                    refresh: self.args.refresh,
                }
            }
        };
        let bin = source.bin_path();

        cx.props
            .pre_mock_hooks
            .push(Box::new(FetchSnykHook { source }));
        cx.props.post_depinst_hooks.push(Box::new(CopyResolvConfHook));
        cx.props.post_install_hooks.push(Box::new(SnykScanHook {
            bin: bin.display().to_string(),
            auth,
            code_test_opts,
            timeout: self.args.timeout,
        }));
        cx.props.post_process_hooks.push(Box::new(SnykStatsHook));
        cx.props
            .post_process_hooks
            .push(Box::new(HostCmdHook::new("snyk-filter", |cx| {
                let src = cx.results.raw_path(SNYK_OUTPUT);
                if !src.exists() {
                    return None;
                }
                let dst = cx.results.dbgdir_uni().join("snyk-results.json");
                Some(format!(
                    "csgrep '{}' --mode=json --prepend-path-prefix={}/ --remove-duplicates > '{}'",
                    src.display(),
                    SNYK_SCAN_DIR,
                    dst.display()
                ))
            })));
        Ok(())
    }
}

enum SnykSource {
    Local(PathBuf),
    Download {
        url: String,
        cache_dir: PathBuf,
        refresh: bool,
    },
}

impl SnykSource {
    fn bin_path(&self) -> PathBuf {
        match self {
            SnykSource::Local(path) => path.clone(),
            SnykSource::Download { url, cache_dir, .. } => cache_dir.join(url_basename(url)),
        }
    }
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Makes name resolution work inside the chroot for the online scan.
struct CopyResolvConfHook;

#[async_trait]
impl Hook for CopyResolvConfHook {
    fn name(&self) -> &str {
        "snyk-resolv-conf"
    }

    async fn run(&self, cx: &mut HookContext<'_>) -> Result<i32> {
        cx.mock.copy_in_resolv_conf(cx.results).await?;
        Ok(0)
    }
}

struct FetchSnykHook {
    source: SnykSource,
}

#[async_trait]
impl Hook for FetchSnykHook {
    fn name(&self) -> &str {
        "snyk-fetch"
    }

    async fn run(&self, cx: &mut HookContext<'_>) -> Result<i32> {
        let bin = match &self.source {
            SnykSource::Local(path) => {
                cx.results
                    .print_with_ts(&format!("using local snyk executable: {}", path.display()))?;
                path.clone()
            }
            SnykSource::Download {
                url,
                cache_dir,
                refresh,
            } => {
                let Some(bin) = fetch_to_cache(cx.results, "snyk", url, cache_dir, *refresh).await?
                else {
                    return Ok(1);
                };
                make_executable(&bin)?;
                bin
            }
        };

        if !bin.exists() {
            cx.results
                .error(&format!("snyk binary does not exist: {}", bin.display()), 2)?;
            return Ok(2);
        }
        if !is_executable(&bin) {
            cx.results
                .error(&format!("snyk binary is not executable: {}", bin.display()), 2)?;
            return Ok(2);
        }

        let bin = bin.display().to_string();
        let (ec, out) = cx
            .results
            .get_cmd_output(&Cmd::argv([bin.as_str(), "version"]))
            .await?;
        if ec != 0 {
            cx.results.error("failed to query snyk version", ec)?;
            return Ok(ec);
        }
        let ver = out.split(' ').next().unwrap_or_default().trim();
        write_toolver(cx.results, "snyk-code", ver)?;

        cx.props.copy_in_files.push(bin);
        cx.props
            .copy_out_files
            .extend([SNYK_OUTPUT.to_string(), SNYK_LOG.to_string()]);
        Ok(0)
    }
}

struct SnykScanHook {
    bin: String,
    auth: String,
    code_test_opts: Option<String>,
    timeout: u64,
}

impl SnykScanHook {
    fn scan_cmd(&self) -> String {
        let mut cmd = format!("{} code test -d {}", self.bin, SNYK_SCAN_DIR);
        if let Some(opts) = &self.code_test_opts {
            cmd.push(' ');
            cmd.push_str(opts);
        }
        cmd.push_str(&format!(
            " --sarif-file-output={} >/dev/null 2>{}",
            SNYK_OUTPUT, SNYK_LOG
        ));
        if self.timeout > 0 {
            cmd = format!("/usr/bin/timeout {} {}", self.timeout, cmd);
        }
        cmd
    }
}

#[async_trait]
impl Hook for SnykScanHook {
    fn name(&self) -> &str {
        "snyk-scan"
    }

    async fn run(&self, cx: &mut HookContext<'_>) -> Result<i32> {
        cx.mock
            .exec_chroot_cmd(cx.results, &format!("mkdir -p {}", SNYK_AUTH_DIR))
            .await?;

        let auth_dst = format!("{}/snyk.json", SNYK_AUTH_DIR);
        let ec = cx
            .mock
            .exec_mock_cmd(cx.results, &["--copyin", self.auth.as_str(), auth_dst.as_str()])
            .await?;
        if ec != 0 {
            cx.results
                .error("failed to copy snyk authentication token", ec)?;
            return Ok(ec);
        }

        let ec = cx
            .mock
            .exec_chroot_cmd_online(cx.results, &self.scan_cmd())
            .await?;
        cx.mock
            .exec_chroot_cmd(cx.results, &format!("/bin/rm -fv {}", auth_dst))
            .await?;

        match ec {
            0 | 1 => {}
            NO_SUPPORTED_PROJECT => {
                cx.results
                    .print_with_ts("snyk-code: no supported project for Snyk")?;
                cx.props.copy_out_files.retain(|f| f != SNYK_OUTPUT);
                cx.props
                    .post_process_hooks
                    .retain(|h| h.name() != SNYK_STATS_HOOK);
            }
            ec => {
                cx.results.error(
                    &format!("snyk code returned unexpected exit status: {}", ec),
                    ec,
                )?;
            }
        }
        Ok(0)
    }
}

/// Records how much of the sources snyk was able to analyze.
struct SnykStatsHook;

#[async_trait]
impl Hook for SnykStatsHook {
    fn name(&self) -> &str {
        SNYK_STATS_HOOK
    }

    async fn run(&self, cx: &mut HookContext<'_>) -> Result<i32> {
        let path = cx.results.raw_path(SNYK_OUTPUT);
        let sarif: Value = match fs::read(&path)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| Ok(serde_json::from_slice(&bytes)?))
        {
            Ok(value) => value,
            Err(err) => {
                cx.results.error(
                    &format!("snyk-scan: failed to read {}: {}", path.display(), err),
                    1,
                )?;
                return Ok(1);
            }
        };

        let Some((ratio, supported, total)) = coverage_stats(&sarif) else {
            cx.results.error(
                "snyk-scan: error parsing results from snyk-results.sarif file",
                1,
            )?;
            return Ok(1);
        };
        cx.results.ini_append("snyk-scanned-files-coverage", ratio)?;
        cx.results.ini_append("snyk-scanned-files-success", supported)?;
        cx.results.ini_append("snyk-scanned-files-total", total)?;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::{configure_with, wrapper_host};
    use crate::props::ScanProps;
    use clap::Parser;
    use serde_json::json;

    #[derive(Parser, Debug)]
    struct Cli {
        #[command(flatten)]
        snyk: SnykArgs,
    }

    fn host() -> crate::host::MockHost {
        let host = wrapper_host();
        host.add_file("/home/user/.config/configstore/snyk.json", "{}");
        host
    }

    #[test]
    fn test_missing_token() {
        let mut props = ScanProps::new(30);
        let err = configure_with(&SnykPlugin::new(SnykArgs::default()), &wrapper_host(), &mut props)
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("/home/user/.config/configstore/snyk.json"));
    }

    #[test]
    fn test_configure() {
        let mut props = ScanProps::new(30);
        configure_with(&SnykPlugin::new(SnykArgs::default()), &host(), &mut props).unwrap();

        assert!(props.imp_checker_set.contains("SNYK_CODE_WARNING"));
        assert_eq!(
            props.imp_csgrep_filters,
            vec![("SNYK_CODE_WARNING".to_string(), "--event=^error".to_string())]
        );
        let depinst: Vec<&str> = props.post_depinst_hooks.iter().map(|h| h.name()).collect();
        assert_eq!(depinst, vec!["snyk-resolv-conf"]);
        let post: Vec<&str> = props.post_process_hooks.iter().map(|h| h.name()).collect();
        assert_eq!(post, vec!["snyk-stats", "snyk-filter"]);
    }

    #[test]
    fn test_bin_sources_conflict() {
        let res = Cli::try_parse_from(["csmock", "--snyk-bin", "/usr/bin/snyk", "--snyk-bin-url", "x"]);
        assert!(res.is_err());
    }

    #[test]
    fn test_scan_cmd() {
        let hook = SnykScanHook {
            bin: "/var/tmp/csmock/snyk/snyk-linux".into(),
            auth: "/home/user/.config/configstore/snyk.json".into(),
            code_test_opts: Some("'--severity-threshold=low'".into()),
            timeout: 60,
        };
        assert_eq!(
            hook.scan_cmd(),
            "/usr/bin/timeout 60 /var/tmp/csmock/snyk/snyk-linux code test -d /builddir/build/BUILD \
             '--severity-threshold=low' --sarif-file-output=/builddir/snyk-results.sarif \
             >/dev/null 2>/builddir/snyk-scan.log"
        );
    }

    #[test]
    fn test_coverage_stats() {
        let sarif = json!({"runs": [{"properties": {"coverage": [
            {"files": 6, "type": "SUPPORTED", "lang": "C++"},
            {"files": 3, "type": "FAILED_PARSING", "lang": "C++"},
            {"files": 1, "type": "SUPPORTED", "lang": "Python"}
        ]}}]});
        assert_eq!(coverage_stats(&sarif), Some((70, 7, 10)));
        assert_eq!(coverage_stats(&json!({"runs": []})), None);
        assert_eq!(
            coverage_stats(&json!({"runs": [{"properties": {"coverage": []}}]})),
            Some((0, 0, 0))
        );
    }
}
