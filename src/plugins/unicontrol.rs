use super::{Plugin, PluginContext, Stability};
use crate::error::ScanError;
use crate::pipeline::hooks::{Hook, HookContext, HostCmdHook, IniHook};
use crate::scripts::find_unicode_control::{CharSet, Scanner};
use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

const UNICONTROL_SCAN_DIR: &str = "/builddir/build/BUILD";
const UNICONTROL_OUTPUT: &str = "/builddir/unicontrol-capture.err";
const UNICONTROL_LOG: &str = "/builddir/unicontrol-capture.log";
const UNICONTROL_VERSION: &str = "0.0.1";

#[derive(Args, Debug, Clone, Default)]
pub struct UnicontrolArgs {
    /// Look for bidirectional control characters only
    #[arg(long = "unicontrol-bidi-only")]
    pub bidi_only: bool,

    /// Exclude tests (basically test.* as a component of path)
    #[arg(long = "unicontrol-notests")]
    pub notests: bool,
}

pub struct UnicontrolPlugin {
    args: UnicontrolArgs,
}

impl UnicontrolPlugin {
    pub fn new(args: UnicontrolArgs) -> Self {
        Self { args }
    }
}

impl Plugin for UnicontrolPlugin {
    fn name(&self) -> &'static str {
        "unicontrol"
    }

    fn description(&self) -> &'static str {
        "Looks for Unicode control characters that can hide code from review."
    }

    fn stability(&self) -> Stability {
        Stability::Experimental
    }

    fn configure(&self, cx: &mut PluginContext<'_>) -> Result<(), ScanError> {
        cx.props.pre_mock_hooks.push(Box::new(IniHook::new(
            "analyzer-version-unicontrol",
            UNICONTROL_VERSION,
        )));

        let chars = if self.args.bidi_only {
            CharSet::Bidi
        } else {
            CharSet::Format
        };
        cx.props.post_install_hooks.push(Box::new(UnicontrolScanHook {
            chars,
            notests: self.args.notests,
        }));

        cx.props
            .post_process_hooks
            .push(Box::new(HostCmdHook::new("unicontrol-filter", |cx| {
                let src = cx.results.raw_path(UNICONTROL_OUTPUT);
                let dst = cx.results.dbgdir_uni().join("unicontrol-capture.js");
                Some(format!(
                    "csgrep --mode=json '{}' > '{}'",
                    src.display(),
                    dst.display()
                ))
            })));
        Ok(())
    }
}

/// Scans the unpacked sources through the chroot root on the host.
struct UnicontrolScanHook {
    chars: CharSet,
    notests: bool,
}

fn create_raw(path: PathBuf) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file =
        File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

#[async_trait]
impl Hook for UnicontrolScanHook {
    fn name(&self) -> &str {
        "unicontrol-scan"
    }

    async fn run(&self, cx: &mut HookContext<'_>) -> Result<i32> {
        let Some(scan_dir) = cx.mock.host_path(UNICONTROL_SCAN_DIR) else {
            cx.results
                .print_with_ts("unicontrol: mock root path is not known")?;
            return Ok(1);
        };

        let mut out = create_raw(cx.results.raw_path(UNICONTROL_OUTPUT))?;
        let mut log = create_raw(cx.results.raw_path(UNICONTROL_LOG))?;
        let scanner = Scanner::new(self.chars, self.notests, &[], &[])?;

        let found = tokio::task::spawn_blocking(move || {
            scanner.scan(&scan_dir, Path::new(UNICONTROL_SCAN_DIR), &mut out, &mut log)
        })
        .await
        .context("unicontrol scan panicked")??;

        info!(found, "Unicode control character scan finished");
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::configure;

    #[test]
    fn test_configure() {
        let props = configure(&UnicontrolPlugin::new(UnicontrolArgs::default())).unwrap();
        assert_eq!(props.pre_mock_hooks[0].name(), "ini-analyzer-version-unicontrol");
        assert_eq!(props.post_install_hooks[0].name(), "unicontrol-scan");
        assert_eq!(props.post_process_hooks[0].name(), "unicontrol-filter");
        assert!(props.copy_out_files.is_empty());
        assert!(props.install_pkgs.is_empty());
    }
}
