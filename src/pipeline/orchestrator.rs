use super::hooks::{HookContext, HookPhase};
use crate::config::CsmockConfig;
use crate::error::ScanError;
use crate::mock::MockWrapper;
use crate::progress::{ProgressEvent, ProgressHandler};
use crate::props::ScanProps;
use crate::results::filters::{
    apply_result_filters, handle_known_fp_list, merge_uni_results, process_cswrap_capture,
};
use crate::results::{Cmd, ScanResults};
use crate::util::shell::{shell_quote, strlist_to_shell_cmd};
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

const BUILDDIR: &str = "/builddir";
const SPEC_GLOB: &str = "/builddir/build/SPECS/*.spec";
const BUILD_DIR: &str = "/builddir/build/BUILD";

/// `NAME-VERSION-RELEASE` of a source RPM file name.
pub fn nvr_from_srpm(srpm: &Path) -> Option<String> {
    let file_name = srpm.file_name()?.to_str()?;
    let nvr = file_name.strip_suffix(".src.rpm")?;
    Some(nvr.to_string())
}

/// `NAME` of a source RPM file name.
pub fn pkg_from_srpm(srpm: &Path) -> Option<String> {
    let nvr = nvr_from_srpm(srpm)?;
    let mut parts = nvr.rsplitn(3, '-');
    let _release = parts.next()?;
    let _version = parts.next()?;
    parts.next().filter(|n| !n.is_empty()).map(str::to_string)
}

/// `VAR="value" ... PATH=...` prefix that exports the build environment.
pub fn env_prefix(props: &ScanProps) -> String {
    let mut parts: Vec<String> = props
        .env
        .iter()
        .map(|(k, v)| format!("{}={}", k, shell_quote(v)))
        .collect();
    parts.push(format!("PATH={}", props.build_path()));
    parts.join(" ")
}

/// `rpmbuild` invocation for one stage (`-bc` or `-bi`) of the build.
pub fn rpmbuild_cmd(props: &ScanProps, stage: &str) -> String {
    let mut cmd = format!(
        "{} rpmbuild {} --nodeps --short-circuit",
        env_prefix(props),
        stage
    );
    if stage == "-bi" && !props.run_check {
        cmd.push_str(" --nocheck");
    }
    if !props.rpm_opts.is_empty() {
        cmd.push(' ');
        cmd.push_str(&strlist_to_shell_cmd(&props.rpm_opts, true));
    }
    cmd.push(' ');
    cmd.push_str(SPEC_GLOB);
    cmd
}

/// Build command used instead of `rpmbuild -bc` with `--shell-cmd`.
pub fn shell_build_cmd(props: &ScanProps, shell_cmd: &str) -> String {
    format!(
        "cd {} && {} sh -c {}",
        BUILD_DIR,
        env_prefix(props),
        shell_quote(shell_cmd)
    )
}

/// Runs the hook phases and the chroot build of one scan.
pub struct ScanPipeline<'a> {
    config: &'a CsmockConfig,
    no_clean: bool,
    progress_handler: Option<Box<dyn ProgressHandler>>,
}

impl<'a> ScanPipeline<'a> {
    pub fn new(config: &'a CsmockConfig, progress_handler: Option<Box<dyn ProgressHandler>>) -> Self {
        Self {
            config,
            no_clean: false,
            progress_handler,
        }
    }

    /// Keep the chroot around after the scan.
    pub fn with_no_clean(mut self, no_clean: bool) -> Self {
        self.no_clean = no_clean;
        self
    }

    fn notify(&self, event: ProgressEvent) {
        if let Some(handler) = &self.progress_handler {
            handler.on_progress(&event);
        }
    }

    fn begin(&self, phase: &str) -> Instant {
        info!("Phase: {}", phase);
        self.notify(ProgressEvent::PhaseStarted {
            phase: phase.to_string(),
        });
        Instant::now()
    }

    fn end(&self, phase: &str, start: Instant) {
        debug!("Phase {} complete", phase);
        self.notify(ProgressEvent::PhaseComplete {
            phase: phase.to_string(),
            duration: start.elapsed(),
        });
    }

    /// Scans `props.srpm` and leaves the results in `results`.
    ///
    /// The chroot is cleaned afterwards unless `--no-clean` was given, even
    /// when the scan fails.
    pub async fn execute(
        &self,
        results: &mut ScanResults,
        props: &mut ScanProps,
        mock: &mut MockWrapper,
    ) -> Result<()> {
        let start = Instant::now();
        let pkg = props.pkg.clone().unwrap_or_default();
        self.notify(ProgressEvent::Started {
            pkg,
            profile: mock.profile().to_string(),
        });

        let outcome = self.run_phases(results, props, mock).await;

        if !self.no_clean && mock.is_initialized() {
            let cleaned = mock.clean(results).await;
            if let (Ok(()), Err(e)) = (&outcome, cleaned) {
                return Err(e.into());
            }
        }

        match &outcome {
            Ok(()) => self.notify(ProgressEvent::Completed {
                exit_code: results.ec(),
                total_time: start.elapsed(),
            }),
            Err(e) => self.notify(ProgressEvent::Failed {
                error: format!("{:#}", e),
            }),
        }
        outcome
    }

    async fn run_phases(
        &self,
        results: &mut ScanResults,
        props: &mut ScanProps,
        mock: &mut MockWrapper,
    ) -> Result<()> {
        let srpm = props
            .srpm
            .clone()
            .ok_or_else(|| ScanError::usage("no SRPM given"))?;
        let nvr = nvr_from_srpm(&srpm)
            .ok_or_else(|| ScanError::usage(format!("not a source RPM: {}", srpm.display())))?;

        self.run_hooks(HookPhase::PreMock, results, props, mock).await?;

        let phase = "chroot-init";
        let t = self.begin(phase);
        mock.init(results).await?;
        mock.print_root_path(results).await?;
        mock.install(results, &props.pkgs_to_install()).await?;

        let srpm_host = srpm.display().to_string();
        if mock
            .exec_mock_cmd(results, &["--installdeps", srpm_host.as_str()])
            .await?
            != 0
        {
            return Err(results
                .fatal_error("failed to install build dependencies", 1)
                .into());
        }

        let rpm_list = results.dbgdir().join("rpm-list-mock.txt");
        let cmd = format!(
            "{} | sort -V > '{}'",
            strlist_to_shell_cmd(&mock.get_mock_cmd(&["--quiet", "--chroot", "rpm -qa"]), true),
            rpm_list.display()
        );
        if results.exec_cmd(&Cmd::shell(cmd)).await? != 0 {
            results.error("failed to list packages installed in the chroot", 0)?;
        }

        results.ini_append("mock-config", mock.profile())?;
        results.ini_append("project-name", &nvr)?;
        mock.copy_in(results, &props.copy_in_files).await?;
        self.end(phase, t);

        self.run_hooks(HookPhase::PostDepinst, results, props, mock).await?;

        let phase = "build";
        let t = self.begin(phase);
        let srpm_chroot = format!("{}/{}.src.rpm", BUILDDIR, nvr);
        if mock
            .exec_mock_cmd(results, &["--copyin", srpm_host.as_str(), srpm_chroot.as_str()])
            .await?
            != 0
        {
            return Err(results.fatal_error("failed to copy the SRPM into the chroot", 1).into());
        }
        let prep = format!(
            "rpm -Uvh --nodeps '{}' && rpmbuild -bp --nodeps {}",
            srpm_chroot, SPEC_GLOB
        );
        if mock.exec_mockbuild_cmd(results, &prep).await? != 0 {
            return Err(results.fatal_error("failed to unpack the sources", 1).into());
        }

        let build_cmd = match props.shell_cmd_to_build.as_deref() {
            Some(shell_cmd) => shell_build_cmd(props, shell_cmd),
            None => rpmbuild_cmd(props, "-bc"),
        };
        let rv = mock.exec_mockbuild_cmd(results, &build_cmd).await?;
        if rv != 0 {
            results.error("%build failed", rv)?;
        }
        self.end(phase, t);

        let phase = "post-build";
        let t = self.begin(phase);
        for cmd in props.post_build_chroot_cmds.clone() {
            if mock.exec_mockbuild_cmd(results, &cmd).await? != 0 {
                results.error(&format!("post-build command failed: {}", cmd), 1)?;
            }
        }
        self.end(phase, t);

        if props.need_rpm_bi || props.run_check {
            let phase = "install";
            let t = self.begin(phase);
            let rv = mock
                .exec_mockbuild_cmd(results, &rpmbuild_cmd(props, "-bi"))
                .await?;
            if rv != 0 {
                results.error("%install or %check failed", rv)?;
            }
            self.end(phase, t);
        }

        self.run_hooks(HookPhase::PostInstall, results, props, mock).await?;

        let phase = "copy-out";
        let t = self.begin(phase);
        for path in props.copy_out_files.clone() {
            if mock.copy_out(results, &path).await? != 0 {
                results.print_with_ts(&format!("no results to copy out: {}", path))?;
            }
        }
        self.end(phase, t);

        self.run_hooks(HookPhase::PostProcess, results, props, mock).await?;

        let phase = "results";
        let t = self.begin(phase);
        process_cswrap_capture(results, props).await?;
        handle_known_fp_list(props, results)?;
        merge_uni_results(results).await?;
        apply_result_filters(props, results, &[]).await?;
        self.end(phase, t);

        info!(nvr = %nvr, ec = results.ec(), "Scan complete");
        Ok(())
    }

    /// Runs the hooks of one phase until the phase has none left.
    ///
    /// Hooks may schedule further hooks into the phase that is running.
    pub async fn run_hooks(
        &self,
        phase: HookPhase,
        results: &mut ScanResults,
        props: &mut ScanProps,
        mock: &MockWrapper,
    ) -> Result<()> {
        let start = self.begin(phase.name());

        loop {
            let hooks = std::mem::take(phase.hooks_mut(props));
            if hooks.is_empty() {
                break;
            }

            for hook in &hooks {
                let hook_start = Instant::now();
                let mut cx = HookContext {
                    results: &mut *results,
                    props: &mut *props,
                    mock,
                    config: self.config,
                };
                let rv = hook
                    .run(&mut cx)
                    .await
                    .with_context(|| format!("Hook {} failed", hook.name()))?;

                self.notify(ProgressEvent::HookComplete {
                    phase: phase.name().to_string(),
                    hook: hook.name().to_string(),
                    rv,
                    duration: hook_start.elapsed(),
                });

                if rv != 0 {
                    warn!(phase = %phase, hook = hook.name(), rv, "Hook returned non-zero");
                    results.error(
                        &format!("{} hook {} failed (rv = {})", phase, hook.name(), rv),
                        phase.error_ec(),
                    )?;
                }
            }
        }

        self.end(phase.name(), start);
        Ok(())
    }
}
