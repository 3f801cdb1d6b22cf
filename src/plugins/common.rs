//! Helpers shared by several plugins

use crate::cflags::FlagMatrix;
use crate::error::ScanError;
use crate::host::HostEnv;
use crate::pipeline::hooks::{ChrootCmdHook, HostCmdHook, ToolVersionHook};
use crate::props::ScanProps;
use crate::results::ScanResults;
use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const BUILD_DIR: &str = "/builddir/build/BUILD";
pub const BUILDROOT_DIR: &str = "/builddir/build/BUILDROOT";

const OPTIMIZATION_FLAGS: &[&str] = &["-O1", "-O2", "-O3", "-Os", "-Ofast", "-Og"];

/// Resolves a `--X` / `--no-X` pair; `None` when neither was given.
pub fn paired_flag(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

/// Directories a script-based analyzer scans, per `--<tool>-scan-build`
/// and `--<tool>-scan-install`.
///
/// The build directory is scanned by default with `--shell-cmd`, the
/// install directory otherwise.
pub fn dirs_to_scan(
    tool: &str,
    scan_build: Option<bool>,
    scan_install: Option<bool>,
    props: &mut ScanProps,
) -> Result<String, ScanError> {
    let has_shell_cmd = props.shell_cmd_to_build.is_some();
    let scan_build = scan_build.unwrap_or(has_shell_cmd);
    let scan_install = scan_install.unwrap_or(!has_shell_cmd);

    if !scan_build && !scan_install {
        return Err(ScanError::usage(format!(
            "either --{tool}-scan-build or --{tool}-scan-install must be enabled"
        )));
    }

    if scan_install && has_shell_cmd {
        return Err(ScanError::usage(format!(
            "--shell-cmd and --{tool}-scan-install cannot be used together"
        )));
    }

    let mut dirs = Vec::new();
    if scan_build {
        dirs.push(BUILD_DIR);
    }
    if scan_install {
        dirs.push(BUILDROOT_DIR);
        props.need_rpm_bi = true;
    }
    Ok(dirs.join(" "))
}

/// Records the version of `tool` once the chroot packages are installed.
pub fn install_default_toolver_hook(props: &mut ScanProps, tool: &str) {
    props
        .post_depinst_hooks
        .push(Box::new(ToolVersionHook::new(tool)));
}

/// Converts a capture copied out of the chroot into `debug/uni-results`,
/// piping it through `filter`.
pub fn capture_filter_hook(name: &str, capture: &'static str, filter: String) -> HostCmdHook {
    HostCmdHook::new(name, move |cx| {
        let src = cx.results.raw_path(capture);
        let file_name = Path::new(capture)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dst = cx.results.dbgdir_uni().join(file_name);
        Some(format!(
            "csgrep --quiet '{}' | {} > '{}'",
            src.display(),
            filter,
            dst.display()
        ))
    })
}

/// Creates the directory a dynamic analyzer writes its capture into.
pub fn capture_dir_hook(tool: &str, dir: &str) -> ChrootCmdHook {
    ChrootCmdHook::mockbuild(
        &format!("{}-capture-dir", tool),
        format!("mkdir -pv '{}'", dir),
    )
}

/// Builds the package with another compiler driver.
pub fn use_compiler(props: &mut ScanProps, cc: &str, cxx: &str) {
    props.env.insert("CC".to_string(), cc.to_string());
    props.env.insert("CXX".to_string(), cxx.to_string());
    for define in [
        format!("__cc {}", cc),
        format!("__cxx {}", cxx),
        format!("__cpp {} -E", cc),
    ] {
        props.rpm_opts.push("--define".to_string());
        props.rpm_opts.push(define);
    }
}

/// Overrides the distribution compiler flags with `-O0`.
pub fn define_no_optflags(props: &mut ScanProps, clang_toolchain: bool) {
    let mut defines = vec!["optflags -O0", "build_ldflags -O0"];
    if clang_toolchain {
        defines.insert(0, "toolchain clang");
    }
    for define in defines {
        props.rpm_opts.push("--define".to_string());
        props.rpm_opts.push(define.to_string());
    }
}

/// Writes `extra` on top of the warning level 0 flags, with optimization off.
pub fn write_unoptimized_flags(props: &mut ScanProps, extra: &[&str]) {
    let mut flags = FlagMatrix::by_warning_level(0);
    flags.append_flags(extra);
    flags.remove_flags(OPTIMIZATION_FLAGS);
    flags.write_to_env(&mut props.env);
}

/// Appends the `--<tool>-add-flag` values to the last argument of a csexec
/// wrapper command line.
pub fn append_to_last(mut argv: Vec<String>, extra: &[String]) -> Vec<String> {
    if let Some(last) = argv.last_mut() {
        last.push(' ');
        last.push_str(&extra.join(" "));
    }
    argv
}

pub fn require_file(host: &dyn HostEnv, path: &str) -> Result<(), ScanError> {
    if !host.is_file(Path::new(path)) {
        return Err(ScanError::usage(format!("'{}' is not a file", path)));
    }
    Ok(())
}

/// Copies a helper script into the chroot at the path it has on the host.
pub fn copy_in_script(
    props: &mut ScanProps,
    host: &dyn HostEnv,
    script: &Path,
) -> Result<String, ScanError> {
    if !host.is_file(script) {
        return Err(ScanError::usage(format!(
            "helper script not found: {}",
            script.display()
        )));
    }
    let path = script.display().to_string();
    props.copy_in_files.push(path.clone());
    Ok(path)
}

/// Puts a compiler wrapper (`csclng`, `cscppc`, ...) in front of `$PATH`.
///
/// Returns the directory the wrapper installs its symlinks into.
pub fn wrap_compiler(
    props: &mut ScanProps,
    host: &dyn HostEnv,
    wrapper: &str,
) -> Result<String, ScanError> {
    let wrap_path = host
        .command_output(&[wrapper, "--print-path-to-wrap"])
        .ok_or_else(|| ScanError::usage(format!("{} does not seem to be installed on the host", wrapper)))?;

    props.path.insert(0, wrap_path.clone());
    props.copy_in_files.push(format!("/usr/bin/{}", wrapper));
    props.copy_in_files.push(wrap_path.clone());
    Ok(wrap_path)
}

/// File name a download URL is cached under.
pub fn url_basename(url: &str) -> &str {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(url)
}

/// Downloads `url` into `dst`, replacing the file if it exists.
pub async fn download(url: &str, dst: &Path) -> Result<()> {
    info!(url, dst = %dst.display(), "Downloading");
    let response = reqwest::Client::new()
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to download {} (check network connectivity)", url))?;

    if !response.status().is_success() {
        bail!("Download failed with HTTP {} from {}", response.status(), url);
    }

    let bytes = response
        .bytes()
        .await
        .with_context(|| format!("Failed to read response body from {}", url))?;
    if bytes.is_empty() {
        bail!("Downloaded file is empty (HTTP 200 but 0 bytes): {}", url);
    }

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create cache directory: {}", parent.display()))?;
    }
    fs::write(dst, &bytes).with_context(|| format!("Failed to write {}", dst.display()))?;
    debug!(bytes = bytes.len(), "Download complete");
    Ok(())
}

/// Makes `url` available in `cache_dir`, downloading it unless cached.
///
/// Failures are reported into the scan log and yield `None`.
pub async fn fetch_to_cache(
    results: &mut ScanResults,
    tool: &str,
    url: &str,
    cache_dir: &Path,
    refresh: bool,
) -> Result<Option<PathBuf>> {
    if let Err(err) = fs::create_dir_all(cache_dir) {
        results.error(
            &format!("failed to create {} cache directory: {}: {}", tool, cache_dir.display(), err),
            1,
        )?;
        return Ok(None);
    }

    let dst = cache_dir.join(url_basename(url));
    if !refresh && dst.exists() {
        results.print_with_ts(&format!(
            "reusing previously downloaded {}: {}",
            tool,
            dst.display()
        ))?;
        return Ok(Some(dst));
    }

    if let Err(err) = download(url, &dst).await {
        results.error(&format!("failed to download {}: {:#}", tool, err), 1)?;
        return Ok(None);
    }
    Ok(Some(dst))
}

/// Unpacks a single file of a `.tar.gz` into `dst_dir`.
pub fn extract_member(tgz: &Path, member: &str, dst_dir: &Path) -> Result<PathBuf> {
    let file = File::open(tgz).with_context(|| format!("Failed to open {}", tgz.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        if path == Path::new(member) {
            let dst = dst_dir.join(member);
            entry
                .unpack(&dst)
                .with_context(|| format!("Failed to unpack {}", dst.display()))?;
            return Ok(dst);
        }
    }
    bail!("{} not found in {}", member, tgz.display())
}

pub fn make_executable(path: &Path) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("Failed to make {} executable", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MockHost;

    #[test]
    fn test_paired_flag() {
        assert_eq!(paired_flag(false, false), None);
        assert_eq!(paired_flag(true, false), Some(true));
        assert_eq!(paired_flag(false, true), Some(false));
    }

    #[test]
    fn test_dirs_to_scan_defaults() {
        let mut props = ScanProps::default();
        let dirs = dirs_to_scan("pylint", None, None, &mut props).unwrap();
        assert_eq!(dirs, BUILDROOT_DIR);
        assert!(props.need_rpm_bi);

        let mut props = ScanProps::default();
        props.shell_cmd_to_build = Some("make".into());
        let dirs = dirs_to_scan("pylint", None, None, &mut props).unwrap();
        assert_eq!(dirs, BUILD_DIR);
        assert!(!props.need_rpm_bi);
    }

    #[test]
    fn test_dirs_to_scan_both() {
        let mut props = ScanProps::default();
        let dirs = dirs_to_scan("bandit", Some(true), None, &mut props).unwrap();
        assert_eq!(dirs, "/builddir/build/BUILD /builddir/build/BUILDROOT");
    }

    #[test]
    fn test_dirs_to_scan_errors() {
        let mut props = ScanProps::default();
        let err = dirs_to_scan("shellcheck", Some(false), Some(false), &mut props).unwrap_err();
        assert!(err.to_string().contains("--shellcheck-scan-build or"));

        props.shell_cmd_to_build = Some("make".into());
        let err = dirs_to_scan("shellcheck", None, Some(true), &mut props).unwrap_err();
        assert!(err.to_string().contains("cannot be used together"));
    }

    #[test]
    fn test_use_compiler() {
        let mut props = ScanProps::default();
        use_compiler(&mut props, "gclang", "gclang++");
        define_no_optflags(&mut props, true);
        assert_eq!(props.env["CC"], "gclang");
        assert_eq!(
            props.rpm_opts,
            vec![
                "--define", "__cc gclang",
                "--define", "__cxx gclang++",
                "--define", "__cpp gclang -E",
                "--define", "toolchain clang",
                "--define", "optflags -O0",
                "--define", "build_ldflags -O0",
            ]
        );
    }

    #[test]
    fn test_write_unoptimized_flags() {
        let mut props = ScanProps::default();
        write_unoptimized_flags(&mut props, &["-g"]);
        let add = &props.env[crate::cflags::ENV_ADD_CFLAGS];
        let del = &props.env[crate::cflags::ENV_DEL_CFLAGS];
        assert!(add.split(':').any(|f| f == "-g"));
        assert!(del.split(':').any(|f| f == "-Ofast"));
    }

    #[test]
    fn test_append_to_last() {
        let argv = vec!["-d".to_string(), "check --max-time 150".to_string()];
        let argv = append_to_last(argv, &["--threads 2".to_string()]);
        assert_eq!(argv[1], "check --max-time 150 --threads 2");
    }

    #[test]
    fn test_require_file() {
        let host = MockHost::new();
        host.add_file("/etc/gitleaks.toml", "");
        assert!(require_file(&host, "/etc/gitleaks.toml").is_ok());
        assert!(require_file(&host, "/etc/missing.toml").is_err());
    }

    #[test]
    fn test_wrap_compiler() {
        let host = MockHost::new();
        host.add_command(&["csclng", "--print-path-to-wrap"], "/usr/lib64/csclng");
        let mut props = ScanProps::default();
        props.path.push("/usr/lib64/cswrap".to_string());

        let path = wrap_compiler(&mut props, &host, "csclng").unwrap();
        assert_eq!(path, "/usr/lib64/csclng");
        assert_eq!(props.path, vec!["/usr/lib64/csclng", "/usr/lib64/cswrap"]);
        assert_eq!(props.copy_in_files, vec!["/usr/bin/csclng", "/usr/lib64/csclng"]);
        assert!(wrap_compiler(&mut props, &host, "cscppc").is_err());
    }

    #[test]
    fn test_extract_member() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let tmp = tempfile::TempDir::new().unwrap();
        let tgz = tmp.path().join("gitleaks.tar.gz");
        {
            let file = File::create(&tgz).unwrap();
            let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
            for (name, content) in [("README.md", "docs"), ("gitleaks", "#!/bin/sh\necho v8.15.1\n")] {
                let mut header = tar::Header::new_gnu();
                header.set_size(content.len() as u64);
                header.set_mode(0o755);
                header.set_cksum();
                builder.append_data(&mut header, name, content.as_bytes()).unwrap();
            }
            builder.into_inner().unwrap().finish().unwrap();
        }

        let bin = extract_member(&tgz, "gitleaks", tmp.path()).unwrap();
        assert_eq!(bin, tmp.path().join("gitleaks"));
        assert!(fs::read_to_string(&bin).unwrap().contains("v8.15.1"));
        assert!(extract_member(&tgz, "missing", tmp.path()).is_err());
    }

    #[test]
    fn test_url_basename() {
        assert_eq!(
            url_basename("https://static.snyk.io/cli/latest/snyk-linux"),
            "snyk-linux"
        );
        assert_eq!(url_basename("snyk"), "snyk");
    }
}
