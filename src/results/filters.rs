//! Merging, filtering and rendering of the diagnostics
//!
//! All of the work is done by the csdiff tool set (`csgrep`, `csdiff`,
//! `cslinker`, `cssort`, `cshtml`); the functions here only render the
//! pipelines and run them through [`ScanResults`].

use super::{Cmd, ScanResults};
use crate::error::ScanError;
use crate::props::ScanProps;
use crate::util::shell::{shell_quote, single_quote, strlist_to_shell_cmd};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Drops internal warnings of the analyzers from every final report.
pub const CSGREP_FINAL_FILTER_ARGS: &str =
    "--invert-match --event \"internal warning\" --prune-events=1";

pub const CSWRAP_CAPTURE: &str = "/builddir/cswrap-capture.err";

/// Operand of `csgrep --checker` matching exactly the given checkers.
pub fn re_from_checker_set<'a, I>(checkers: I) -> String
where
    I: IntoIterator<Item = &'a String>,
{
    let mut sorted: Vec<&String> = checkers.into_iter().collect();
    sorted.sort();
    let alternatives: Vec<&str> = sorted.iter().map(|c| c.as_str()).collect();
    format!("^({})$", alternatives.join("|"))
}

/// `scan-results.js` -> `scan-results<suffix>`
pub fn sibling(js_file: &Path, suffix: &str) -> PathBuf {
    let s = js_file.display().to_string();
    let stem = s.strip_suffix(".js").unwrap_or(&s);
    PathBuf::from(format!("{}{}", stem, suffix))
}

pub fn merge_cmd(inputs: &[PathBuf], scan_props: &[(String, String)], dst: &Path) -> String {
    let mut cmd = "csgrep --mode=json --remove-duplicates".to_string();
    for (key, value) in scan_props {
        cmd.push_str(&format!(
            " --set-scan-prop={}",
            single_quote(&format!("{}:{}", key, value))
        ));
    }
    for input in inputs {
        cmd.push_str(&format!(" '{}'", input.display()));
    }
    cmd.push_str(&format!(" > '{}'", dst.display()));
    cmd
}

pub fn cswrap_capture_cmd(src: &Path, filters: &[String], dst: &Path) -> String {
    let mut cmd = format!("csgrep --mode=json --quiet '{}'", src.display());
    for filt in filters {
        cmd.push_str(&format!(" | {}", filt));
    }
    cmd.push_str(&format!(" | csgrep --mode=json > '{}'", dst.display()));
    cmd
}

pub fn transform_cmds(js_file: &Path) -> [String; 3] {
    let js = js_file.display();
    [
        format!(
            "csgrep --mode=grep {} '{}' > '{}'",
            CSGREP_FINAL_FILTER_ARGS,
            js,
            sibling(js_file, ".err").display()
        ),
        format!(
            "csgrep --mode=json {} '{}' | cshtml - > '{}'",
            CSGREP_FINAL_FILTER_ARGS,
            js,
            sibling(js_file, ".html").display()
        ),
        format!(
            "csgrep --mode=evtstat {} '{}' | tee '{}'",
            CSGREP_FINAL_FILTER_ARGS,
            js,
            sibling(js_file, "-summary.txt").display()
        ),
    ]
}

/// Pipeline writing the findings that count as important into `*-imp.js`.
///
/// Runs under bash because of the process substitutions.
pub fn important_cmd(
    js_file: &Path,
    imp_checker_set: &BTreeSet<String>,
    imp_csgrep_filters: &[(String, String)],
) -> String {
    let js = js_file.display();
    let mut cmd = format!(
        "csgrep '{}' --mode=json --checker '{}'",
        js,
        re_from_checker_set(imp_checker_set)
    );

    for (checker, csgrep_args) in imp_csgrep_filters {
        let others = re_from_checker_set(imp_checker_set.iter().filter(|c| *c != checker));
        cmd.push_str(&format!(
            " | csdiff <(csgrep '{}' --mode=json --drop-scan-props --invert-regex --checker '{}' {}) -",
            js, others, csgrep_args
        ));
    }

    cmd.push_str(" | csgrep --mode=json --set-imp-level=0");
    cmd.push_str(&format!(" <(csgrep --mode=json --imp-level=1 '{}') -", js));
    cmd.push_str(&format!(" > '{}'", sibling(js_file, "-imp.js").display()));

    strlist_to_shell_cmd(&["bash", "-c", cmd.as_str()], true)
}

pub fn filtered_cmd(all_file: &Path, filters: &[String], tail: &str) -> String {
    let mut cmd = format!("cat '{}'", all_file.display());
    for filt in filters {
        cmd.push_str(&format!(" | {}", filt));
    }
    cmd.push_str(&format!(" | {}", tail));
    cmd
}

/// Converts the cswrap capture copied out of the chroot, if there is one.
pub async fn process_cswrap_capture(
    results: &mut ScanResults,
    props: &ScanProps,
) -> Result<(), ScanError> {
    let src = results.raw_path(CSWRAP_CAPTURE);
    if !src.is_file() {
        debug!("No cswrap capture to process");
        return Ok(());
    }

    let dst = results.dbgdir_uni().join("cswrap-capture.js");
    let cmd = cswrap_capture_cmd(&src, &props.cswrap_filters, &dst);
    if results.exec_cmd(&Cmd::shell(cmd)).await? != 0 {
        results.error("failed to process cswrap capture", 1)?;
    }
    Ok(())
}

/// Merges everything in `debug/uni-results` into `debug/scan-results-all.js`.
pub async fn merge_uni_results(results: &mut ScanResults) -> Result<PathBuf, ScanError> {
    let mut inputs: Vec<PathBuf> = fs::read_dir(results.dbgdir_uni())?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    inputs.sort();

    let dst = results.dbgdir().join("scan-results-all.js");
    let scan_props: Vec<(String, String)> = results.ini_entries().to_vec();
    let cmd = merge_cmd(&inputs, &scan_props, &dst);

    results.print_with_ts("merging results...")?;
    if results.exec_cmd(&Cmd::shell(cmd)).await? != 0 {
        results.error("failed to merge results", 1)?;
    }
    Ok(dst)
}

/// Installs result filters for `--known-false-positives`.
pub fn handle_known_fp_list(
    props: &mut ScanProps,
    results: &mut ScanResults,
) -> Result<(), ScanError> {
    let kfp = match props.known_false_positives.clone() {
        Some(kfp) => kfp,
        None => return Ok(()),
    };

    results.ini_append("known-false-positives", kfp.display())?;
    props.result_filters.push(format!(
        "csdiff --json-output --show-internal \"{}\" -",
        kfp.display()
    ));

    let pkg = match props.pkg.as_deref() {
        Some(pkg) => pkg,
        None => return Ok(()),
    };

    let kfp_str = kfp.display().to_string();
    let kfp_dir = match kfp_str.strip_suffix(".js") {
        Some(stem) => PathBuf::from(format!("{}.d", stem)),
        None => return Ok(()),
    };

    let ep_file = kfp_dir.join(pkg).join("exclude-paths.txt");
    if !ep_file.is_file() {
        debug!(path = %ep_file.display(), "No per-package path exclusions");
        return Ok(());
    }

    let content = fs::read_to_string(&ep_file)?;
    for path_re in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        props.result_filters.push(format!(
            "csgrep --mode=json --invert-match --path={}",
            shell_quote(path_re)
        ));
    }
    info!(
        count = props.result_filters.len(),
        "Installed known false positive filters"
    );
    Ok(())
}

/// Renders `.err`, `.html` and `-summary.txt` for a `.js` file.
pub async fn transform_results(
    js_file: &Path,
    results: &mut ScanResults,
) -> Result<PathBuf, ScanError> {
    for cmd in transform_cmds(js_file) {
        results.exec_cmd(&Cmd::shell(cmd)).await?;
    }
    Ok(sibling(js_file, ".err"))
}

/// Tags important findings (if any checker is marked so) and renders the reports.
pub async fn finalize_results(
    js_file: &Path,
    results: &mut ScanResults,
    props: &ScanProps,
) -> Result<(), ScanError> {
    if !props.imp_checker_set.is_empty() {
        let cmd = important_cmd(js_file, &props.imp_checker_set, &props.imp_csgrep_filters);
        results.exec_cmd(&Cmd::shell(cmd)).await?;

        let imp_js = sibling(js_file, "-imp.js");
        let all_js = sibling(js_file, "-all.js");
        let cmd = format!(
            "cslinker --implist '{}' '{}' > '{}' && mv -v '{}' '{}'",
            imp_js.display(),
            js_file.display(),
            all_js.display(),
            imp_js.display(),
            js_file.display()
        );
        if results.exec_cmd(&Cmd::shell(cmd)).await? != 0 {
            results.error("failed to tag important findings in the full results", 0)?;
        }

        transform_results(&all_js, results).await?;
    }

    let err_file = transform_results(js_file, results).await?;

    if props.print_defects {
        let status = tokio::process::Command::new("csgrep")
            .arg(&err_file)
            .status()
            .await;
        if let Err(e) = status {
            results.error(&format!("failed to print defects: {}", e), 0)?;
        }
    }
    Ok(())
}

/// Applies result filters, sorts the findings and records the suppressed ones.
pub async fn apply_result_filters(
    props: &ScanProps,
    results: &mut ScanResults,
    supp_filters: &[String],
) -> Result<(), ScanError> {
    let js_file = results.resdir().join("scan-results.js");
    let all_file = results.dbgdir().join("scan-results-all.js");

    let cmd = filtered_cmd(
        &all_file,
        &props.result_filters,
        &format!("cssort --key=path > '{}'", js_file.display()),
    );
    results.exec_cmd(&Cmd::shell(cmd)).await?;

    let js_supp = results.dbgdir().join("suppressed-results.js");
    let cmd = filtered_cmd(
        &all_file,
        supp_filters,
        &format!(
            "csdiff --show-internal '{}' - | cssort > '{}'",
            js_file.display(),
            js_supp.display()
        ),
    );
    results.exec_cmd(&Cmd::shell(cmd)).await?;

    finalize_results(&js_supp, results, props).await?;
    finalize_results(&js_file, results, props).await?;

    if !props.imp_checker_set.is_empty() {
        for suffix in [".err", ".html", ".js", "-summary.txt"] {
            let src = format!("scan-results{}", suffix);
            let dst = results.resdir().join(format!("scan-results-imp{}", suffix));
            results
                .exec_cmd(&Cmd::argv(["ln".to_string(), "-s".to_string(), src, dst.display().to_string()]))
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{ScanResultsOptions, SignalState};
    use tempfile::TempDir;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_re_from_checker_set_is_sorted() {
        let checkers = set(&["SNYK_CODE_WARNING", "COMPILER_WARNING"]);
        assert_eq!(
            re_from_checker_set(&checkers),
            "^(COMPILER_WARNING|SNYK_CODE_WARNING)$"
        );
        assert_eq!(re_from_checker_set(&BTreeSet::new()), "^()$");
    }

    #[test]
    fn test_sibling() {
        let js = Path::new("/out/scan-results.js");
        assert_eq!(sibling(js, ".err"), PathBuf::from("/out/scan-results.err"));
        assert_eq!(
            sibling(js, "-summary.txt"),
            PathBuf::from("/out/scan-results-summary.txt")
        );
        assert_eq!(
            sibling(Path::new("/out/debug/suppressed-results.js"), "-imp.js"),
            PathBuf::from("/out/debug/suppressed-results-imp.js")
        );
    }

    #[test]
    fn test_transform_cmds() {
        let [err, html, stat] = transform_cmds(Path::new("/o/scan-results.js"));
        assert_eq!(
            err,
            "csgrep --mode=grep --invert-match --event \"internal warning\" --prune-events=1 '/o/scan-results.js' > '/o/scan-results.err'"
        );
        assert!(html.ends_with("| cshtml - > '/o/scan-results.html'"));
        assert!(stat.starts_with("csgrep --mode=evtstat"));
        assert!(stat.ends_with("| tee '/o/scan-results-summary.txt'"));
    }

    #[test]
    fn test_important_cmd() {
        let checkers = set(&["COMPILER_WARNING", "SNYK_CODE_WARNING"]);
        let filters = vec![("SNYK_CODE_WARNING".to_string(), "--event=^error".to_string())];
        let cmd = important_cmd(Path::new("/o/scan-results.js"), &checkers, &filters);

        assert!(cmd.starts_with("\"bash\" \"-c\" \""));
        assert!(cmd.contains(r"--checker '^(COMPILER_WARNING|SNYK_CODE_WARNING)\$'"));
        assert!(cmd.contains(r"--invert-regex --checker '^(COMPILER_WARNING)\$' --event=^error"));
        assert!(cmd.contains("--set-imp-level=0 <(csgrep --mode=json --imp-level=1"));
        assert!(cmd.contains("> '/o/scan-results-imp.js'"));
    }

    #[test]
    fn test_filtered_cmd() {
        let filters = vec!["csgrep --mode=json --invert-match --path=\"^/usr/\"".to_string()];
        let cmd = filtered_cmd(Path::new("/d/all.js"), &filters, "cssort --key=path > '/o.js'");
        assert_eq!(
            cmd,
            "cat '/d/all.js' | csgrep --mode=json --invert-match --path=\"^/usr/\" | cssort --key=path > '/o.js'"
        );
        assert_eq!(filtered_cmd(Path::new("/a"), &[], "cssort"), "cat '/a' | cssort");
    }

    #[test]
    fn test_merge_cmd() {
        let inputs = vec![PathBuf::from("/u/empty.err"), PathBuf::from("/u/gcc.js")];
        let props = vec![
            ("tool".to_string(), "csmock".to_string()),
            ("mock-config".to_string(), "fedora rawhide".to_string()),
        ];
        let cmd = merge_cmd(&inputs, &props, Path::new("/d/all.js"));
        assert_eq!(
            cmd,
            "csgrep --mode=json --remove-duplicates --set-scan-prop=tool:csmock \
--set-scan-prop='mock-config:fedora rawhide' '/u/empty.err' '/u/gcc.js' > '/d/all.js'"
        );
    }

    #[test]
    fn test_cswrap_capture_cmd() {
        let filters = vec!["csgrep --mode=json --invert-match --checker COMPILER_WARNING".to_string()];
        let cmd = cswrap_capture_cmd(Path::new("/r/cap.err"), &filters, Path::new("/u/cap.js"));
        assert_eq!(
            cmd,
            "csgrep --mode=json --quiet '/r/cap.err' | csgrep --mode=json --invert-match --checker COMPILER_WARNING | csgrep --mode=json > '/u/cap.js'"
        );
    }

    #[tokio::test]
    async fn test_handle_known_fp_list() {
        let tmp = TempDir::new().unwrap();
        let kfp = tmp.path().join("known-fp.js");
        fs::write(&kfp, "{}").unwrap();
        let ep_dir = tmp.path().join("known-fp.d/units");
        fs::create_dir_all(&ep_dir).unwrap();
        fs::write(ep_dir.join("exclude-paths.txt"), "^/usr/include/\n\n/tests/\n").unwrap();

        let opts = ScanResultsOptions::new(tmp.path().join("out"), "csmock", "0.1.0");
        let mut results = ScanResults::create(opts, SignalState::new()).unwrap();
        let mut props = ScanProps::default();
        props.known_false_positives = Some(kfp.clone());
        props.pkg = Some("units".to_string());

        handle_known_fp_list(&mut props, &mut results).unwrap();
        assert_eq!(props.result_filters.len(), 3);
        assert_eq!(
            props.result_filters[0],
            format!("csdiff --json-output --show-internal \"{}\" -", kfp.display())
        );
        assert_eq!(
            props.result_filters[1],
            "csgrep --mode=json --invert-match --path=\"^/usr/include/\""
        );
        assert!(results
            .ini_entries()
            .iter()
            .any(|(k, _)| k == "known-false-positives"));
        results.finish().await.unwrap();
    }

    #[tokio::test]
    async fn test_known_fp_without_package() {
        let tmp = TempDir::new().unwrap();
        let opts = ScanResultsOptions::new(tmp.path().join("out"), "csmock", "0.1.0");
        let mut results = ScanResults::create(opts, SignalState::new()).unwrap();

        let mut props = ScanProps::default();
        handle_known_fp_list(&mut props, &mut results).unwrap();
        assert!(props.result_filters.is_empty());

        props.known_false_positives = Some(PathBuf::from("/nonexistent/kfp.js"));
        handle_known_fp_list(&mut props, &mut results).unwrap();
        assert_eq!(props.result_filters.len(), 1);
        results.finish().await.unwrap();
    }
}
