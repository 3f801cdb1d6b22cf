//! The results of a scan and everything that writes into them
//!
//! [`ScanResults`] owns the output directory (or the temporary directory an
//! output tarball is assembled in), the `scan.log` every executed command is
//! echoed into and the `scan.ini` metadata. It also turns terminating signals
//! into exit codes: a caught signal is recorded as `128 + signum`, forwarded to
//! the running child and turned into a fatal error at the next checkpoint.

pub mod archive;
mod cmd;
pub mod filters;
pub mod ini;
pub mod signals;

pub use cmd::Cmd;
pub use signals::SignalState;

use crate::error::ScanError;
use crate::util::shell::strlist_to_shell_cmd;
use archive::OutputKind;
use ini::IniWriter;
use std::fmt::Display;
use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub const PREFIX_INFO: &str = ">>> ";
pub const PREFIX_ERROR: &str = "!!! ";
pub const PREFIX_DONE: &str = "<<< ";

/// Exit code reported when a command could not be found.
pub const EC_NOT_FOUND: i32 = 0x7F;
/// Exit code reported when a command exists but could not be executed.
pub const EC_NOT_EXECUTABLE: i32 = 0x7E;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub fn current_iso_date() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn hostname() -> String {
    ["/proc/sys/kernel/hostname", "/etc/hostname"]
        .iter()
        .filter_map(|p| fs::read_to_string(p).ok())
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signum)) => 128 + signum,
        (None, None) => 1,
    }
}

#[derive(Debug, Clone)]
pub struct ScanResultsOptions {
    /// Directory or tarball (`.tar`, `.tar.gz`, `.tgz`, `.tar.xz`) to write.
    pub output: PathBuf,
    pub tool: String,
    pub tool_version: String,
    /// Recorded as `tool-args` in scan.ini.
    pub tool_args: Vec<String>,
    pub keep_going: bool,
    pub no_clean: bool,
}

impl ScanResultsOptions {
    pub fn new(output: impl Into<PathBuf>, tool: &str, tool_version: &str) -> Self {
        Self {
            output: output.into(),
            tool: tool.to_string(),
            tool_version: tool_version.to_string(),
            tool_args: std::env::args().collect(),
            keep_going: false,
            no_clean: false,
        }
    }
}

pub struct ScanResults {
    output: PathBuf,
    tool: String,
    keep_going: bool,
    no_clean: bool,
    kind: OutputKind,
    dirname: String,
    ec: i32,
    dying: bool,
    tmpdir: Option<TempDir>,
    tmpdir_path: PathBuf,
    resdir: PathBuf,
    dbgdir: PathBuf,
    dbgdir_raw: PathBuf,
    dbgdir_uni: PathBuf,
    log: Option<File>,
    ini: IniWriter,
    ini_entries: Vec<(String, String)>,
    signals: SignalState,
}

impl ScanResults {
    /// Creates the results directory layout and starts `scan.log` and `scan.ini`.
    pub fn create(opts: ScanResultsOptions, signals: SignalState) -> Result<Self, ScanError> {
        let (kind, dirname) = archive::classify(&opts.output);
        let tmpdir = tempfile::Builder::new().prefix(&opts.tool).tempdir()?;
        let tmpdir_path = tmpdir.path().to_path_buf();

        let resdir = if kind.is_archive() {
            tmpdir_path.join(&dirname)
        } else {
            if opts.output.exists() {
                fs::remove_dir_all(&opts.output)?;
            }
            opts.output.clone()
        };

        if let Err(e) = fs::create_dir(&resdir) {
            eprintln!("error: failed to create output directory: {}", e);
            return Err(ScanError::Fatal { ec: 1 });
        }

        let dbgdir = resdir.join("debug");
        let dbgdir_raw = dbgdir.join("raw-results");
        let dbgdir_uni = dbgdir.join("uni-results");
        for dir in [&dbgdir, &dbgdir_raw, &dbgdir_uni] {
            fs::create_dir(dir)?;
        }
        let empty = dbgdir_uni.join("empty.err");
        File::create(&empty)?;
        fs::set_permissions(&empty, fs::Permissions::from_mode(0o444))?;

        let log = File::create(resdir.join("scan.log"))?;
        let ini = IniWriter::create(&resdir.join("scan.ini"))?;
        debug!(resdir = %resdir.display(), "Results directory created");

        let mut results = Self {
            output: opts.output.clone(),
            tool: opts.tool.clone(),
            keep_going: opts.keep_going,
            no_clean: opts.no_clean,
            kind,
            dirname,
            ec: 0,
            dying: false,
            tmpdir: Some(tmpdir),
            tmpdir_path,
            resdir,
            dbgdir,
            dbgdir_raw,
            dbgdir_uni,
            log: Some(log),
            ini,
            ini_entries: Vec::new(),
            signals,
        };

        results.ini_write("[scan]\n")?;
        results.ini_append("tool", &opts.tool)?;
        results.ini_append("tool-version", &opts.tool_version)?;
        results.ini_append("tool-args", strlist_to_shell_cmd(&opts.tool_args, false))?;
        results.ini_append("host", hostname())?;
        results.ini_append("store-results-to", opts.output.display())?;
        results.ini_append("time-created", current_iso_date())?;
        Ok(results)
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn ec(&self) -> i32 {
        self.ec
    }

    pub fn tmpdir(&self) -> &Path {
        &self.tmpdir_path
    }

    pub fn resdir(&self) -> &Path {
        &self.resdir
    }

    pub fn dbgdir(&self) -> &Path {
        &self.dbgdir
    }

    pub fn dbgdir_raw(&self) -> &Path {
        &self.dbgdir_raw
    }

    pub fn dbgdir_uni(&self) -> &Path {
        &self.dbgdir_uni
    }

    /// Path under `debug/raw-results` where a file copied out of the chroot lands.
    pub fn raw_path(&self, chroot_path: &str) -> PathBuf {
        self.dbgdir_raw.join(chroot_path.trim_start_matches('/'))
    }

    fn log_bytes(&mut self, bytes: &[u8]) {
        if let Some(log) = self.log.as_mut() {
            if let Err(e) = log.write_all(bytes).and_then(|_| log.flush()) {
                warn!(error = %e, "Failed to write scan.log");
            }
        }
        eprint!("{}", String::from_utf8_lossy(bytes));
    }

    fn log_text(&mut self, text: &str) {
        self.log_bytes(text.as_bytes());
    }

    fn write_ts(&mut self, prefix: &str, msg: &str) {
        let line = format!("{}{}\t{}\n", prefix, current_iso_date(), msg);
        self.log_text(&line);
    }

    /// Writes a timestamped line with the `>>> ` prefix.
    pub fn print_with_ts(&mut self, msg: &str) -> Result<(), ScanError> {
        self.print_with_prefix(PREFIX_INFO, msg)
    }

    pub fn print_with_prefix(&mut self, prefix: &str, msg: &str) -> Result<(), ScanError> {
        self.write_ts(prefix, msg);
        self.handle_ec()
    }

    pub fn update_ec(&mut self, ec: i32) {
        if self.ec < ec {
            self.ec = ec;
        }
    }

    /// Records an error. Fails unless `--keep-going` is in effect or the
    /// exit code is still zero.
    pub fn error(&mut self, msg: &str, ec: i32) -> Result<(), ScanError> {
        self.error_with_prefix(msg, ec, "")
    }

    fn error_with_prefix(&mut self, msg: &str, ec: i32, err_prefix: &str) -> Result<(), ScanError> {
        self.write_ts(PREFIX_ERROR, &format!("{}error: {}\n", err_prefix, msg));
        self.handle_ec()?;
        self.update_ec(ec);
        if !self.dying && !self.keep_going && self.ec != 0 {
            return Err(ScanError::Fatal { ec: self.ec });
        }
        Ok(())
    }

    /// Records an error that always aborts the scan. Returns the error to propagate.
    pub fn fatal_error(&mut self, msg: &str, ec: i32) -> ScanError {
        self.dying = true;
        let _ = self.error_with_prefix(msg, ec, "fatal ");
        ScanError::Fatal { ec: self.ec.max(ec) }
    }

    fn absorb_signal(&mut self, signum: i32) {
        self.write_ts(PREFIX_ERROR, &format!("error: caught signal {}\n", signum));
        self.update_ec(128 + signum);
    }

    /// Turns a pending terminating signal into a fatal error.
    pub fn handle_ec(&mut self) -> Result<(), ScanError> {
        if let Some(signum) = self.signals.take() {
            self.absorb_signal(signum);
        }
        if !self.dying && 128 < self.ec && self.ec < 128 + 64 {
            let ec = self.ec;
            return Err(self.fatal_error(&format!("caught signal {}", ec - 128), ec));
        }
        Ok(())
    }

    fn handle_rv(&mut self, rv: i32) -> Result<(), ScanError> {
        if rv > 128 {
            self.update_ec(rv);
            self.handle_ec()?;
        }
        Ok(())
    }

    /// Runs `cmd`, echoing it first and copying its output into the scan log.
    pub async fn exec_cmd(&mut self, cmd: &Cmd) -> Result<i32, ScanError> {
        self.exec_cmd_with(cmd, true).await
    }

    pub async fn exec_cmd_with(&mut self, cmd: &Cmd, echo: bool) -> Result<i32, ScanError> {
        self.handle_ec()?;
        if echo {
            self.print_with_ts(&cmd.display())?;
        }

        let mut command = cmd.to_command();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => return Ok(self.spawn_failed(e)),
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        if let Some(stdout) = child.stdout.take() {
            pump(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            pump(stderr, tx.clone());
        }
        drop(tx);

        let pid = child.id();
        let signals = self.signals.clone();
        let status = loop {
            tokio::select! {
                Some(chunk) = rx.recv() => self.log_bytes(&chunk),
                signum = signals.recv() => {
                    self.absorb_signal(signum);
                    if let Some(pid) = pid {
                        if let Err(e) = signals::forward(signum, pid) {
                            self.write_ts(
                                PREFIX_ERROR,
                                &format!("error: failed to kill child process: {}\n", e),
                            );
                        }
                    }
                }
                status = child.wait() => break status?,
            }
        };

        let drain = async {
            while let Some(chunk) = rx.recv().await {
                self.log_bytes(&chunk);
            }
        };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            debug!("Output of a background process left behind by the command was dropped");
        }
        self.log_text("\n");

        let rv = exit_code(status);
        self.handle_rv(rv)?;
        Ok(rv)
    }

    fn spawn_failed(&mut self, e: std::io::Error) -> i32 {
        self.log_text(&format!("{}\n", e));
        if e.kind() == std::io::ErrorKind::NotFound {
            EC_NOT_FOUND
        } else {
            EC_NOT_EXECUTABLE
        }
    }

    /// Runs `cmd` and returns its exit code and stdout. Stderr goes to the log.
    pub async fn get_cmd_output(&mut self, cmd: &Cmd) -> Result<(i32, String), ScanError> {
        self.handle_ec()?;
        let mut command = cmd.to_command();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = match command.spawn() {
            Ok(child) => child.wait_with_output().await?,
            Err(e) => return Ok((self.spawn_failed(e), String::new())),
        };

        self.log_bytes(&output.stderr);
        let rv = exit_code(output.status);
        self.handle_rv(rv)?;
        Ok((rv, String::from_utf8_lossy(&output.stdout).into_owned()))
    }

    fn ini_write(&mut self, text: &str) -> Result<(), ScanError> {
        self.ini.write(text)?;
        self.log_text(&format!("scan.ini: {}", text));
        Ok(())
    }

    /// Appends `key = value` to scan.ini.
    pub fn ini_append(&mut self, key: &str, value: impl Display) -> Result<(), ScanError> {
        let value = value.to_string().trim().to_string();
        let line = self.ini.append(key, &value)?;
        self.log_text(&format!("scan.ini: {}", line));
        self.ini_entries.push((key.to_string(), value));
        Ok(())
    }

    /// Entries written to scan.ini so far, in order.
    pub fn ini_entries(&self) -> &[(String, String)] {
        &self.ini_entries
    }

    /// Closes scan.ini, writes the archive and removes the temporary directory.
    ///
    /// Returns the exit code of the scan.
    pub async fn finish(mut self) -> Result<i32, ScanError> {
        if !self.ini.is_closed() {
            let ec = self.ec;
            self.ini_append("time-finished", current_iso_date())?;
            self.ini_append("exit-code", ec)?;
            self.ini.close()?;
        }

        if self.no_clean {
            let msg = format!(
                "temporary directory preserved: {}",
                self.tmpdir_path.display()
            );
            self.write_ts(PREFIX_INFO, &msg);
        }

        let msg = format!("{} exit code: {}\n", self.tool, self.ec);
        self.write_ts(PREFIX_DONE, &msg);
        self.log = None;

        if self.kind.is_archive() {
            let (kind, output, parent, dirname) = (
                self.kind,
                self.output.clone(),
                self.tmpdir_path.clone(),
                self.dirname.clone(),
            );
            let packed = tokio::task::spawn_blocking(move || {
                archive::create(kind, &output, &parent, &dirname)
            })
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

            if let Err(e) = packed {
                eprintln!(
                    "fatal error: failed to write '{}', not removing '{}': {:#}",
                    self.output.display(),
                    self.tmpdir_path.display(),
                    e
                );
                if let Some(tmpdir) = self.tmpdir.take() {
                    let _ = tmpdir.into_path();
                }
                return Err(ScanError::Fatal { ec: self.ec.max(1) });
            }
        }

        eprintln!("Wrote: {}\n", self.output.display());

        if let Some(tmpdir) = self.tmpdir.take() {
            if self.no_clean {
                let _ = tmpdir.into_path();
            } else if let Err(e) = tmpdir.close() {
                eprintln!(
                    "{}: warning: failed to remove tmp dir: {}: {}",
                    self.tool,
                    self.tmpdir_path.display(),
                    e
                );
            }
        }

        Ok(self.ec)
    }
}

fn pump<R>(mut reader: R, tx: mpsc::UnboundedSender<Vec<u8>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; 8192];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_results(dir: &Path, name: &str) -> ScanResults {
        let mut opts = ScanResultsOptions::new(dir.join(name), "csmock", "0.1.0");
        opts.tool_args = vec!["csmock".into(), "-t".into(), "gcc".into()];
        ScanResults::create(opts, SignalState::new()).unwrap()
    }

    #[tokio::test]
    async fn test_directory_layout() {
        let tmp = TempDir::new().unwrap();
        let results = new_results(tmp.path(), "out");

        assert_eq!(results.resdir(), tmp.path().join("out"));
        assert!(results.dbgdir_raw().is_dir());
        assert!(results.dbgdir_uni().join("empty.err").is_file());
        let mode = fs::metadata(results.dbgdir_uni().join("empty.err"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o444);

        let tmpdir = results.tmpdir().to_path_buf();
        assert_eq!(results.finish().await.unwrap(), 0);
        assert!(!tmpdir.exists());

        let ini = fs::read_to_string(tmp.path().join("out/scan.ini")).unwrap();
        assert!(ini.starts_with("[scan]\ntool = csmock\ntool-version = 0.1.0\n"));
        assert!(ini.contains("tool-args = 'csmock' '-t' 'gcc'\n"));
        assert!(ini.contains("exit-code = 0\n"));
        assert!(ini.contains("time-finished = "));

        let log = fs::read_to_string(tmp.path().join("out/scan.log")).unwrap();
        assert!(log.contains("scan.ini: [scan]"));
        assert!(log.contains("<<< "));
        assert!(log.contains("csmock exit code: 0"));
    }

    #[tokio::test]
    async fn test_existing_output_dir_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("out");
        fs::create_dir(&out).unwrap();
        fs::write(out.join("stale.txt"), "old").unwrap();

        let results = new_results(tmp.path(), "out");
        assert!(!out.join("stale.txt").exists());
        results.finish().await.unwrap();
    }

    #[tokio::test]
    async fn test_exec_cmd_logs_output() {
        let tmp = TempDir::new().unwrap();
        let mut results = new_results(tmp.path(), "out");

        let rv = results
            .exec_cmd(&Cmd::shell("echo to-stdout; echo to-stderr >&2"))
            .await
            .unwrap();
        assert_eq!(rv, 0);

        let rv = results.exec_cmd(&Cmd::argv(["false"])).await.unwrap();
        assert_eq!(rv, 1);
        results.finish().await.unwrap();

        let log = fs::read_to_string(tmp.path().join("out/scan.log")).unwrap();
        assert!(log.contains(">>> "));
        assert!(log.contains("\"echo to-stdout; echo to-stderr >&2\""));
        assert!(log.contains("to-stdout\n"));
        assert!(log.contains("to-stderr\n"));
        assert!(log.contains("\"false\""));
    }

    #[tokio::test]
    async fn test_exec_missing_command() {
        let tmp = TempDir::new().unwrap();
        let mut results = new_results(tmp.path(), "out");
        let rv = results
            .exec_cmd(&Cmd::argv(["/nonexistent/csmock-test-binary"]))
            .await
            .unwrap();
        assert_eq!(rv, EC_NOT_FOUND);
        results.finish().await.unwrap();
    }

    #[tokio::test]
    async fn test_get_cmd_output() {
        let tmp = TempDir::new().unwrap();
        let mut results = new_results(tmp.path(), "out");
        let (rv, out) = results
            .get_cmd_output(&Cmd::shell("echo gcc-13.2.1-4.fc39; echo noise >&2"))
            .await
            .unwrap();
        assert_eq!(rv, 0);
        assert_eq!(out, "gcc-13.2.1-4.fc39\n");
        results.finish().await.unwrap();
    }

    #[tokio::test]
    async fn test_error_is_fatal_unless_keep_going() {
        let tmp = TempDir::new().unwrap();
        let mut results = new_results(tmp.path(), "out");

        assert!(results.error("just a warning", 0).is_ok());
        assert_eq!(results.ec(), 0);

        let err = results.error("broken", 1).unwrap_err();
        assert!(matches!(err, ScanError::Fatal { ec: 1 }));
        assert_eq!(results.finish().await.unwrap(), 1);

        let mut opts = ScanResultsOptions::new(tmp.path().join("kg"), "csmock", "0.1.0");
        opts.keep_going = true;
        let mut results = ScanResults::create(opts, SignalState::new()).unwrap();
        assert!(results.error("broken", 3).is_ok());
        assert_eq!(results.finish().await.unwrap(), 3);

        let log = fs::read_to_string(tmp.path().join("kg/scan.log")).unwrap();
        assert!(log.contains("!!! "));
        assert!(log.contains("error: broken"));
    }

    #[tokio::test]
    async fn test_pending_signal_aborts_at_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let signals = SignalState::new();
        let opts = ScanResultsOptions::new(tmp.path().join("out"), "csmock", "0.1.0");
        let mut results = ScanResults::create(opts, signals.clone()).unwrap();

        signals.raise(signals::SIGTERM);
        let err = results.print_with_ts("next step").unwrap_err();
        assert!(matches!(err, ScanError::Fatal { ec: 143 }));
        assert_eq!(results.finish().await.unwrap(), 143);

        let log = fs::read_to_string(tmp.path().join("out/scan.log")).unwrap();
        assert!(log.contains("caught signal 15"));
    }

    #[tokio::test]
    async fn test_child_killed_by_signal() {
        let tmp = TempDir::new().unwrap();
        let mut results = new_results(tmp.path(), "out");
        let err = results
            .exec_cmd(&Cmd::shell("kill -s TERM $$"))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 143);
        results.finish().await.unwrap();
    }

    #[tokio::test]
    async fn test_tarball_output() {
        let tmp = TempDir::new().unwrap();
        let mut results = new_results(tmp.path(), "units.tar");
        assert!(results.resdir().starts_with(results.tmpdir()));
        results.print_with_ts("hello").unwrap();
        results.finish().await.unwrap();

        let file = File::open(tmp.path().join("units.tar")).unwrap();
        let mut archive = tar::Archive::new(file);
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().display().to_string())
            .collect();
        assert!(names.iter().any(|n| n == "units/scan.log"));
        assert!(names.iter().any(|n| n == "units/scan.ini"));
    }

    #[tokio::test]
    async fn test_no_clean_preserves_tmpdir() {
        let tmp = TempDir::new().unwrap();
        let mut opts = ScanResultsOptions::new(tmp.path().join("out"), "csmock", "0.1.0");
        opts.no_clean = true;
        let results = ScanResults::create(opts, SignalState::new()).unwrap();
        let tmpdir = results.tmpdir().to_path_buf();
        results.finish().await.unwrap();
        assert!(tmpdir.exists());
        fs::remove_dir_all(tmpdir).unwrap();
    }
}
