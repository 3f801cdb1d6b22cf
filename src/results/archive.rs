//! Packing of the results directory when the output is a tarball.

use anyhow::{bail, Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Directory,
    Tar,
    TarGz,
    TarXz,
}

impl OutputKind {
    pub fn is_archive(self) -> bool {
        self != OutputKind::Directory
    }
}

/// Decides the output kind and the name of the top-level results directory.
pub fn classify(output: &Path) -> (OutputKind, String) {
    let base = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    for (suffix, kind) in [
        (".tar.xz", OutputKind::TarXz),
        (".tar.gz", OutputKind::TarGz),
        (".tgz", OutputKind::TarGz),
        (".tar", OutputKind::Tar),
    ] {
        if let Some(stem) = base.strip_suffix(suffix) {
            if !stem.is_empty() {
                return (kind, stem.to_string());
            }
        }
    }
    (OutputKind::Directory, base)
}

/// Packs `parent/dirname` into `output`.
pub fn create(kind: OutputKind, output: &Path, parent: &Path, dirname: &str) -> Result<()> {
    let src = parent.join(dirname);
    match kind {
        OutputKind::Directory => Ok(()),
        OutputKind::Tar => {
            let file = File::create(output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            let mut builder = tar::Builder::new(file);
            builder.follow_symlinks(false);
            builder.append_dir_all(dirname, &src)?;
            builder.into_inner()?;
            Ok(())
        }
        OutputKind::TarGz => {
            let file = File::create(output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
            builder.follow_symlinks(false);
            builder.append_dir_all(dirname, &src)?;
            builder.into_inner()?.finish()?;
            Ok(())
        }
        OutputKind::TarXz => {
            let status = Command::new("tar")
                .arg("-cJf")
                .arg(output)
                .arg("-C")
                .arg(parent)
                .arg(dirname)
                .status()
                .context("Failed to run tar")?;

            // tar exits with 1 when a file changed while being read
            match status.code() {
                Some(0) | Some(1) => Ok(()),
                _ => bail!("tar exited with {}", status),
            }
        }
    }
}
