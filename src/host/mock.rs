use super::HostEnv;
use anyhow::{anyhow, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone)]
enum MockEntry {
    File(String),
    Dir,
}

/// In-memory host used by plugin tests.
#[derive(Default)]
pub struct MockHost {
    files: RwLock<HashMap<PathBuf, MockEntry>>,
    commands: RwLock<HashMap<String, String>>,
    shell_ok: RwLock<HashSet<String>>,
    home: Option<String>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_home(mut self, home: &str) -> Self {
        self.home = Some(home.to_string());
        self
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: &str) -> &Self {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        write(&self.files).insert(path.to_path_buf(), MockEntry::File(content.to_string()));
        self
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) -> &Self {
        let mut files = write(&self.files);
        for ancestor in path.as_ref().ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            files
                .entry(ancestor.to_path_buf())
                .or_insert(MockEntry::Dir);
        }
        self
    }

    /// Makes `argv` succeed with the given stdout.
    pub fn add_command(&self, argv: &[&str], stdout: &str) -> &Self {
        write(&self.commands).insert(argv.join(" "), stdout.to_string());
        self
    }

    /// Makes the given shell command succeed.
    pub fn add_shell_ok(&self, cmd: &str) -> &Self {
        write(&self.shell_ok).insert(cmd.to_string());
        self
    }
}

impl HostEnv for MockHost {
    fn exists(&self, path: &Path) -> bool {
        read(&self.files).contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(read(&self.files).get(path), Some(MockEntry::Dir))
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(read(&self.files).get(path), Some(MockEntry::File(_)))
    }

    fn is_readable(&self, path: &Path) -> bool {
        self.is_file(path)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        match read(&self.files).get(path) {
            Some(MockEntry::File(content)) => Ok(content.clone()),
            Some(MockEntry::Dir) => Err(anyhow!("Not a file: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn read_dir_names(&self, path: &Path) -> Result<Vec<String>> {
        let files = read(&self.files);
        if !matches!(files.get(path), Some(MockEntry::Dir)) {
            return Err(anyhow!("Directory not found: {:?}", path));
        }

        let mut names: Vec<String> = files
            .keys()
            .filter(|p| p.parent() == Some(path))
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    fn command_output(&self, argv: &[&str]) -> Option<String> {
        read(&self.commands).get(&argv.join(" ")).cloned()
    }

    fn shell_succeeds(&self, cmd: &str) -> bool {
        read(&self.shell_ok).contains(cmd)
    }

    fn home_dir(&self) -> Option<String> {
        self.home.clone()
    }
}
