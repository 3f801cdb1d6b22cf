use std::fmt::Display;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// Writer of `scan.ini`, the metadata of a scan.
///
/// Every write returns the text written so that the caller can echo it into
/// the scan log.
pub struct IniWriter {
    file: Option<File>,
}

impl IniWriter {
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self {
            file: Some(File::create(path)?),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    pub fn write(&mut self, text: &str) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.write_all(text.as_bytes()),
            None => Err(io::Error::new(
                io::ErrorKind::Other,
                "scan.ini has already been closed",
            )),
        }
    }

    /// Writes `key = value`, with surrounding whitespace of the value trimmed.
    pub fn append(&mut self, key: &str, value: impl Display) -> io::Result<String> {
        let line = format_entry(key, value);
        self.write(&line)?;
        Ok(line)
    }

    pub fn close(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}

pub fn format_entry(key: &str, value: impl Display) -> String {
    format!("{} = {}\n", key, value.to_string().trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_trims_value() {
        assert_eq!(format_entry("tool", "csmock"), "tool = csmock\n");
        assert_eq!(format_entry("tool-version", " 3.5.0\n"), "tool-version = 3.5.0\n");
        assert_eq!(format_entry("exit-code", 0), "exit-code = 0\n");
    }

    #[test]
    fn test_write_after_close_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan.ini");
        let mut ini = IniWriter::create(&path).unwrap();
        ini.write("[scan]\n").unwrap();
        ini.append("tool", "csmock").unwrap();
        ini.close().unwrap();
        assert!(ini.is_closed());
        assert!(ini.append("late", 1).is_err());
        ini.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "[scan]\ntool = csmock\n");
    }
}
