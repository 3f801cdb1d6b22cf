use std::env;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

const DEFAULT_MOCK_BIN: &str = "/usr/bin/mock";
const DEFAULT_MOCK_PROFILE: &str = "default";
const DEFAULT_SCRIPTS_DIR: &str = "/usr/share/csmock/scripts";
const DEFAULT_CACHE_DIR: &str = "/var/tmp/csmock";
const DEFAULT_CSWRAP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

/// Host-side settings that do not change between scans.
#[derive(Debug, Clone)]
pub struct CsmockConfig {
    pub mock_bin: PathBuf,
    pub mock_profile: String,
    /// Directory with helper scripts that get copied into the chroot.
    pub scripts_dir: PathBuf,
    /// Download cache for analyzers that are not packaged (gitleaks, snyk).
    pub cache_dir: PathBuf,
    pub cswrap_timeout_secs: u64,
    pub log_level: String,
}

impl Default for CsmockConfig {
    fn default() -> Self {
        let mock_bin = env::var("CSMOCK_MOCK_BIN")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_MOCK_BIN));

        let mock_profile =
            env::var("CSMOCK_MOCK_PROFILE").unwrap_or_else(|_| DEFAULT_MOCK_PROFILE.to_string());

        let scripts_dir = env::var("CSMOCK_SCRIPTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SCRIPTS_DIR));

        let cache_dir = env::var("CSMOCK_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_DIR));

        let cswrap_timeout_secs = env::var("CSMOCK_CSWRAP_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_CSWRAP_TIMEOUT_SECS);

        let log_level = env::var("CSMOCK_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            mock_bin,
            mock_profile,
            scripts_dir,
            cache_dir,
            cswrap_timeout_secs,
            log_level,
        }
    }
}

impl CsmockConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mock_profile.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Mock profile must not be empty".to_string(),
            ));
        }

        if self.cswrap_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "cswrap timeout must be at least 1 second".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        if !self.scripts_dir.is_absolute() {
            return Err(ConfigError::ValidationFailed(format!(
                "Scripts directory must be an absolute path: {}",
                self.scripts_dir.display()
            )));
        }

        Ok(())
    }

    /// Path of a helper script installed next to csmock.
    pub fn script(&self, name: &str) -> PathBuf {
        self.scripts_dir.join(name)
    }
}

impl fmt::Display for CsmockConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "mock_bin = {}", self.mock_bin.display())?;
        writeln!(f, "mock_profile = {}", self.mock_profile)?;
        writeln!(f, "scripts_dir = {}", self.scripts_dir.display())?;
        writeln!(f, "cache_dir = {}", self.cache_dir.display())?;
        writeln!(f, "cswrap_timeout_secs = {}", self.cswrap_timeout_secs)?;
        write!(f, "log_level = {}", self.log_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            "CSMOCK_MOCK_BIN",
            "CSMOCK_MOCK_PROFILE",
            "CSMOCK_SCRIPTS_DIR",
            "CSMOCK_CACHE_DIR",
            "CSMOCK_CSWRAP_TIMEOUT",
            "CSMOCK_LOG_LEVEL",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = CsmockConfig::default();
        assert_eq!(config.mock_bin, PathBuf::from(DEFAULT_MOCK_BIN));
        assert_eq!(config.mock_profile, "default");
        assert_eq!(config.cswrap_timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var("CSMOCK_MOCK_PROFILE", "fedora-rawhide-x86_64");
        env::set_var("CSMOCK_CSWRAP_TIMEOUT", "120");
        env::set_var("CSMOCK_LOG_LEVEL", "DEBUG");

        let config = CsmockConfig::default();
        assert_eq!(config.mock_profile, "fedora-rawhide-x86_64");
        assert_eq!(config.cswrap_timeout_secs, 120);
        assert_eq!(config.log_level, "debug");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_unparsable_timeout_falls_back() {
        clear_env();
        env::set_var("CSMOCK_CSWRAP_TIMEOUT", "soon");
        assert_eq!(CsmockConfig::default().cswrap_timeout_secs, 30);
        clear_env();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = CsmockConfig {
            mock_bin: PathBuf::from(DEFAULT_MOCK_BIN),
            mock_profile: "default".to_string(),
            scripts_dir: PathBuf::from(DEFAULT_SCRIPTS_DIR),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            cswrap_timeout_secs: 0,
            log_level: "info".to_string(),
        };
        assert!(config.validate().is_err());

        config.cswrap_timeout_secs = 30;
        config.log_level = "loud".to_string();
        assert!(config.validate().is_err());

        config.log_level = "warn".to_string();
        config.scripts_dir = PathBuf::from("scripts");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_script_path() {
        let config = CsmockConfig {
            scripts_dir: PathBuf::from("/opt/cs/scripts"),
            ..CsmockConfig::default()
        };
        assert_eq!(
            config.script("convert-clippy.py"),
            PathBuf::from("/opt/cs/scripts/convert-clippy.py")
        );
    }
}
