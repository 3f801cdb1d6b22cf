//! csmock - static analysis of source RPMs in a mock chroot
//!
//! csmock rebuilds a source RPM in a `mock` chroot with analyzers hooked
//! into the build and merges their findings into one set of results.
//!
//! # Core Concepts
//!
//! - **Plugins**: one per analyzer (gcc, clang, cppcheck, shellcheck, ...).
//!   A plugin owns its command-line options and, when enabled, edits the
//!   shared [`ScanProps`]: packages to install, compiler wrappers, files to
//!   copy in and out of the chroot, hooks and result filters.
//! - **Hooks**: work scheduled by plugins into the fixed phases of a scan
//!   (pre-mock, post-depinst, post-install, post-process).
//! - **Results**: [`ScanResults`] owns the output directory, `scan.log` and
//!   `scan.ini`, runs every external command and tracks the exit code.
//!
//! # Example Usage
//!
//! ```ignore
//! use csmock::{CsmockConfig, PluginRegistry, ScanProps, ToolSelection};
//! use csmock::host::RealHost;
//!
//! let config = CsmockConfig::default();
//! let mut props = ScanProps::new(config.cswrap_timeout_secs);
//! let selection = ToolSelection { tools: Some(vec!["gcc".into()]), all_tools: false };
//! let enabled = PluginRegistry::with_defaults()
//!     .configure(&selection, &mut props, &RealHost::new(), &config)?;
//! ```

pub mod cflags;
pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod mock;
pub mod pipeline;
pub mod plugins;
pub mod progress;
pub mod props;
pub mod results;
pub mod scripts;
pub mod util;

pub use cflags::FlagMatrix;
pub use config::{ConfigError, CsmockConfig};
pub use error::{exit_code_of, ScanError};
pub use mock::MockWrapper;
pub use pipeline::{Hook, HookContext, HookPhase, ScanPipeline};
pub use plugins::{Plugin, PluginArgs, PluginRegistry, ToolSelection};
pub use props::ScanProps;
pub use results::{ScanResults, ScanResultsOptions};
pub use util::{init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name_is_csmock() {
        assert_eq!(NAME, "csmock");
    }
}
