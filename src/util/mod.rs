//! Small helpers shared across csmock: diagnostic logging and shell quoting.

pub mod logging;
pub mod shell;

pub use logging::{init_logging, LoggingConfig};
pub use shell::{sanitize_opts, serialize_flags, shell_quote, strlist_to_shell_cmd};
