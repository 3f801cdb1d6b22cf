use thiserror::Error;

/// Exit code used when the command line cannot be parsed or is inconsistent.
pub const USAGE_EXIT_CODE: i32 = 2;

#[derive(Debug, Error)]
pub enum ScanError {
    /// Scan aborted; the exit code has already been recorded in the results.
    #[error("scan aborted with exit code {ec}")]
    Fatal { ec: i32 },

    #[error("{0}")]
    Usage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    pub fn usage(msg: impl Into<String>) -> Self {
        ScanError::Usage(msg.into())
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ScanError::Fatal { ec } => *ec,
            ScanError::Usage(_) => USAGE_EXIT_CODE,
            ScanError::Io(_) => 1,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ScanError::Fatal { .. })
    }
}

/// Maps an error chain to the process exit code.
///
/// A `ScanError` anywhere in the chain decides the code, anything else is a
/// plain failure.
pub fn exit_code_of(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ScanError>())
        .map(ScanError::exit_code)
        .unwrap_or(1)
}
