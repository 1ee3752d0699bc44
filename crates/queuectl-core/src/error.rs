//! Error kinds surfaced by the core (spec §7).
//!
//! `Timeout` and `ExecutionFailure` from the spec's error list are
//! deliberately absent here: they are execution outcomes, recorded as data
//! on the job row by `fail`, and never bubble up to the CLI as an `Err`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueuectlError {
    #[error("job id '{0}' already exists")]
    DuplicateId(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("a worker manager is already running (pid {0})")]
    AlreadyRunning(u32),

    #[error("no worker manager is running")]
    NotRunning,

    #[error("storage error: {0}")]
    StorageError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl QueuectlError {
    /// Maps an error to the process exit code from spec §6/§7: user-facing
    /// validation/state errors exit 1; storage/internal errors exit 2.
    pub fn exit_code(&self) -> i32 {
        match self {
            QueuectlError::DuplicateId(_)
            | QueuectlError::InvalidInput(_)
            | QueuectlError::NotFound(_)
            | QueuectlError::AlreadyRunning(_)
            | QueuectlError::NotRunning => 1,
            QueuectlError::StorageError(_) | QueuectlError::Io(_) => 2,
        }
    }
}
