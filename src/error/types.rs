//! Error types for the setup tool.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for lifecycle operations.
#[derive(Error, Debug)]
pub enum SetupError {
    /// The process lacks the privilege needed to change host state.
    #[error("Permission denied: {message}")]
    Permission { message: String },

    /// Creating, writing, renaming or deleting a file failed.
    #[error("Write failed for {}: {message}", path.display())]
    Write { path: PathBuf, message: String },

    /// The service manager rejected a reload/enable/start/stop/disable request.
    #[error("systemctl {action} failed for {unit}: {message}")]
    Supervision {
        action: String,
        unit: String,
        message: String,
    },

    /// The module loader rejected a request for a reason other than
    /// the module already being in the desired state.
    #[error("Kernel module {module}: {message}")]
    ModuleLoad { module: String, message: String },

    /// Configuration-related errors.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Template-related errors.
    #[error("Template error: {message}")]
    Template { message: String },

    /// Validation errors.
    #[error("Validation error: {kind}")]
    Validation { kind: ValidationErrorKind },

    /// An external tool could not be run at all.
    #[error("Command error: {kind}")]
    Command { kind: CommandErrorKind },

    /// A lifecycle step failed; wraps the underlying cause.
    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: Box<SetupError>,
    },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Validation error kinds.
#[derive(Error, Debug)]
pub enum ValidationErrorKind {
    #[error("Invalid unit name: {name}")]
    InvalidUnitName { name: String },

    #[error("Invalid module name: {name}")]
    InvalidModuleName { name: String },

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },
}

/// Command error kinds.
#[derive(Error, Debug)]
pub enum CommandErrorKind {
    #[error("Command execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("Command timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },
}

impl SetupError {
    /// Classify an I/O failure on `path`.
    ///
    /// `PermissionDenied` maps to [`SetupError::Permission`]; everything else
    /// is a [`SetupError::Write`].
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::PermissionDenied {
            SetupError::Permission {
                message: format!("{}: {}", path.display(), err),
            }
        } else {
            SetupError::Write {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
        }
    }

    /// Wrap this error with the name of the step that produced it.
    pub fn in_step(self, step: &str) -> Self {
        SetupError::StepFailed {
            step: step.to_string(),
            source: Box::new(self),
        }
    }

    /// Stable error code for reports and the audit log.
    pub fn code(&self) -> &'static str {
        match self {
            SetupError::Permission { .. } => "PERMISSION_DENIED",
            SetupError::Write { .. } => "WRITE_FAILED",
            SetupError::Supervision { .. } => "SUPERVISION_FAILED",
            SetupError::ModuleLoad { .. } => "MODULE_LOAD_FAILED",
            SetupError::Config { .. } => "CONFIG_ERROR",
            SetupError::Template { .. } => "TEMPLATE_ERROR",
            SetupError::Validation { .. } => "VALIDATION_ERROR",
            SetupError::Command {
                kind: CommandErrorKind::Timeout { .. },
            } => "COMMAND_TIMEOUT",
            SetupError::Command { .. } => "COMMAND_FAILED",
            SetupError::StepFailed { source, .. } => source.code(),
            SetupError::Io(_) => "IO_ERROR",
            SetupError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

/// Result type alias for setup operations.
pub type SetupResult<T> = Result<T, SetupError>;
