//! Audit logger for writing audit entries to file.
//!
//! Writes one JSON object per line.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::SetupError;

use super::entry::AuditEntry;

/// Appends audit entries to a file in JSON lines format.
pub struct AuditLogger {
    file: Mutex<File>,
    path: PathBuf,
}

impl AuditLogger {
    /// Open (or create) the audit log at `path` for appending.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn new(path: &Path) -> Result<Self, SetupError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!(path = %parent.display(), "Creating audit log directory");
                std::fs::create_dir_all(parent).map_err(|e| SetupError::from_io(parent, e))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SetupError::from_io(path, e))?;

        debug!(path = %path.display(), "Audit logger initialized");

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Append one entry and sync it to disk.
    pub fn log(&self, entry: &AuditEntry) -> Result<(), SetupError> {
        let json = serde_json::to_string(entry)?;

        let mut file = self.file.lock().map_err(|e| SetupError::Write {
            path: self.path.clone(),
            message: format!("Failed to acquire audit log lock: {}", e),
        })?;

        writeln!(file, "{}", json).map_err(|e| SetupError::from_io(&self.path, e))?;

        if let Err(e) = file.sync_data() {
            warn!(error = %e, "Failed to sync audit log");
        }

        Ok(())
    }

    /// Get the path to the audit log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
