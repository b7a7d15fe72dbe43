//! Atomic file writes.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tracing::debug;
use uuid::Uuid;

use crate::error::SetupError;

/// Outcome of [`write_if_changed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The file was created or its content replaced.
    Written,
    /// The file already held exactly this content.
    Unchanged,
}

/// Read a file, treating a missing file as `None`.
pub fn read_optional(path: &Path) -> Result<Option<String>, SetupError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SetupError::from_io(path, e)),
    }
}

/// Replace `path` with `content`, atomically.
///
/// Writes a uniquely named sibling temp file (created exclusively), syncs
/// it, applies `mode`, then renames it over the target. Missing parent
/// directories are created.
pub fn write_atomic(path: &Path, content: &str, mode: u32) -> Result<(), SetupError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| SetupError::from_io(parent, e))?;
        }
    }

    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        Uuid::new_v4().simple()
    );
    let temp_path = path.with_file_name(temp_name);

    let result = (|| {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::set_permissions(&temp_path, fs::Permissions::from_mode(mode))?;
        fs::rename(&temp_path, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(SetupError::from_io(path, e));
    }

    debug!(path = %path.display(), bytes = content.len(), "File written");
    Ok(())
}

/// Write `content` to `path` unless it already holds exactly that content.
pub fn write_if_changed(path: &Path, content: &str, mode: u32) -> Result<WriteOutcome, SetupError> {
    if read_optional(path)?.as_deref() == Some(content) {
        return Ok(WriteOutcome::Unchanged);
    }

    write_atomic(path, content, mode)?;
    Ok(WriteOutcome::Written)
}
