//! File removal that tolerates absence.

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use crate::error::SetupError;

/// Remove a regular file. Returns `false` if it did not exist.
pub fn remove_if_exists(path: &Path) -> Result<bool, SetupError> {
    if path.is_dir() {
        return Err(SetupError::Write {
            path: path.to_path_buf(),
            message: "Expected a file, found a directory".to_string(),
        });
    }

    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "File removed");
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SetupError::from_io(path, e)),
    }
}
