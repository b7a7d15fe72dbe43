//! Boot-time module list (`/etc/modules`).
//!
//! One module name per line. Only a line that is exactly the module name
//! counts as an entry; comments and lines carrying parameters are left
//! alone.

use std::path::Path;

use tracing::{debug, info};

use crate::error::SetupResult;
use crate::files::{read_optional, write_atomic};
use crate::lifecycle::StepOutcome;

const BOOT_LIST_MODE: u32 = 0o644;

fn is_entry(line: &str, module: &str) -> bool {
    line.strip_suffix('\r').unwrap_or(line) == module
}

/// Whether `content` lists `module`.
pub fn contains_entry(content: &str, module: &str) -> bool {
    content.lines().any(|line| is_entry(line, module))
}

/// `content` with `module` appended, or `None` if it is already listed.
pub fn with_entry(content: &str, module: &str) -> Option<String> {
    if contains_entry(content, module) {
        return None;
    }

    let mut updated = String::with_capacity(content.len() + module.len() + 1);
    updated.push_str(content);
    if !content.is_empty() && !content.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(module);
    updated.push('\n');
    Some(updated)
}

/// `content` with every `module` line dropped, or `None` if there was none.
///
/// Remaining lines keep their order and line endings.
pub fn without_entry(content: &str, module: &str) -> Option<String> {
    if !contains_entry(content, module) {
        return None;
    }

    let kept: String = content
        .split_inclusive('\n')
        .filter(|line| !is_entry(line.trim_end_matches('\n'), module))
        .collect();
    Some(kept)
}

/// Whether the boot list at `path` names `module`.
pub fn is_boot_configured(path: &Path, module: &str) -> SetupResult<bool> {
    Ok(read_optional(path)?
        .map(|content| contains_entry(&content, module))
        .unwrap_or(false))
}

/// Add `module` to the boot list unless it is already there.
pub fn ensure_boot_load(path: &Path, module: &str) -> SetupResult<StepOutcome> {
    let content = read_optional(path)?.unwrap_or_default();

    match with_entry(&content, module) {
        Some(updated) => {
            write_atomic(path, &updated, BOOT_LIST_MODE)?;
            info!(module = %module, path = %path.display(), "Module added to boot list");
            Ok(StepOutcome::Applied)
        }
        None => {
            debug!(module = %module, "Module already in boot list");
            Ok(StepOutcome::Unchanged)
        }
    }
}

/// Remove every line naming `module` from the boot list.
pub fn remove_boot_load(path: &Path, module: &str) -> SetupResult<StepOutcome> {
    let Some(content) = read_optional(path)? else {
        return Ok(StepOutcome::Unchanged);
    };

    match without_entry(&content, module) {
        Some(updated) => {
            write_atomic(path, &updated, BOOT_LIST_MODE)?;
            info!(module = %module, path = %path.display(), "Module removed from boot list");
            Ok(StepOutcome::Applied)
        }
        None => Ok(StepOutcome::Unchanged),
    }
}
