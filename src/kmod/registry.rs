//! Loaded-module registry (`/proc/modules`).

use std::path::Path;

use tracing::debug;

use crate::error::SetupResult;
use crate::files::read_optional;

/// The kernel reports `-` in module names as `_`.
fn normalize(name: &str) -> String {
    name.replace('-', "_")
}

/// Whether `content` (in `/proc/modules` format) lists `module`.
pub fn lists_module(content: &str, module: &str) -> bool {
    let wanted = normalize(module);
    content
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .any(|name| normalize(name) == wanted)
}

/// Whether `module` is currently loaded according to the registry at `path`.
///
/// A missing registry (no module support) means nothing is loaded.
pub fn is_loaded(path: &Path, module: &str) -> SetupResult<bool> {
    match read_optional(path)? {
        Some(content) => Ok(lists_module(&content, module)),
        None => {
            debug!(path = %path.display(), "Module registry not present");
            Ok(false)
        }
    }
}
