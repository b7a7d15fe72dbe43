//! Module parameter files (`/etc/modprobe.d/<module>.conf`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::SetupResult;
use crate::files::{remove_if_exists, write_if_changed, WriteOutcome};
use crate::lifecycle::StepOutcome;
use crate::validation::{validate_module_name, validate_module_param};

const PARAMS_FILE_MODE: u32 = 0o644;

/// Parameter file path for `module` inside `modprobe_dir`.
pub fn params_path(modprobe_dir: &Path, module: &str) -> PathBuf {
    modprobe_dir.join(format!("{}.conf", module))
}

/// The single `options` line for `module`, with trailing newline.
pub fn render_options(module: &str, params: &BTreeMap<String, String>) -> String {
    let mut line = format!("options {}", module);
    for (key, value) in params {
        line.push(' ');
        line.push_str(key);
        line.push('=');
        line.push_str(value);
    }
    line.push('\n');
    line
}

/// Write the parameter file for `module`, replacing any previous content.
///
/// An empty parameter map removes the file instead.
pub fn set_module_params(
    modprobe_dir: &Path,
    module: &str,
    params: &BTreeMap<String, String>,
) -> SetupResult<StepOutcome> {
    validate_module_name(module)?;
    if params.is_empty() {
        return clear_module_params(modprobe_dir, module);
    }
    for (key, value) in params {
        validate_module_param(key, value)?;
    }

    let path = params_path(modprobe_dir, module);
    match write_if_changed(&path, &render_options(module, params), PARAMS_FILE_MODE)? {
        WriteOutcome::Written => {
            info!(module = %module, path = %path.display(), "Module parameters written");
            Ok(StepOutcome::Applied)
        }
        WriteOutcome::Unchanged => Ok(StepOutcome::Unchanged),
    }
}

/// Delete the parameter file for `module` if present.
pub fn clear_module_params(modprobe_dir: &Path, module: &str) -> SetupResult<StepOutcome> {
    validate_module_name(module)?;
    let path = params_path(modprobe_dir, module);
    if remove_if_exists(&path)? {
        info!(module = %module, path = %path.display(), "Module parameters removed");
        Ok(StepOutcome::Applied)
    } else {
        Ok(StepOutcome::Unchanged)
    }
}
