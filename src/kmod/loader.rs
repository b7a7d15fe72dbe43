//! Loading and unloading modules through modprobe.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{SetupError, SetupResult};
use crate::executor::{sanitize_output, ProcessRunner};
use crate::lifecycle::StepOutcome;

use super::registry::is_loaded;

/// Runs modprobe, consulting the loaded-module registry around each call.
pub struct ModuleLoader {
    modprobe: String,
    proc_modules: PathBuf,
    runner: Arc<dyn ProcessRunner>,
}

impl ModuleLoader {
    pub fn new(modprobe: &str, proc_modules: PathBuf, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            modprobe: modprobe.to_string(),
            proc_modules,
            runner,
        }
    }

    pub fn is_loaded(&self, module: &str) -> SetupResult<bool> {
        is_loaded(&self.proc_modules, module)
    }

    /// Load `module` with `params`.
    ///
    /// Already loaded (before the call, or according to the registry after a
    /// failed call) counts as success. Any other loader failure is a
    /// [`SetupError::ModuleLoad`].
    pub fn load_module(
        &self,
        module: &str,
        params: &BTreeMap<String, String>,
    ) -> SetupResult<StepOutcome> {
        if self.is_loaded(module)? {
            debug!(module = %module, "Module already loaded");
            return Ok(StepOutcome::Unchanged);
        }

        let assignments: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        let mut args: Vec<&str> = vec![module];
        args.extend(assignments.iter().map(String::as_str));

        let result = self.runner.run(&self.modprobe, &args)?;
        if result.success {
            info!(module = %module, params = ?assignments, "Module loaded");
            return Ok(StepOutcome::Applied);
        }

        if self.is_loaded(module)? {
            debug!(
                module = %module,
                stderr = %result.stderr.trim(),
                "modprobe failed but module is loaded"
            );
            return Ok(StepOutcome::Unchanged);
        }

        warn!(
            module = %module,
            exit_code = ?result.exit_code,
            stderr = %result.stderr.trim(),
            "modprobe rejected load"
        );
        Err(SetupError::ModuleLoad {
            module: module.to_string(),
            message: format!("load failed: {}", sanitize_output(result.diagnostic(), 5)),
        })
    }

    /// Unload `module` if the registry lists it; otherwise do nothing.
    pub fn unload_module(&self, module: &str) -> SetupResult<StepOutcome> {
        if !self.is_loaded(module)? {
            debug!(module = %module, "Module not loaded, nothing to unload");
            return Ok(StepOutcome::Unchanged);
        }

        let result = self.runner.run(&self.modprobe, &["-r", module])?;
        if result.success || !self.is_loaded(module)? {
            info!(module = %module, "Module unloaded");
            return Ok(StepOutcome::Applied);
        }

        warn!(
            module = %module,
            exit_code = ?result.exit_code,
            stderr = %result.stderr.trim(),
            "modprobe rejected unload"
        );
        Err(SetupError::ModuleLoad {
            module: module.to_string(),
            message: format!("unload failed: {}", sanitize_output(result.diagnostic(), 5)),
        })
    }
}
