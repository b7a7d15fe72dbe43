//! Kernel module dependency management.
//!
//! Keeps a module listed for boot-time loading (with its parameter file)
//! and loaded now, and reverses both on removal. Every operation reads the
//! current host state first and only changes what differs.

mod boot_list;
mod loader;
mod params;
mod registry;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Settings;
use crate::error::{SetupError, SetupResult};
use crate::executor::ProcessRunner;
use crate::lifecycle::{tolerate, FnStep, Plan, StepOutcome};
use crate::validation::validate_module_name;

pub use loader::ModuleLoader;
pub use params::params_path;

/// Boot registration, parameters and live state of kernel modules.
pub struct ModuleManager {
    modules_load_file: PathBuf,
    modprobe_dir: PathBuf,
    loader: ModuleLoader,
}

impl ModuleManager {
    pub fn new(settings: &Settings, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            modules_load_file: settings.paths.modules_load_file.clone(),
            modprobe_dir: settings.paths.modprobe_dir.clone(),
            loader: ModuleLoader::new(
                &settings.tools.modprobe,
                settings.paths.proc_modules.clone(),
                runner,
            ),
        }
    }

    /// List `module` in the boot-time module list, once.
    pub fn ensure_boot_load(&self, module: &str) -> SetupResult<StepOutcome> {
        validate_module_name(module)?;
        boot_list::ensure_boot_load(&self.modules_load_file, module)
    }

    /// Drop every exact `module` line from the boot-time module list.
    pub fn remove_boot_load(&self, module: &str) -> SetupResult<StepOutcome> {
        validate_module_name(module)?;
        boot_list::remove_boot_load(&self.modules_load_file, module)
    }

    pub fn is_boot_configured(&self, module: &str) -> SetupResult<bool> {
        boot_list::is_boot_configured(&self.modules_load_file, module)
    }

    /// Write `options <module> k=v ...`, replacing earlier content.
    pub fn set_module_params(
        &self,
        module: &str,
        params: &BTreeMap<String, String>,
    ) -> SetupResult<StepOutcome> {
        params::set_module_params(&self.modprobe_dir, module, params)
    }

    /// Remove the parameter file, if any.
    pub fn clear_module_params(&self, module: &str) -> SetupResult<StepOutcome> {
        params::clear_module_params(&self.modprobe_dir, module)
    }

    pub fn has_params(&self, module: &str) -> bool {
        params_path(&self.modprobe_dir, module).is_file()
    }

    pub fn load_module(
        &self,
        module: &str,
        params: &BTreeMap<String, String>,
    ) -> SetupResult<StepOutcome> {
        validate_module_name(module)?;
        self.loader.load_module(module, params)
    }

    pub fn unload_module(&self, module: &str) -> SetupResult<StepOutcome> {
        validate_module_name(module)?;
        self.loader.unload_module(module)
    }

    pub fn is_loaded(&self, module: &str) -> SetupResult<bool> {
        self.loader.is_loaded(module)
    }

    /// Boot registration, parameter file, then a best-effort load.
    pub fn install_steps<'a>(
        &'a self,
        module: &'a str,
        params: &'a BTreeMap<String, String>,
    ) -> Plan<'a> {
        vec![
            FnStep::boxed("module.boot_list.add", move || self.ensure_boot_load(module)),
            FnStep::boxed("module.params.write", move || {
                self.set_module_params(module, params)
            }),
            // Best-effort: a failed load does not abort install
            FnStep::boxed("module.load", move || {
                tolerate(self.load_module(module, params), |e| {
                    matches!(e, SetupError::ModuleLoad { .. } | SetupError::Command { .. })
                })
            }),
        ]
    }

    /// Unload first; boot configuration is only removed once the module is gone.
    pub fn uninstall_steps<'a>(&'a self, module: &'a str) -> Plan<'a> {
        vec![
            FnStep::boxed("module.unload", move || self.unload_module(module)),
            FnStep::boxed("module.params.remove", move || self.clear_module_params(module)),
            FnStep::boxed("module.boot_list.remove", move || self.remove_boot_load(module)),
        ]
    }
}
