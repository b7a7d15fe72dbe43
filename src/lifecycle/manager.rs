//! Install / uninstall orchestration.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use nix::unistd::geteuid;
use tracing::{debug, info, warn};

use crate::audit::AuditLogger;
use crate::config::Settings;
use crate::error::{SetupError, SetupResult};
use crate::executor::{ProcessRunner, SystemRunner};
use crate::kmod::ModuleManager;
use crate::templates::TemplateEngine;
use crate::unit::{UnitDefinition, UnitManager};

use super::status::LifecycleStatus;
use super::step::{run_plan, ExecutionContext, Plan, Report};

/// Drives the module + unit pair through install and uninstall.
pub struct Lifecycle {
    settings: Settings,
    definition: UnitDefinition,
    module_params: BTreeMap<String, String>,
    units: UnitManager,
    modules: ModuleManager,
}

impl Lifecycle {
    /// Lifecycle acting on the local host.
    pub fn new(settings: Settings) -> SetupResult<Self> {
        let timeout = Duration::from_secs(settings.limits.command_timeout_seconds);
        Self::with_runner(settings, Arc::new(SystemRunner::new(timeout)))
    }

    /// Lifecycle invoking external tools through `runner`.
    pub fn with_runner(settings: Settings, runner: Arc<dyn ProcessRunner>) -> SetupResult<Self> {
        settings.validate()?;

        let templates = match &settings.paths.templates_dir {
            Some(dir) => TemplateEngine::new(dir)?,
            None => TemplateEngine::builtin()?,
        };
        let definition = UnitDefinition::from_settings(&settings)?;
        let module_params = settings.module_params();
        let units = UnitManager::new(&settings, Arc::clone(&runner), templates);
        let modules = ModuleManager::new(&settings, runner);

        Ok(Self {
            settings,
            definition,
            module_params,
            units,
            modules,
        })
    }

    pub fn units(&self) -> &UnitManager {
        &self.units
    }

    pub fn modules(&self) -> &ModuleManager {
        &self.modules
    }

    pub fn definition(&self) -> &UnitDefinition {
        &self.definition
    }

    /// Configure boot loading, load the module, then write and start the unit.
    pub fn install(&self) -> SetupResult<Report> {
        self.ensure_privileged()?;
        let ctx = ExecutionContext::new("install");
        info!(
            run_id = %ctx.run_id,
            unit = %self.definition.name,
            module = %self.settings.module.name,
            "Installing"
        );

        let mut plan: Plan<'_> = self
            .modules
            .install_steps(&self.settings.module.name, &self.module_params);
        plan.extend(self.units.install_steps(&self.definition));

        let audit = self.open_audit();
        run_plan(&ctx, plan, audit.as_ref())
    }

    /// Stop and remove the unit, then unload and unregister the module.
    pub fn uninstall(&self) -> SetupResult<Report> {
        self.ensure_privileged()?;
        let ctx = ExecutionContext::new("uninstall");
        info!(
            run_id = %ctx.run_id,
            unit = %self.definition.name,
            module = %self.settings.module.name,
            "Uninstalling"
        );

        let mut plan: Plan<'_> = self.units.uninstall_steps(&self.definition.name);
        plan.extend(self.modules.uninstall_steps(&self.settings.module.name));

        let audit = self.open_audit();
        run_plan(&ctx, plan, audit.as_ref())
    }

    /// Query the host; changes nothing.
    pub fn status(&self) -> SetupResult<LifecycleStatus> {
        let unit = &self.definition.name;
        let module = &self.settings.module.name;

        let unit_file_present = self.units.is_installed(unit);
        let unit_enabled = self.units.is_enabled(unit)?;
        let unit_active = self.units.is_active(unit)?;
        let module_loaded = self.modules.is_loaded(module)?;
        let boot_configured = self.modules.is_boot_configured(module)?;
        let params_present = self.modules.has_params(module);

        Ok(LifecycleStatus {
            state: LifecycleStatus::derive_state(
                unit_active,
                unit_file_present,
                module_loaded,
                boot_configured,
                params_present,
            ),
            unit: unit.clone(),
            module: module.clone(),
            unit_file_present,
            unit_enabled,
            unit_active,
            module_loaded,
            boot_configured,
            params_present,
        })
    }

    fn ensure_privileged(&self) -> SetupResult<()> {
        if !self.settings.require_root {
            return Ok(());
        }
        let euid = geteuid();
        if !euid.is_root() {
            return Err(SetupError::Permission {
                message: format!("must run as root (effective uid {})", euid),
            });
        }
        Ok(())
    }

    fn open_audit(&self) -> Option<AuditLogger> {
        if !self.settings.audit.enabled {
            return None;
        }
        match AuditLogger::new(&self.settings.audit.log_path) {
            Ok(logger) => {
                debug!(path = %logger.path().display(), "Audit log opened");
                Some(logger)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    path = %self.settings.audit.log_path.display(),
                    "Audit log unavailable, continuing without it"
                );
                None
            }
        }
    }
}
