//! Service unit installation and removal.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::{SetupError, SetupResult};
use crate::executor::{sanitize_output, ProcessRunner};
use crate::files::{remove_if_exists, write_if_changed, WriteOutcome};
use crate::lifecycle::{run_plan, ExecutionContext, FnStep, Plan, Report, StepOutcome};
use crate::templates::TemplateEngine;
use crate::validation::validate_unit_name;

use super::definition::UnitDefinition;
use super::properties::{UnitProperties, SHOWN_PROPERTIES};

/// Unit files are world-readable, root-writable.
const UNIT_FILE_MODE: u32 = 0o644;

/// Writes unit files and drives systemctl.
pub struct UnitManager {
    unit_dir: PathBuf,
    systemctl: String,
    runner: Arc<dyn ProcessRunner>,
    templates: TemplateEngine,
}

impl UnitManager {
    pub fn new(
        settings: &Settings,
        runner: Arc<dyn ProcessRunner>,
        templates: TemplateEngine,
    ) -> Self {
        Self {
            unit_dir: settings.paths.unit_dir.clone(),
            systemctl: settings.tools.systemctl.clone(),
            runner,
            templates,
        }
    }

    /// Location of the unit file for `name`.
    pub fn unit_path(&self, name: &str) -> PathBuf {
        self.unit_dir.join(name)
    }

    /// Whether a unit file for `name` exists.
    pub fn is_installed(&self, name: &str) -> bool {
        self.unit_path(name).is_file()
    }

    /// systemd's current view of the unit.
    pub fn properties(&self, name: &str) -> SetupResult<UnitProperties> {
        let result = self.runner.run(&self.systemctl, &["show", SHOWN_PROPERTIES, name])?;
        if !result.success {
            return Err(SetupError::Supervision {
                action: "show".to_string(),
                unit: name.to_string(),
                message: sanitize_output(result.diagnostic(), 5),
            });
        }
        Ok(UnitProperties::parse(&result.stdout))
    }

    /// Whether systemd reports the unit as active.
    pub fn is_active(&self, name: &str) -> SetupResult<bool> {
        Ok(self.properties(name)?.is_active())
    }

    /// Whether systemd reports the unit as enabled.
    pub fn is_enabled(&self, name: &str) -> SetupResult<bool> {
        let result = self.runner.run(&self.systemctl, &["is-enabled", "--quiet", name])?;
        Ok(result.success)
    }

    /// Write the unit file, replacing any previous definition under the same name.
    pub fn write_unit(&self, definition: &UnitDefinition) -> SetupResult<StepOutcome> {
        validate_unit_name(&definition.name)?;
        let content = definition.render(&self.templates)?;
        let path = self.unit_path(&definition.name);

        match write_if_changed(&path, &content, UNIT_FILE_MODE)? {
            WriteOutcome::Written => {
                info!(unit = %definition.name, path = %path.display(), "Unit file written");
                Ok(StepOutcome::Applied)
            }
            WriteOutcome::Unchanged => {
                debug!(unit = %definition.name, "Unit file already up to date");
                Ok(StepOutcome::Unchanged)
            }
        }
    }

    /// Make systemd re-read unit files.
    pub fn daemon_reload(&self, name: &str) -> SetupResult<StepOutcome> {
        self.systemctl(&["daemon-reload"], "daemon-reload", name)?;
        Ok(StepOutcome::Applied)
    }

    /// Mark the unit for start at boot.
    pub fn enable(&self, name: &str) -> SetupResult<StepOutcome> {
        self.systemctl(&["enable", name], "enable", name)?;
        Ok(StepOutcome::Applied)
    }

    /// Start the unit now.
    ///
    /// Always issued, so a crashed or stopped service is brought back up
    /// by a repeated install.
    pub fn start(&self, name: &str) -> SetupResult<StepOutcome> {
        self.systemctl(&["start", name], "start", name)?;
        Ok(StepOutcome::Applied)
    }

    /// Stop the unit if it is running or waiting to restart.
    pub fn stop(&self, name: &str) -> SetupResult<StepOutcome> {
        let props = self.properties(name)?;
        if !props.is_running() {
            debug!(unit = %name, state = %props.active_state, "Unit not running, nothing to stop");
            return Ok(StepOutcome::Unchanged);
        }
        self.systemctl(&["stop", name], "stop", name)?;
        Ok(StepOutcome::Applied)
    }

    /// Remove the unit from boot-time start if it is enabled.
    pub fn disable(&self, name: &str) -> SetupResult<StepOutcome> {
        if !self.is_enabled(name)? {
            debug!(unit = %name, "Unit not enabled, nothing to disable");
            return Ok(StepOutcome::Unchanged);
        }
        self.systemctl(&["disable", name], "disable", name)?;
        Ok(StepOutcome::Applied)
    }

    /// Delete the unit file if present.
    pub fn remove_unit(&self, name: &str) -> SetupResult<StepOutcome> {
        validate_unit_name(name)?;
        let path = self.unit_path(name);
        if remove_if_exists(&path)? {
            info!(unit = %name, path = %path.display(), "Unit file removed");
            Ok(StepOutcome::Applied)
        } else {
            Ok(StepOutcome::Unchanged)
        }
    }

    /// Steps that write, register, enable and start the unit.
    pub fn install_steps<'a>(&'a self, definition: &'a UnitDefinition) -> Plan<'a> {
        let name = definition.name.as_str();
        vec![
            FnStep::boxed("unit.write", move || self.write_unit(definition)),
            FnStep::boxed("unit.daemon_reload", move || self.daemon_reload(name)),
            FnStep::boxed("unit.enable", move || self.enable(name)),
            FnStep::boxed("unit.start", move || self.start(name)),
        ]
    }

    /// Reload systemd if it still holds a definition whose file is gone.
    pub fn reload_if_stale(&self, name: &str) -> SetupResult<StepOutcome> {
        let props = self.properties(name)?;
        if !props.is_stale(&self.unit_path(name)) {
            debug!(unit = %name, load_state = %props.load_state, "systemd view is current");
            return Ok(StepOutcome::Unchanged);
        }
        self.daemon_reload(name)
    }

    /// Steps that stop, disable and delete the unit.
    pub fn uninstall_steps<'a>(&'a self, name: &'a str) -> Plan<'a> {
        vec![
            FnStep::boxed("unit.stop", move || self.stop(name)),
            FnStep::boxed("unit.disable", move || self.disable(name)),
            FnStep::boxed("unit.remove", move || self.remove_unit(name)),
            FnStep::boxed("unit.daemon_reload", move || self.reload_if_stale(name)),
        ]
    }

    /// Write, reload, enable and start `definition`, aborting at the first failure.
    pub fn install_unit(
        &self,
        ctx: &ExecutionContext,
        definition: &UnitDefinition,
    ) -> SetupResult<Report> {
        run_plan(ctx, self.install_steps(definition), None)
    }

    /// Stop, disable, delete and reload; safe to repeat.
    pub fn uninstall_unit(&self, ctx: &ExecutionContext, name: &str) -> SetupResult<Report> {
        run_plan(ctx, self.uninstall_steps(name), None)
    }

    fn systemctl(&self, args: &[&str], action: &str, unit: &str) -> SetupResult<()> {
        let result = self.runner.run(&self.systemctl, args)?;
        if !result.success {
            warn!(
                unit = %unit,
                action = %action,
                exit_code = ?result.exit_code,
                stderr = %result.stderr.trim(),
                "systemctl request rejected"
            );
            return Err(SetupError::Supervision {
                action: action.to_string(),
                unit: unit.to_string(),
                message: sanitize_output(result.diagnostic(), 5),
            });
        }
        Ok(())
    }
}
