//! Service unit definition and rendering.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::Settings;
use crate::error::SetupError;
use crate::templates::{TemplateEngine, UNIT_TEMPLATE};
use crate::validation::validate_unit_name;

/// systemd `Restart=` policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    No,
    #[default]
    Always,
    OnFailure,
    OnAbnormal,
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            RestartPolicy::No => "no",
            RestartPolicy::Always => "always",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::OnAbnormal => "on-abnormal",
        };
        f.write_str(value)
    }
}

/// Everything needed to render one service unit file.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitDefinition {
    pub name: String,
    pub description: String,
    pub after: String,
    pub wanted_by: String,
    /// Full `ExecStart=` value, already escaped for systemd.
    pub exec_start: String,
    pub working_directory: PathBuf,
    /// `KEY=value` pairs.
    pub environment: Vec<String>,
    pub restart: RestartPolicy,
    pub restart_sec: u32,
    pub user: String,
}

impl UnitDefinition {
    /// Build the sensor service definition from settings.
    ///
    /// The service runs the sensor reader on the configured GPIO pin and
    /// pipes its output into the forwarder.
    pub fn from_settings(settings: &Settings) -> Result<Self, SetupError> {
        validate_unit_name(&settings.unit.name)?;

        let sensor = &settings.sensor;
        let pipeline = format!(
            "{} {} {} | {} {}",
            shell_quote_path(&sensor.binary),
            sensor.gpio,
            shell_quote_path(&sensor.log_file),
            shell_quote_path(&sensor.forwarder_interpreter),
            shell_quote_path(&sensor.forwarder),
        );

        let mut environment = Vec::new();
        if let Some(token_file) = &sensor.token_file {
            environment.push(format!("F007TH_TOKEN_FILE={}", token_file.display()));
        }
        if let Some(url) = &sensor.server_url {
            environment.push(format!("F007TH_SERVER_URL={}", url));
        }

        Ok(Self {
            name: settings.unit.name.clone(),
            description: settings.unit.description.clone(),
            after: settings.unit.after.clone(),
            wanted_by: settings.unit.wanted_by.clone(),
            exec_start: format!("/bin/sh -c \"{}\"", escape_exec_quoted(&pipeline)),
            working_directory: settings.unit.working_directory.clone(),
            environment,
            restart: settings.unit.restart,
            restart_sec: settings.unit.restart_sec,
            user: settings.unit.user.clone(),
        })
    }

    /// Render the unit file text.
    pub fn render(&self, engine: &TemplateEngine) -> Result<String, SetupError> {
        for (field, value) in [
            ("description", self.description.as_str()),
            ("after", self.after.as_str()),
            ("wanted_by", self.wanted_by.as_str()),
            ("user", self.user.as_str()),
            ("exec_start", self.exec_start.as_str()),
        ] {
            reject_newlines(field, value)?;
        }
        reject_newlines(
            "working_directory",
            &self.working_directory.display().to_string(),
        )?;
        for entry in &self.environment {
            reject_newlines("environment", entry)?;
        }

        let environment: Vec<String> = self
            .environment
            .iter()
            .map(|entry| escape_systemd_quoted(entry))
            .collect();

        let context = serde_json::json!({
            "description": self.description,
            "after": self.after,
            "wanted_by": self.wanted_by,
            "exec_start": self.exec_start,
            "working_directory": self.working_directory.display().to_string(),
            "environment": environment,
            "restart": self.restart.to_string(),
            "restart_sec": self.restart_sec,
            "user": self.user,
        });

        engine.render(UNIT_TEMPLATE, &context)
    }
}

fn reject_newlines(field: &str, value: &str) -> Result<(), SetupError> {
    if value.contains(['\n', '\r']) {
        return Err(SetupError::Validation {
            kind: crate::error::ValidationErrorKind::InvalidParameter {
                param: field.to_string(),
                message: "Unit file values cannot span lines".to_string(),
            },
        });
    }
    Ok(())
}

/// Quote a path for `/bin/sh` when it contains anything beyond a safe set.
fn shell_quote_path(path: &Path) -> String {
    let raw = path.display().to_string();
    let safe = !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | '+' | ':'));
    if safe {
        raw
    } else {
        format!("'{}'", raw.replace('\'', r"'\''"))
    }
}

/// Escape text placed inside a double-quoted systemd value.
///
/// Backslashes and quotes are escaped and `%` specifiers doubled. systemd
/// does not expand `$` in `Environment=`, so it is left alone here.
fn escape_systemd_quoted(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '%' => escaped.push_str("%%"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Like [`escape_systemd_quoted`], plus `$$` for the variable expansion
/// `ExecStart=` performs.
fn escape_exec_quoted(value: &str) -> String {
    escape_systemd_quoted(value).replace('$', "$$")
}
