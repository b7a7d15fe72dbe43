//! Configuration settings for the setup tool.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::SetupError;
use crate::unit::RestartPolicy;
use crate::validation::{validate_module_name, validate_module_param, validate_unit_name};

/// Default location of the optional configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/f007th/setup.toml";

/// Main configuration structure.
///
/// Every field has a default, so an empty file (or no file at all) yields
/// the stock Raspberry Pi layout.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub unit: UnitConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub module: ModuleConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    /// Refuse to mutate host state unless running as root.
    #[serde(default = "default_require_root")]
    pub require_root: bool,
}

/// Service unit configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UnitConfig {
    /// Unit file name (e.g., "f007th.service").
    #[serde(default = "default_unit_name")]
    pub name: String,
    #[serde(default = "default_description")]
    pub description: String,
    /// Target the unit is ordered after.
    #[serde(default = "default_target")]
    pub after: String,
    /// Target that pulls the unit in when enabled.
    #[serde(default = "default_target")]
    pub wanted_by: String,
    /// Account the service runs as.
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_working_directory")]
    pub working_directory: PathBuf,
    #[serde(default)]
    pub restart: RestartPolicy,
    #[serde(default = "default_restart_sec")]
    pub restart_sec: u32,
}

/// The sensor reader and forwarder pipeline run by the unit.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    /// Precompiled sensor reader executable.
    #[serde(default = "default_sensor_binary")]
    pub binary: PathBuf,
    /// GPIO pin the receiver is wired to.
    #[serde(default = "default_gpio")]
    pub gpio: u32,
    /// Log file handed to the sensor reader.
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    /// Forwarder script consuming the reader's output.
    #[serde(default = "default_forwarder")]
    pub forwarder: PathBuf,
    #[serde(default = "default_forwarder_interpreter")]
    pub forwarder_interpreter: PathBuf,
    /// File holding the forwarder's bearer token.
    pub token_file: Option<PathBuf>,
    /// Endpoint the forwarder submits readings to.
    pub server_url: Option<String>,
}

/// Kernel module dependency.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleConfig {
    #[serde(default = "default_module_name")]
    pub name: String,
    /// Module parameters. When empty, `gpios` follows `sensor.gpio`.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// Host paths the tool reads and writes.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Directory holding service unit files.
    #[serde(default = "default_unit_dir")]
    pub unit_dir: PathBuf,
    /// Boot-time module list, one module per line.
    #[serde(default = "default_modules_load_file")]
    pub modules_load_file: PathBuf,
    /// Directory of modprobe option files.
    #[serde(default = "default_modprobe_dir")]
    pub modprobe_dir: PathBuf,
    /// Loaded-module registry.
    #[serde(default = "default_proc_modules")]
    pub proc_modules: PathBuf,
    /// Optional directory of `*.tera` templates overriding the built-in unit template.
    pub templates_dir: Option<PathBuf>,
}

/// External tool names.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_systemctl")]
    pub systemctl: String,
    #[serde(default = "default_modprobe")]
    pub modprobe: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Limits configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Timeout applied to every external tool invocation.
    #[serde(default = "default_timeout")]
    pub command_timeout_seconds: u64,
}

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_audit_log_path")]
    pub log_path: PathBuf,
}

// Default value functions
fn default_require_root() -> bool {
    true
}

fn default_unit_name() -> String {
    "f007th.service".to_string()
}

fn default_description() -> String {
    "F007TH temperature sensor reader and forwarder".to_string()
}

fn default_target() -> String {
    "multi-user.target".to_string()
}

fn default_user() -> String {
    "pi".to_string()
}

fn default_working_directory() -> PathBuf {
    PathBuf::from("/home/pi/f007th")
}

fn default_restart_sec() -> u32 {
    5
}

fn default_sensor_binary() -> PathBuf {
    PathBuf::from("/home/pi/f007th/f007th-send")
}

fn default_gpio() -> u32 {
    17
}

fn default_log_file() -> PathBuf {
    PathBuf::from("/home/pi/f007th/f007th.log")
}

fn default_forwarder() -> PathBuf {
    PathBuf::from("/home/pi/f007th/forwarder.py")
}

fn default_forwarder_interpreter() -> PathBuf {
    PathBuf::from("/usr/bin/python3")
}

fn default_module_name() -> String {
    "gpio_ts".to_string()
}

fn default_unit_dir() -> PathBuf {
    PathBuf::from("/etc/systemd/system")
}

fn default_modules_load_file() -> PathBuf {
    PathBuf::from("/etc/modules")
}

fn default_modprobe_dir() -> PathBuf {
    PathBuf::from("/etc/modprobe.d")
}

fn default_proc_modules() -> PathBuf {
    PathBuf::from("/proc/modules")
}

fn default_systemctl() -> String {
    "systemctl".to_string()
}

fn default_modprobe() -> String {
    "modprobe".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_audit_log_path() -> PathBuf {
    PathBuf::from("/var/log/f007th/setup-audit.log")
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            name: default_unit_name(),
            description: default_description(),
            after: default_target(),
            wanted_by: default_target(),
            user: default_user(),
            working_directory: default_working_directory(),
            restart: RestartPolicy::default(),
            restart_sec: default_restart_sec(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            binary: default_sensor_binary(),
            gpio: default_gpio(),
            log_file: default_log_file(),
            forwarder: default_forwarder(),
            forwarder_interpreter: default_forwarder_interpreter(),
            token_file: None,
            server_url: None,
        }
    }
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            name: default_module_name(),
            params: BTreeMap::new(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            unit_dir: default_unit_dir(),
            modules_load_file: default_modules_load_file(),
            modprobe_dir: default_modprobe_dir(),
            proc_modules: default_proc_modules(),
            templates_dir: None,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            systemctl: default_systemctl(),
            modprobe: default_modprobe(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            command_timeout_seconds: default_timeout(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_path: default_audit_log_path(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            unit: UnitConfig::default(),
            sensor: SensorConfig::default(),
            module: ModuleConfig::default(),
            paths: PathsConfig::default(),
            tools: ToolsConfig::default(),
            logging: LoggingConfig::default(),
            limits: LimitsConfig::default(),
            audit: AuditConfig::default(),
            require_root: default_require_root(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SetupError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SetupError::Config {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        Self::from_toml(&content).map_err(|e| match e {
            SetupError::Config { message } => SetupError::Config {
                message: format!("{} ({})", message, path.display()),
            },
            other => other,
        })
    }

    /// Load an explicit config file, or the default one if present, or built-in defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, SetupError> {
        match explicit {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, SetupError> {
        let settings: Settings = toml::from_str(content).map_err(|e| SetupError::Config {
            message: format!("Failed to parse config: {}", e),
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// Module parameters to persist and load with.
    ///
    /// Falls back to `gpios=<sensor.gpio>` when none are configured.
    pub fn module_params(&self) -> BTreeMap<String, String> {
        if self.module.params.is_empty() {
            let mut params = BTreeMap::new();
            params.insert("gpios".to_string(), self.sensor.gpio.to_string());
            params
        } else {
            self.module.params.clone()
        }
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), SetupError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(SetupError::Config {
                message: format!(
                    "Invalid log level '{}'. Valid levels: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(SetupError::Config {
                message: format!(
                    "Invalid log format '{}'. Valid formats: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        if self.limits.command_timeout_seconds == 0 {
            return Err(SetupError::Config {
                message: "command_timeout_seconds must be greater than zero".to_string(),
            });
        }

        validate_unit_name(&self.unit.name)?;
        validate_module_name(&self.module.name)?;
        for (key, value) in &self.module_params() {
            validate_module_param(key, value)?;
        }

        Ok(())
    }
}
