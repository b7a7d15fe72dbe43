//! systemd's view of a unit, as reported by `systemctl show`.

use std::path::{Path, PathBuf};

/// Properties requested from `systemctl show`.
pub const SHOWN_PROPERTIES: &str = "--property=LoadState,ActiveState,FragmentPath,NeedDaemonReload";

/// The subset of unit properties the lifecycle decides on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitProperties {
    /// `loaded`, `not-found`, `masked`, ...
    pub load_state: String,
    /// `active`, `activating`, `inactive`, `failed`, ...
    pub active_state: String,
    /// Unit file systemd loaded the unit from, if any.
    pub fragment_path: Option<PathBuf>,
    pub need_daemon_reload: bool,
}

impl UnitProperties {
    /// Parse `Key=value` lines; unknown keys are ignored.
    pub fn parse(output: &str) -> Self {
        let mut props = Self::default();
        for line in output.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "LoadState" => props.load_state = value.to_string(),
                "ActiveState" => props.active_state = value.to_string(),
                "FragmentPath" if !value.is_empty() => {
                    props.fragment_path = Some(PathBuf::from(value))
                }
                "NeedDaemonReload" => props.need_daemon_reload = value == "yes",
                _ => {}
            }
        }
        props
    }

    pub fn is_active(&self) -> bool {
        self.active_state == "active"
    }

    /// Whether a stop request has anything to act on.
    ///
    /// `activating` covers a `Restart=always` unit waiting to restart.
    pub fn is_running(&self) -> bool {
        !matches!(self.active_state.as_str(), "" | "inactive" | "failed" | "unknown")
    }

    /// Whether systemd still holds a definition loaded from `unit_path`
    /// although that file is gone.
    pub fn is_stale(&self, unit_path: &Path) -> bool {
        if self.need_daemon_reload {
            return true;
        }
        self.load_state != "not-found"
            && self.fragment_path.as_deref() == Some(unit_path)
            && !unit_path.exists()
    }
}
