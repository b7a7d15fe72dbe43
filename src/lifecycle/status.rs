//! Lifecycle state derived from live host queries.

use std::fmt;

use serde::Serialize;

/// Where the module + unit pair stands, furthest stage first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Absent,
    BootConfigured,
    Loaded,
    UnitInstalled,
    Active,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            LifecycleState::Absent => "absent",
            LifecycleState::BootConfigured => "boot-configured",
            LifecycleState::Loaded => "loaded",
            LifecycleState::UnitInstalled => "unit-installed",
            LifecycleState::Active => "active",
        };
        f.write_str(value)
    }
}

/// Raw facts gathered for `status`, plus the derived state.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleStatus {
    pub state: LifecycleState,
    pub unit: String,
    pub module: String,
    pub unit_file_present: bool,
    pub unit_enabled: bool,
    pub unit_active: bool,
    pub module_loaded: bool,
    pub boot_configured: bool,
    pub params_present: bool,
}

impl LifecycleStatus {
    /// The furthest stage whose evidence is present.
    pub fn derive_state(
        unit_active: bool,
        unit_file_present: bool,
        module_loaded: bool,
        boot_configured: bool,
        params_present: bool,
    ) -> LifecycleState {
        if unit_active {
            LifecycleState::Active
        } else if unit_file_present {
            LifecycleState::UnitInstalled
        } else if module_loaded {
            LifecycleState::Loaded
        } else if boot_configured || params_present {
            LifecycleState::BootConfigured
        } else {
            LifecycleState::Absent
        }
    }
}
