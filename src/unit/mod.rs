//! Service unit management.
//!
//! Renders the sensor service definition, writes it to the unit directory
//! and registers it with systemd. Removal reverses each step and tolerates
//! a unit that is already stopped, disabled or gone.

mod definition;
mod manager;
mod properties;

pub use definition::{RestartPolicy, UnitDefinition};
pub use manager::UnitManager;
pub use properties::UnitProperties;
