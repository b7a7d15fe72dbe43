//! Input validation module.
//!
//! Provides validators for unit names, kernel module names and module parameters.

mod module_name;
mod unit_name;

pub use module_name::{validate_module_name, validate_module_param};
pub use unit_name::validate_unit_name;
