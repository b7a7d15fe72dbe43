//! Unit name validation.
//!
//! Unit names become file names under the unit directory and arguments to
//! systemctl, so only the systemd unit-name alphabet is accepted.

use crate::error::{SetupError, ValidationErrorKind};

/// systemd's limit on unit name length.
const MAX_UNIT_NAME_LEN: usize = 255;

/// Unit type suffixes this tool can install.
const ALLOWED_SUFFIXES: &[&str] = &[".service"];

/// Validate a service unit name.
///
/// # Example
///
/// ```
/// use f007th_setup::validation::validate_unit_name;
///
/// assert!(validate_unit_name("f007th.service").is_ok());
/// assert!(validate_unit_name("../f007th.service").is_err());
/// ```
pub fn validate_unit_name(name: &str) -> Result<(), SetupError> {
    let invalid = || SetupError::Validation {
        kind: ValidationErrorKind::InvalidUnitName {
            name: name.to_string(),
        },
    };

    if name.is_empty() || name.len() > MAX_UNIT_NAME_LEN {
        return Err(invalid());
    }

    let Some(stem) = ALLOWED_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
    else {
        return Err(invalid());
    };

    if stem.is_empty() || stem.starts_with('.') {
        return Err(invalid());
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '.' | '@' | '-'))
    {
        return Err(invalid());
    }

    Ok(())
}
