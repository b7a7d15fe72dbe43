//! Kernel module name and parameter validation.

use crate::error::{SetupError, ValidationErrorKind};

/// Validate a kernel module name.
///
/// Names end up as a line in the boot module list and as a file name in
/// the modprobe options directory.
pub fn validate_module_name(name: &str) -> Result<(), SetupError> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(SetupError::Validation {
            kind: ValidationErrorKind::InvalidModuleName {
                name: name.to_string(),
            },
        });
    }

    Ok(())
}

/// Validate a single `key=value` module parameter.
///
/// Both halves must fit on one `options` line without splitting into
/// extra parameters.
pub fn validate_module_param(key: &str, value: &str) -> Result<(), SetupError> {
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(SetupError::Validation {
            kind: ValidationErrorKind::InvalidParameter {
                param: key.to_string(),
                message: "Parameter names may only contain letters, digits and '_'".to_string(),
            },
        });
    }

    if value.is_empty() {
        return Err(SetupError::Validation {
            kind: ValidationErrorKind::InvalidParameter {
                param: key.to_string(),
                message: "Value cannot be empty".to_string(),
            },
        });
    }

    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(SetupError::Validation {
            kind: ValidationErrorKind::InvalidParameter {
                param: key.to_string(),
                message: "Value cannot contain whitespace or control characters".to_string(),
            },
        });
    }

    Ok(())
}
