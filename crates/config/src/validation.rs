//! Field validators and mapping of `validator` failures onto [`ConfigError`]

use std::borrow::Cow;
use std::path::Path;

use validator::{ValidationError, ValidationErrors};

use crate::error::ConfigError;
use crate::secret::Secret;

/// Error code reported for empty required fields
pub const BLANK_CODE: &str = "blank";

// ============================================================================
// Field Validators
// ============================================================================

/// Reject empty or whitespace-only strings
pub fn validate_non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(blank());
    }
    Ok(())
}

/// Reject empty secrets
///
/// `env:`/`file:` references count as present here; they are resolved
/// (and checked for emptiness) afterwards.
pub fn validate_secret(value: &Secret) -> Result<(), ValidationError> {
    if value.is_blank() {
        return Err(blank());
    }
    Ok(())
}

/// Require an absolute `http://` or `https://` URL
pub fn validate_http_url(value: &str) -> Result<(), ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(blank());
    }

    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));

    match rest {
        Some(host) if !host.is_empty() && !host.starts_with('/') => Ok(()),
        _ => {
            let mut err = ValidationError::new("invalid_url");
            err.message = Some(Cow::Owned(format!(
                "Invalid URL '{}'. Expected an absolute http:// or https:// URL",
                value
            )));
            Err(err)
        }
    }
}

/// Reject empty paths
pub fn validate_path(value: &Path) -> Result<(), ValidationError> {
    if value.as_os_str().is_empty() {
        return Err(blank());
    }
    Ok(())
}

fn blank() -> ValidationError {
    let mut err = ValidationError::new(BLANK_CODE);
    err.message = Some(Cow::Borrowed("must not be empty"));
    err
}

// ============================================================================
// Error Mapping
// ============================================================================

/// Turn `validator` output into a [`ConfigError`] naming one field
///
/// Fields are reported by their camelCase document name. When several fields
/// fail, the alphabetically first one is reported so the result is stable.
pub fn to_config_error(provider: &str, errors: &ValidationErrors) -> ConfigError {
    let mut failures: Vec<(String, &ValidationError)> = errors
        .field_errors()
        .into_iter()
        .filter_map(|(field, errs)| errs.first().map(|e| (field.to_string(), e)))
        .collect();
    failures.sort_by(|a, b| a.0.cmp(&b.0));

    let Some((field, error)) = failures.into_iter().next() else {
        return ConfigError::Parse {
            provider: provider.to_string(),
            message: errors.to_string(),
        };
    };

    let field = to_camel_case(&field);
    if error.code == BLANK_CODE {
        ConfigError::MissingField {
            provider: provider.to_string(),
            field,
        }
    } else {
        ConfigError::InvalidField {
            provider: provider.to_string(),
            field,
            message: error
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| error.code.to_string()),
        }
    }
}

fn to_camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
