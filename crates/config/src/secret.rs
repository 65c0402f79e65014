//! Opaque secret strings and their sources
//!
//! A secret field holds either the literal value or a reference:
//! - `env:NAME` reads the environment variable `NAME`
//! - `file:/path/to/secret` reads the file, trimming surrounding whitespace
//!
//! Secret values never appear in `Debug` output.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const ENV_PREFIX: &str = "env:";
const FILE_PREFIX: &str = "file:";

/// A credential value that must not leak into logs
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value. Call [`Secret::resolve`] first for `env:`/`file:` references.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Follow an `env:` or `file:` reference; literals are returned unchanged
    pub fn resolve(&self) -> Result<Secret, String> {
        let raw = self.0.trim();

        if let Some(var_name) = raw.strip_prefix(ENV_PREFIX) {
            return load_from_env(var_name.trim()).map(Secret);
        }

        if let Some(path) = raw.strip_prefix(FILE_PREFIX) {
            return load_from_file(Path::new(path.trim())).map(Secret);
        }

        Ok(self.clone())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("Secret(\"\")")
        } else {
            f.write_str("Secret(***)")
        }
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

fn load_from_env(var_name: &str) -> Result<String, String> {
    let value = std::env::var(var_name)
        .map_err(|_| format!("environment variable '{}' not set", var_name))?;

    let value = value.trim();
    if value.is_empty() {
        return Err(format!("environment variable '{}' is empty", var_name));
    }

    debug!(var = %var_name, "Loaded secret from environment");
    Ok(value.to_string())
}

fn load_from_file(path: &Path) -> Result<String, String> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path)
            .map_err(|e| format!("failed to read '{}': {}", path.display(), e))?;
        let file_mode = metadata.permissions().mode() & 0o777;

        // Only the owner should be able to read secrets (0600 or 0400)
        if file_mode & 0o077 != 0 {
            warn!(
                path = %path.display(),
                mode = format!("{:o}", file_mode),
                "Secret file has overly permissive permissions (should be 0600 or 0400)"
            );
        }
    }

    let content = fs::read_to_string(path)
        .map_err(|e| format!("failed to read '{}': {}", path.display(), e))?;

    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(format!("secret file '{}' is empty", path.display()));
    }

    debug!(path = %path.display(), "Loaded secret from file");
    Ok(trimmed.to_string())
}
