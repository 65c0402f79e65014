//! Local filesystem deploy target
//!
//! Writes the chain and key next to their destinations as temp files, then
//! renames both into place, so readers never see a half-written file. The
//! key file is created with mode 0600 on Unix.
//!
//! The key is renamed first. If the certificate rename then fails, the
//! previous key is put back (or the new key removed when there was none), so
//! the pair on disk always matches.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::deploy::material::CertificateMaterial;
use crate::deploy::provider::{DeployError, DeployTarget, DeploymentResult};

/// Certificate and key files on this host
#[derive(Debug, Clone)]
pub struct LocalTarget {
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl LocalTarget {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }
}

#[async_trait]
impl DeployTarget for LocalTarget {
    fn name(&self) -> &'static str {
        "local"
    }

    fn target(&self) -> String {
        self.cert_path.display().to_string()
    }

    async fn install(&self, material: &CertificateMaterial) -> Result<DeploymentResult, DeployError> {
        let cert_path = self.cert_path.clone();
        let key_path = self.key_path.clone();
        let certificate = format!("{}\n", material.certificate_pem());
        let private_key = format!("{}\n", material.private_key_pem());

        tokio::task::spawn_blocking(move || {
            let staged_cert = stage(&cert_path, certificate.as_bytes(), false)?;
            let staged_key = stage(&key_path, private_key.as_bytes(), true)?;
            let previous_key = backup(&key_path)?;

            staged_key
                .persist(&key_path)
                .map_err(|e| io_error(&key_path, e.error))?;
            if let Err(e) = staged_cert.persist(&cert_path) {
                restore_key(&key_path, previous_key);
                return Err(io_error(&cert_path, e.error));
            }
            Ok::<_, DeployError>(())
        })
        .await
        .map_err(|e| DeployError::Deployment(format!("file writer task failed: {}", e)))??;

        debug!(
            cert_path = %self.cert_path.display(),
            key_path = %self.key_path.display(),
            "Certificate files written"
        );

        Ok(DeploymentResult::new(self.name())
            .with_metadata("certPath", self.cert_path.display().to_string())
            .with_metadata("keyPath", self.key_path.display().to_string())
            .with_metadata("fingerprint", material.fingerprint()))
    }
}

/// Write `contents` to a temp file in the destination's directory
fn stage(destination: &Path, contents: &[u8], private: bool) -> Result<NamedTempFile, DeployError> {
    let dir = match destination.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;

    let mut staged = NamedTempFile::new_in(&dir).map_err(|e| io_error(&dir, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = if private { 0o600 } else { 0o644 };
        staged
            .as_file()
            .set_permissions(std::fs::Permissions::from_mode(mode))
            .map_err(|e| io_error(destination, e))?;
    }
    #[cfg(not(unix))]
    let _ = private;

    staged
        .write_all(contents)
        .and_then(|_| staged.as_file().sync_all())
        .map_err(|e| io_error(destination, e))?;
    Ok(staged)
}

/// Stage a copy of the current key, if any
fn backup(key_path: &Path) -> Result<Option<NamedTempFile>, DeployError> {
    match std::fs::read(key_path) {
        Ok(contents) => stage(key_path, &contents, true).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(key_path, e)),
    }
}

fn restore_key(key_path: &Path, previous: Option<NamedTempFile>) {
    let restored = match previous {
        Some(staged) => staged.persist(key_path).map(|_| ()).map_err(|e| e.error),
        None => std::fs::remove_file(key_path),
    };
    if let Err(e) = restored {
        warn!(
            key_path = %key_path.display(),
            error = %e,
            "Failed to roll back private key after certificate write failed"
        );
    }
}

fn io_error(path: &Path, err: std::io::Error) -> DeployError {
    match err.kind() {
        std::io::ErrorKind::PermissionDenied => {
            DeployError::Authentication(format!("{}: {}", path.display(), err))
        }
        _ => DeployError::Deployment(format!("{}: {}", path.display(), err)),
    }
}
