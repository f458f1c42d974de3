use crate::error::{AppError, Result};
use crate::paths;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    AlreadyInstalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallOutcome {
    Restored,
    NotInstalled,
}

#[derive(Debug, Serialize, Deserialize)]
struct InstallMarker {
    original: PathBuf,
    wrapper: PathBuf,
    installed_at: chrono::DateTime<Utc>,
}

/// Replaces the `torero` binary with the capture wrapper, keeping the
/// original next to it.
///
/// Layout after install:
///
/// ```text
/// /usr/local/bin/torero                      <- copy of torero-capture
/// /usr/local/bin/torero.orig                 <- the real binary
/// /usr/local/bin/.torero-capture-installed   <- marker (JSON)
/// ```
#[derive(Debug, Clone)]
pub struct WrapperInstall {
    target: PathBuf,
    original: PathBuf,
    marker: PathBuf,
}

impl WrapperInstall {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        let target = target.into();
        Self {
            original: paths::original_binary_for(&target),
            marker: paths::install_marker_for(&target),
            target,
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn original(&self) -> &Path {
        &self.original
    }

    pub fn is_installed(&self) -> bool {
        self.marker.is_file()
    }

    /// The binary a wrapper installed at the target must run: the original
    /// recorded in the marker, or `<target>.orig` without a readable marker.
    pub fn real_binary(&self) -> PathBuf {
        std::fs::read(&self.marker)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<InstallMarker>(&bytes).ok())
            .map(|marker| marker.original)
            .unwrap_or_else(|| self.original.clone())
    }

    pub fn install(&self, wrapper: &Path) -> Result<InstallOutcome> {
        if self.is_installed() {
            tracing::info!("capture wrapper already installed at {}", self.target.display());
            return Ok(InstallOutcome::AlreadyInstalled);
        }
        if !self.target.is_file() {
            return Err(AppError::Wrapper(format!(
                "{} does not exist",
                self.target.display()
            )));
        }
        if !wrapper.is_file() {
            return Err(AppError::Wrapper(format!(
                "wrapper binary {} does not exist",
                wrapper.display()
            )));
        }
        if self.original.exists() {
            return Err(AppError::Wrapper(format!(
                "{} exists without an install marker; restore it manually",
                self.original.display()
            )));
        }

        std::fs::rename(&self.target, &self.original)?;
        if let Err(e) = self.place_wrapper(wrapper) {
            tracing::error!("wrapper install failed, restoring original: {}", e);
            std::fs::rename(&self.original, &self.target)?;
            return Err(e);
        }

        tracing::info!(
            "installed capture wrapper at {} (original kept at {})",
            self.target.display(),
            self.original.display()
        );
        Ok(InstallOutcome::Installed)
    }

    pub fn uninstall(&self) -> Result<UninstallOutcome> {
        if !self.is_installed() {
            return Ok(UninstallOutcome::NotInstalled);
        }
        if !self.original.is_file() {
            return Err(AppError::Wrapper(format!(
                "install marker present but {} is missing",
                self.original.display()
            )));
        }

        std::fs::rename(&self.original, &self.target)?;
        std::fs::remove_file(&self.marker)?;
        tracing::info!("restored original torero at {}", self.target.display());
        Ok(UninstallOutcome::Restored)
    }

    fn place_wrapper(&self, wrapper: &Path) -> Result<()> {
        let dir = self
            .target
            .parent()
            .ok_or_else(|| AppError::Wrapper("target has no parent directory".to_string()))?;

        // Same directory so the final rename is atomic.
        let staged = tempfile::NamedTempFile::new_in(dir)?;
        std::fs::copy(wrapper, staged.path())?;
        set_executable(staged.path())?;
        staged
            .persist(&self.target)
            .map_err(|e| AppError::Io(e.error))?;

        let marker = InstallMarker {
            original: self.original.clone(),
            wrapper: wrapper.to_path_buf(),
            installed_at: Utc::now(),
        };
        if let Err(e) = std::fs::write(&self.marker, serde_json::to_vec_pretty(&marker)?) {
            let _ = std::fs::remove_file(&self.target);
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}
