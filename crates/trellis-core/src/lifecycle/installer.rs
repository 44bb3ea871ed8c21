use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use tokio::fs;

use crate::capability::manifest::{self, PluginManifest};
use crate::capability::traits::CapabilityError;
use crate::lifecycle::error::{PluginSystemError, Result};

/// External package-fetch collaborator: materializes a plugin's files under
/// the destination directory. `Ok(false)` means the package could not be
/// fetched without a harder error to report.
#[async_trait]
pub trait PackageFetcher: Send + Sync {
    async fn fetch(
        &self,
        name: &str,
        dest: &Path,
        version: Option<&str>,
    ) -> std::result::Result<bool, CapabilityError>;
}

/// Map a requested plugin name onto a safe directory name: every character
/// outside `[A-Za-z0-9_-]` becomes `_`. Deterministic, so repeated installs
/// of one name always land in the same place.
pub fn sanitize_dir_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Fetches plugin bundles into the per-agent install root and gates each on
/// a valid descriptor. Creates no registry entries itself; the manager owns
/// those.
pub struct PluginInstaller {
    install_root: PathBuf,
    fetcher: Arc<dyn PackageFetcher>,
}

/// Outcome of a successful install: the parsed descriptor and where the
/// plugin's files landed.
#[derive(Debug)]
pub struct InstalledPlugin {
    pub manifest: PluginManifest,
    pub install_path: PathBuf,
}

impl PluginInstaller {
    pub fn new(install_root: PathBuf, fetcher: Arc<dyn PackageFetcher>) -> Self {
        Self {
            install_root,
            fetcher,
        }
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    /// Directory a plugin of this requested name installs into.
    pub fn install_path_for(&self, name: &str) -> PathBuf {
        self.install_root.join(sanitize_dir_name(name))
    }

    /// Fetch and validate one plugin. On any failure the caller sees an
    /// error and no record is created; a partially materialized directory
    /// may remain on disk but is never tracked.
    pub async fn install(&self, name: &str, version: Option<&str>) -> Result<InstalledPlugin> {
        fs::create_dir_all(&self.install_root)
            .await
            .map_err(|e| PluginSystemError::FetchFailed {
                name: name.to_string(),
                message: format!(
                    "could not prepare install root '{}': {}",
                    self.install_root.display(),
                    e
                ),
            })?;

        let dest = self.install_path_for(name);
        let fetched = self
            .fetcher
            .fetch(name, &dest, version)
            .await
            .map_err(|e| PluginSystemError::FetchFailed {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        if !fetched {
            return Err(PluginSystemError::FetchFailed {
                name: name.to_string(),
                message: "package fetcher reported failure".to_string(),
            });
        }

        let manifest = manifest::parse_manifest(&dest).await?;
        info!(
            "installed plugin '{}' ({}) at {}",
            manifest.name,
            manifest.version,
            dest.display()
        );
        Ok(InstalledPlugin {
            manifest,
            install_path: dest,
        })
    }
}
