use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libloading::Library;
use log::debug;

use crate::capability::bundle::PluginBundle;
use crate::capability::manifest::PluginManifest;
use crate::lifecycle::error::{PluginSystemError, Result};

/// Exports surfaced by a resolved plugin module.
///
/// Field order is load-bearing: the export fields must drop before
/// `library`, since bundle vtables may point into the mapped module.
pub struct ModuleExports {
    /// The module's default export, if it has one.
    pub default_export: Option<Arc<PluginBundle>>,

    /// Remaining named exports, in declaration order.
    pub named_exports: Vec<(String, Arc<PluginBundle>)>,

    /// Backing dynamic library, kept alive for as long as any export is.
    pub library: Option<Arc<Library>>,
}

/// Resolves an installed plugin's entry module into its exports.
///
/// Implementations never crash the host: an import failure — missing file,
/// bad image, panicking entry — comes back as [`PluginSystemError::Load`].
#[async_trait]
pub trait BundleResolver: Send + Sync {
    async fn resolve(&self, manifest: &PluginManifest, dir: &Path) -> Result<ModuleExports>;
}

/// Pick the bundle to load from a module's exports: the default export
/// first, then named exports in order; the first candidate that passes
/// strict shape validation wins.
pub fn select_bundle(plugin: &str, exports: &ModuleExports) -> Result<Arc<PluginBundle>> {
    let mut first_failure: Option<String> = None;

    let candidates = exports
        .default_export
        .iter()
        .map(|bundle| ("default", bundle))
        .chain(
            exports
                .named_exports
                .iter()
                .map(|(name, bundle)| (name.as_str(), bundle)),
        );

    for (export, bundle) in candidates {
        match bundle.validate() {
            Ok(()) => {
                debug!("plugin '{}' bundle taken from export '{}'", plugin, export);
                return Ok(Arc::clone(bundle));
            }
            Err(e) => {
                if first_failure.is_none() {
                    first_failure = Some(format!("export '{}': {}", export, e));
                }
            }
        }
    }

    Err(PluginSystemError::InvalidPluginExport {
        plugin: plugin.to_string(),
        detail: first_failure.unwrap_or_else(|| "module has no exports".to_string()),
    })
}
