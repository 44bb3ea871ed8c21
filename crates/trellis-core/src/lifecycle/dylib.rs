use std::panic;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libloading::{Library, Symbol};
use log::debug;

use crate::capability::bundle::PluginBundle;
use crate::capability::manifest::PluginManifest;
use crate::lifecycle::error::{PluginSystemError, Result};
use crate::lifecycle::loader::{BundleResolver, ModuleExports};

/// Symbol every dylib plugin exports: constructs its bundle on the heap and
/// hands ownership to the host.
pub const PLUGIN_ENTRY_SYMBOL: &[u8] = b"trellis_plugin_create";

/// Signature of the plugin entry symbol. The bundle crosses the boundary as
/// a Rust type: plugins must be built with the same toolchain and
/// trellis-core version as the host.
pub type PluginEntryFn = unsafe extern "C-unwind" fn() -> *mut PluginBundle;

/// Default [`BundleResolver`] for plugins shipped as dynamic libraries.
///
/// The entry file comes from the descriptor (`lib<name>.so` when
/// undeclared). A failed open, missing symbol, panicking or null-returning
/// entry all surface as load errors; none of them take the host down.
#[derive(Debug, Default)]
pub struct DylibResolver;

#[async_trait]
impl BundleResolver for DylibResolver {
    async fn resolve(&self, manifest: &PluginManifest, dir: &Path) -> Result<ModuleExports> {
        let entry_path = dir.join(manifest.entry_file());
        let plugin = manifest.name.as_str();

        let library = unsafe { Library::new(&entry_path) }.map_err(|e| {
            PluginSystemError::load(
                plugin,
                format!("could not open module '{}'", entry_path.display()),
                Some(Box::new(e)),
            )
        })?;

        let entry_fn = {
            let symbol: Symbol<'_, PluginEntryFn> =
                unsafe { library.get(PLUGIN_ENTRY_SYMBOL) }.map_err(|e| {
                    PluginSystemError::load(
                        plugin,
                        "entry symbol `trellis_plugin_create` not found",
                        Some(Box::new(e)),
                    )
                })?;
            *symbol
        };

        let raw = panic::catch_unwind(|| unsafe { entry_fn() })
            .map_err(|_| PluginSystemError::load(plugin, "plugin entry panicked", None))?;
        if raw.is_null() {
            return Err(PluginSystemError::load(
                plugin,
                "plugin entry returned a null bundle",
                None,
            ));
        }
        let bundle: Arc<PluginBundle> = unsafe { Arc::from(Box::from_raw(raw)) };

        debug!(
            "resolved dylib bundle '{}' from {}",
            bundle.name,
            entry_path.display()
        );
        Ok(ModuleExports {
            default_export: Some(bundle),
            named_exports: Vec::new(),
            library: Some(Arc::new(library)),
        })
    }
}
