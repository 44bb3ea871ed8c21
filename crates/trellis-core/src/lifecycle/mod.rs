//! # Plugin Lifecycle
//!
//! The core of this crate: everything between "install this plugin" and
//! "that plugin no longer touches the host".
//!
//! ## Key Submodules and Responsibilities:
//!
//! - **[`installer`]**: materializes a plugin bundle under the per-agent
//!   install root via an external package fetcher and gates it on a valid
//!   descriptor.
//! - **[`loader`]**: resolves an installed plugin's entry module into
//!   candidate exports and selects the first structurally valid bundle.
//! - **[`dylib`]**: the default [`loader::BundleResolver`] over
//!   `libloading`, for plugins shipped as dynamic libraries.
//! - **[`registrar`]**: applies and reverts a bundle's capabilities against
//!   the host registries, tracking exactly what was added.
//! - **[`manager`]**: the state machine ([`PluginManager`]) that drives
//!   install → configure → load → activate → deactivate → unload and is
//!   the sole mutator of the plugin registry.
//! - **[`config`]**: required-configuration bookkeeping; values go to the
//!   host's secure store, only satisfaction flags stay on the record.
//! - **[`state`]**: the persisted registry, rewritten wholesale after
//!   every mutating transition and reconciled against the filesystem at
//!   startup.
//! - **[`error`]**: the lifecycle error taxonomy
//!   ([`error::PluginSystemError`]).

pub mod config;
pub mod dylib;
pub mod error;
pub mod installer;
pub mod loader;
pub mod manager;
pub mod registrar;
pub(crate) mod state;

pub use dylib::{DylibResolver, PLUGIN_ENTRY_SYMBOL, PluginEntryFn};
pub use error::{PluginSystemError, Result};
pub use installer::{PackageFetcher, PluginInstaller, sanitize_dir_name};
pub use loader::{BundleResolver, ModuleExports};
pub use manager::{PluginManager, PluginRecord, PluginStatus};
pub use registrar::{ComponentRegistrar, ComponentRegistrationSet};

// Test module declaration; pub(crate) so other modules' tests share the
// support fakes.
#[cfg(test)]
pub(crate) mod tests;
