use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::capability::bundle::PluginBundle;
use crate::capability::manifest::{self, RequiredConfigEntry};
use crate::host::runtime::HostRuntime;
use crate::lifecycle::config;
use crate::lifecycle::error::{PluginSystemError, Result};
use crate::lifecycle::installer::{PackageFetcher, PluginInstaller};
use crate::lifecycle::loader::{self, BundleResolver};
use crate::lifecycle::registrar::ComponentRegistrar;
use crate::lifecycle::state;

/// Subdirectory of the agent data dir that plugin bundles install into.
pub const INSTALL_DIR: &str = "plugins";

/// Where a plugin sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginStatus {
    NeedsConfiguration,
    Installed,
    Loaded,
    Active,
    Inactive,
    Error,
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PluginStatus::NeedsConfiguration => "needs_configuration",
            PluginStatus::Installed => "installed",
            PluginStatus::Loaded => "loaded",
            PluginStatus::Active => "active",
            PluginStatus::Inactive => "inactive",
            PluginStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// Registry entry for one installed plugin, keyed by its descriptor-declared
/// name. Serialized form matches the persisted state layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginRecord {
    pub name: String,
    pub version: String,
    pub status: PluginStatus,
    #[serde(rename = "path")]
    pub install_path: PathBuf,
    #[serde(rename = "requiredEnvVars", default)]
    pub required_config: Vec<RequiredConfigEntry>,
    #[serde(rename = "errorDetails", default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub installed_at: DateTime<Utc>,
    #[serde(rename = "lastActivated", default, skip_serializing_if = "Option::is_none")]
    pub last_activated: Option<DateTime<Utc>>,
}

/// Runtime handles for one loaded plugin.
///
/// Field order is load-bearing: the bundle must drop before the library
/// backing its vtables.
struct LoadedPlugin {
    bundle: Arc<PluginBundle>,
    loaded_at: DateTime<Utc>,
    _library: Option<Arc<libloading::Library>>,
}

/// The lifecycle state machine and sole mutator of the plugin registry.
///
/// Drives install → configure → load → activate → deactivate → unload,
/// persisting the full registry after every mutating transition.
/// Operations on the same plugin name are serialized through a per-name
/// mutex; operations on different names do not interact.
///
/// Error containment: `load` and `activate` catch their internal failures,
/// park the record in [`PluginStatus::Error`] with `error_detail` set, and
/// report `Ok(false)` — the registry is never left mid-transition, and no
/// failure of one plugin touches another.
pub struct PluginManager {
    host: Arc<dyn HostRuntime>,
    installer: PluginInstaller,
    resolver: Arc<dyn BundleResolver>,
    registrar: ComponentRegistrar,
    state_path: PathBuf,
    records: Mutex<HashMap<String, PluginRecord>>,
    loaded: Mutex<HashMap<String, LoadedPlugin>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PluginManager {
    pub fn new(
        host: Arc<dyn HostRuntime>,
        fetcher: Arc<dyn PackageFetcher>,
        resolver: Arc<dyn BundleResolver>,
    ) -> Self {
        let data_dir = host.agent_data_dir();
        let registrar = ComponentRegistrar::new(Arc::clone(&host));
        Self {
            installer: PluginInstaller::new(data_dir.join(INSTALL_DIR), fetcher),
            state_path: state::state_path(&data_dir),
            registrar,
            resolver,
            host,
            records: Mutex::new(HashMap::new()),
            loaded: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Restore the persisted registry and reconcile it against the
    /// filesystem. Call once at host startup, before any other operation.
    pub async fn initialize(&self) -> Result<()> {
        let mut restored = state::load_state(&self.state_path);
        let changed = state::reconcile(&mut restored);
        info!("plugin registry restored: {} plugin(s)", restored.len());

        let mut records = self.records.lock().await;
        *records = restored;
        if changed {
            state::save_state(&self.state_path, &records)?;
        }
        Ok(())
    }

    /// Install a plugin by name. On success a registry entry exists in
    /// `Installed` (no required config) or `NeedsConfiguration`; on any
    /// failure the registry is unchanged.
    pub async fn install(&self, name: &str, version: Option<&str>) -> Result<PluginRecord> {
        let guard = self.name_lock(name).await;
        let _guard = guard.lock().await;

        let dest = self.installer.install_path_for(name);
        {
            let records = self.records.lock().await;
            if records.contains_key(name) {
                return Err(PluginSystemError::InstallConflict {
                    name: name.to_string(),
                    message: "plugin is already installed".to_string(),
                });
            }
            if let Some(existing) = records.values().find(|r| r.install_path == dest) {
                return Err(PluginSystemError::InstallConflict {
                    name: name.to_string(),
                    message: format!(
                        "install directory '{}' is already claimed by plugin '{}'",
                        dest.display(),
                        existing.name
                    ),
                });
            }
        }

        let installed = self.installer.install(name, version).await?;
        let canonical = installed.manifest.name.clone();
        if canonical != name {
            // The descriptor-declared name is the registry key; the
            // requested name only picked the install directory.
            warn!(
                "plugin requested as '{}' declares name '{}'; registry key follows the descriptor",
                name, canonical
            );
        }

        let record = {
            let mut records = self.records.lock().await;
            if records.contains_key(&canonical) {
                return Err(PluginSystemError::InstallConflict {
                    name: canonical,
                    message: "a plugin with this descriptor name is already installed".to_string(),
                });
            }
            let status = if installed.manifest.required_config.is_empty() {
                PluginStatus::Installed
            } else {
                PluginStatus::NeedsConfiguration
            };
            let record = PluginRecord {
                name: canonical.clone(),
                version: installed.manifest.version.clone(),
                status,
                install_path: installed.install_path,
                required_config: installed.manifest.required_config,
                error_detail: None,
                installed_at: Utc::now(),
                last_activated: None,
            };
            records.insert(canonical, record.clone());
            record
        };
        self.persist_or_log().await;
        info!("plugin '{}' installed, status {}", record.name, record.status);
        Ok(record)
    }

    /// Explicitly remove a plugin: unload it, drop its record, persist,
    /// then best-effort delete the install directory.
    pub async fn uninstall(&self, name: &str) -> Result<()> {
        let guard = self.name_lock(name).await;
        let _guard = guard.lock().await;

        self.ensure_known(name).await?;
        self.unload_locked(name).await?;

        let removed = {
            let mut records = self.records.lock().await;
            records.remove(name)
        };
        self.persist().await?;

        if let Some(record) = removed {
            if let Err(e) = tokio::fs::remove_dir_all(&record.install_path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        "could not remove install directory '{}': {}",
                        record.install_path.display(),
                        e
                    );
                }
            }
        }
        info!("plugin '{}' uninstalled", name);
        Ok(())
    }

    /// Merge configuration values into the plugin's required config,
    /// forwarding each value to the host's secure store. Once every
    /// required key is satisfied the record leaves `NeedsConfiguration`.
    pub async fn configure(
        &self,
        name: &str,
        values: &HashMap<String, String>,
    ) -> Result<PluginRecord> {
        let guard = self.name_lock(name).await;
        let _guard = guard.lock().await;

        let record = {
            let mut records = self.records.lock().await;
            let record = records
                .get_mut(name)
                .ok_or_else(|| PluginSystemError::NotFound(name.to_string()))?;
            config::apply_values(self.host.as_ref(), record, values).await?;
            if record.status == PluginStatus::NeedsConfiguration && config::all_satisfied(record) {
                record.status = PluginStatus::Installed;
                info!("plugin '{}' fully configured", name);
            }
            record.clone()
        };
        self.persist_or_log().await;
        Ok(record)
    }

    /// Resolve, validate, and register the plugin's bundle. `Ok(true)` on
    /// success or when already loaded; `Ok(false)` when the load failed and
    /// the record was parked in `Error`. `NotReady` when configuration is
    /// still outstanding.
    pub async fn load(&self, name: &str) -> Result<bool> {
        let guard = self.name_lock(name).await;
        let _guard = guard.lock().await;
        self.load_locked(name).await
    }

    /// Start the plugin's declared services and mark it `Active`. Loads
    /// first when necessary. Same reporting contract as [`Self::load`].
    pub async fn activate(&self, name: &str) -> Result<bool> {
        let guard = self.name_lock(name).await;
        let _guard = guard.lock().await;

        let status = self.status_of(name).await?;
        if status == PluginStatus::Active {
            debug!("plugin '{}' is already active", name);
            return Ok(true);
        }

        let already_loaded = { self.loaded.lock().await.contains_key(name) };
        if !already_loaded && !self.load_locked(name).await? {
            return Ok(false);
        }

        let bundle = {
            let loaded = self.loaded.lock().await;
            loaded.get(name).map(|l| Arc::clone(&l.bundle))
        };
        let Some(bundle) = bundle else {
            self.fail_record(name, "loaded bundle is missing".to_string()).await;
            return Ok(false);
        };

        match self.start_services(name, &bundle).await {
            Ok(()) => {
                self.update_record(name, |r| {
                    r.status = PluginStatus::Active;
                    r.error_detail = None;
                    r.last_activated = Some(Utc::now());
                })
                .await;
                self.persist_or_log().await;
                info!("plugin '{}' active", name);
                Ok(true)
            }
            Err(e) => {
                warn!("activating plugin '{}' failed: {}", name, e);
                self.fail_record(name, e.to_string()).await;
                Ok(false)
            }
        }
    }

    /// Stop the plugin's services and mark it `Inactive`. Always succeeds
    /// once attempted: per-service stop failures are logged, never
    /// propagated, so a broken service cannot leave a plugin stuck active.
    pub async fn deactivate(&self, name: &str) -> Result<()> {
        let guard = self.name_lock(name).await;
        let _guard = guard.lock().await;

        self.ensure_known(name).await?;
        self.deactivate_locked(name).await;
        Ok(())
    }

    /// Deactivate, revert every tracked registration, and return the
    /// plugin to `Installed`. No-op success when nothing is loaded.
    pub async fn unload(&self, name: &str) -> Result<()> {
        let guard = self.name_lock(name).await;
        let _guard = guard.lock().await;

        self.ensure_known(name).await?;
        self.unload_locked(name).await
    }

    /// Unload then load again, picking up a changed bundle on disk.
    pub async fn reload(&self, name: &str) -> Result<bool> {
        let guard = self.name_lock(name).await;
        let _guard = guard.lock().await;

        self.ensure_known(name).await?;
        self.unload_locked(name).await?;
        self.load_locked(name).await
    }

    pub async fn record(&self, name: &str) -> Option<PluginRecord> {
        self.records.lock().await.get(name).cloned()
    }

    /// All registry entries, ordered by plugin name.
    pub async fn records(&self) -> Vec<PluginRecord> {
        let mut records: Vec<PluginRecord> = self.records.lock().await.values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    pub async fn is_loaded(&self, name: &str) -> bool {
        self.loaded.lock().await.contains_key(name)
    }

    /// When the plugin's bundle was resolved, if it is currently loaded.
    pub async fn loaded_at(&self, name: &str) -> Option<DateTime<Utc>> {
        self.loaded.lock().await.get(name).map(|l| l.loaded_at)
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn install_root(&self) -> &Path {
        self.installer.install_root()
    }

    // --- internals ---
    // The `_locked` variants assume the caller already holds the plugin's
    // name guard; public methods acquire it exactly once.

    async fn name_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn ensure_known(&self, name: &str) -> Result<()> {
        if self.records.lock().await.contains_key(name) {
            Ok(())
        } else {
            Err(PluginSystemError::NotFound(name.to_string()))
        }
    }

    async fn status_of(&self, name: &str) -> Result<PluginStatus> {
        self.records
            .lock()
            .await
            .get(name)
            .map(|r| r.status)
            .ok_or_else(|| PluginSystemError::NotFound(name.to_string()))
    }

    async fn load_locked(&self, name: &str) -> Result<bool> {
        let (status, install_path) = {
            let records = self.records.lock().await;
            let record = records
                .get(name)
                .ok_or_else(|| PluginSystemError::NotFound(name.to_string()))?;
            (record.status, record.install_path.clone())
        };
        if status == PluginStatus::NeedsConfiguration {
            return Err(PluginSystemError::NotReady {
                plugin: name.to_string(),
                operation: "load",
                status,
            });
        }
        if self.loaded.lock().await.contains_key(name) {
            debug!("plugin '{}' is already loaded", name);
            return Ok(true);
        }

        match self.try_load(name, &install_path).await {
            Ok(()) => {
                self.update_record(name, |r| {
                    r.status = PluginStatus::Loaded;
                    r.error_detail = None;
                })
                .await;
                self.persist_or_log().await;
                info!("plugin '{}' loaded", name);
                Ok(true)
            }
            Err(e) => {
                warn!("loading plugin '{}' failed: {}", name, e);
                self.fail_record(name, e.to_string()).await;
                Ok(false)
            }
        }
    }

    /// The fallible middle of a load. Registrations that succeeded before a
    /// failure stay tracked, so a later unload still reverts them.
    async fn try_load(&self, name: &str, install_path: &Path) -> Result<()> {
        let manifest = manifest::parse_manifest(install_path).await?;
        let exports = self.resolver.resolve(&manifest, install_path).await?;
        let bundle = loader::select_bundle(name, &exports)?;
        if bundle.name != name {
            warn!(
                "bundle for plugin '{}' declares name '{}'; keeping the registry key",
                name, bundle.name
            );
        }

        self.loaded.lock().await.insert(
            name.to_string(),
            LoadedPlugin {
                bundle: Arc::clone(&bundle),
                loaded_at: Utc::now(),
                _library: exports.library.clone(),
            },
        );

        self.registrar.register(name, &bundle).await?;

        if let Some(init) = &bundle.init {
            init.init(self.host.as_ref())
                .await
                .map_err(|e| PluginSystemError::load(name, "plugin init hook failed", Some(e)))?;
        }
        Ok(())
    }

    async fn start_services(&self, plugin: &str, bundle: &PluginBundle) -> Result<()> {
        for descriptor in &bundle.services {
            match self.host.service(&descriptor.key).await {
                Some(service) => {
                    service.start().await.map_err(|e| PluginSystemError::Service {
                        plugin: plugin.to_string(),
                        key: descriptor.key.clone(),
                        operation: "start",
                        message: e.to_string(),
                    })?;
                    debug!("service '{}' of plugin '{}' started", descriptor.key, plugin);
                }
                None => warn!(
                    "service '{}' of plugin '{}' is not registered with the host; skipping start",
                    descriptor.key, plugin
                ),
            }
        }
        Ok(())
    }

    /// Idempotent: only does work while the plugin is `Active`.
    async fn deactivate_locked(&self, name: &str) {
        let active = {
            let records = self.records.lock().await;
            records
                .get(name)
                .map(|r| r.status == PluginStatus::Active)
                .unwrap_or(false)
        };
        if !active {
            debug!("plugin '{}' is not active; nothing to deactivate", name);
            return;
        }

        let bundle = {
            let loaded = self.loaded.lock().await;
            loaded.get(name).map(|l| Arc::clone(&l.bundle))
        };
        if let Some(bundle) = bundle {
            for descriptor in &bundle.services {
                match self.host.service(&descriptor.key).await {
                    Some(service) => {
                        if let Err(e) = service.stop().await {
                            warn!(
                                "stopping service '{}' of plugin '{}' failed: {}",
                                descriptor.key, name, e
                            );
                        }
                    }
                    None => debug!(
                        "service '{}' of plugin '{}' is not registered; skipping stop",
                        descriptor.key, name
                    ),
                }
            }
        }

        self.update_record(name, |r| {
            r.status = PluginStatus::Inactive;
        })
        .await;
        self.persist_or_log().await;
        info!("plugin '{}' inactive", name);
    }

    async fn unload_locked(&self, name: &str) -> Result<()> {
        self.deactivate_locked(name).await;

        let is_loaded = self.loaded.lock().await.contains_key(name);
        if !is_loaded && !self.registrar.is_tracked(name).await {
            debug!("plugin '{}' is not loaded; nothing to unload", name);
            return Ok(());
        }

        // Host references go first; only then may the library handle drop.
        self.registrar.unregister(name).await;
        self.loaded.lock().await.remove(name);

        self.update_record(name, |r| {
            r.status = PluginStatus::Installed;
            r.error_detail = None;
        })
        .await;
        // Unload is the one teardown whose trailing persistence failure is
        // reported to the caller.
        self.persist().await?;
        info!("plugin '{}' unloaded", name);
        Ok(())
    }

    async fn update_record<F: FnOnce(&mut PluginRecord)>(&self, name: &str, f: F) {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(name) {
            f(record);
        }
    }

    async fn fail_record(&self, name: &str, detail: String) {
        self.update_record(name, |r| {
            r.status = PluginStatus::Error;
            r.error_detail = Some(detail);
        })
        .await;
        self.persist_or_log().await;
    }

    async fn persist(&self) -> Result<()> {
        let records = self.records.lock().await;
        state::save_state(&self.state_path, &records)
    }

    /// Write policy for mid-lifecycle mutations: a failed state write is
    /// logged and the in-memory transition stands.
    async fn persist_or_log(&self) {
        if let Err(e) = self.persist().await {
            error!("plugin state write failed: {}", e);
        }
    }
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager")
            .field("state_path", &self.state_path)
            .finish_non_exhaustive()
    }
}
