use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::Mutex;

use crate::capability::bundle::PluginBundle;
use crate::host::runtime::{CapabilityKind, HostError, HostRuntime};
use crate::lifecycle::error::{PluginSystemError, Result};

/// Exactly what one loaded plugin added to the host's shared registries.
///
/// Runtime bookkeeping only — never persisted; rebuilt on every load. Names
/// appear in registration order within each kind.
#[derive(Debug, Default, Clone)]
pub struct ComponentRegistrationSet {
    pub actions: Vec<String>,
    pub providers: Vec<String>,
    pub evaluators: Vec<String>,
    pub services: Vec<String>,
    pub tasks: Vec<String>,
}

impl ComponentRegistrationSet {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
            && self.providers.is_empty()
            && self.evaluators.is_empty()
            && self.services.is_empty()
            && self.tasks.is_empty()
    }

    pub fn names(&self, kind: CapabilityKind) -> &[String] {
        match kind {
            CapabilityKind::Action => &self.actions,
            CapabilityKind::Provider => &self.providers,
            CapabilityKind::Evaluator => &self.evaluators,
            CapabilityKind::Service => &self.services,
            CapabilityKind::Task => &self.tasks,
        }
    }
}

/// Applies and reverts a bundle's capabilities against the host registries.
///
/// Owns the per-plugin registration sets exclusively; the manager only sees
/// clones. A name enters the tracked set only once its own host call has
/// succeeded, so a mid-way failure leaves a precise partial set behind for
/// later cleanup.
pub struct ComponentRegistrar {
    host: Arc<dyn HostRuntime>,
    sets: Mutex<HashMap<String, ComponentRegistrationSet>>,
}

impl ComponentRegistrar {
    pub fn new(host: Arc<dyn HostRuntime>) -> Self {
        Self {
            host,
            sets: Mutex::new(HashMap::new()),
        }
    }

    /// Register everything the bundle declares, one kind at a time, in
    /// [`CapabilityKind::REGISTRATION_ORDER`]. The first host rejection
    /// aborts the pass; whatever registered before it stays tracked.
    pub async fn register(&self, plugin: &str, bundle: &PluginBundle) -> Result<()> {
        let mut sets = self.sets.lock().await;
        let set = sets.entry(plugin.to_string()).or_default();

        for action in &bundle.actions {
            let name = action.name().to_string();
            self.host
                .register_action(Arc::clone(action))
                .await
                .map_err(|e| PluginSystemError::host(format!("registering action '{}'", name), e))?;
            set.actions.push(name);
        }
        for descriptor in &bundle.services {
            self.host
                .register_service(&descriptor.key, Arc::clone(&descriptor.service))
                .await
                .map_err(|e| {
                    PluginSystemError::host(format!("registering service '{}'", descriptor.key), e)
                })?;
            set.services.push(descriptor.key.clone());
        }
        for provider in &bundle.providers {
            let name = provider.name().to_string();
            self.host
                .register_provider(Arc::clone(provider))
                .await
                .map_err(|e| {
                    PluginSystemError::host(format!("registering provider '{}'", name), e)
                })?;
            set.providers.push(name);
        }
        for evaluator in &bundle.evaluators {
            let name = evaluator.name().to_string();
            self.host
                .register_evaluator(Arc::clone(evaluator))
                .await
                .map_err(|e| {
                    PluginSystemError::host(format!("registering evaluator '{}'", name), e)
                })?;
            set.evaluators.push(name);
        }
        for task in &bundle.tasks {
            let name = task.name().to_string();
            self.host
                .register_task(Arc::clone(task))
                .await
                .map_err(|e| PluginSystemError::host(format!("registering task '{}'", name), e))?;
            set.tasks.push(name);
        }

        debug!(
            "plugin '{}' registered {} action(s), {} service(s), {} provider(s), {} evaluator(s), {} task(s)",
            plugin,
            set.actions.len(),
            set.services.len(),
            set.providers.len(),
            set.evaluators.len(),
            set.tasks.len()
        );
        Ok(())
    }

    /// Revert everything `register` recorded for `plugin`, in
    /// [`CapabilityKind::TEARDOWN_ORDER`], most recent first within each
    /// kind. Idempotent: an untracked plugin is a no-op, and names already
    /// gone from the host are skipped. Per-step host failures are logged
    /// and swallowed so one broken component cannot block the rest of the
    /// teardown; the plugin's set is deleted unconditionally at the end.
    pub async fn unregister(&self, plugin: &str) {
        let mut sets = self.sets.lock().await;
        let Some(set) = sets.remove(plugin) else {
            debug!("plugin '{}' has no tracked registrations", plugin);
            return;
        };
        drop(sets);

        for name in set.tasks.iter().rev() {
            self.drop_registration(CapabilityKind::Task, name).await;
        }
        for name in set.evaluators.iter().rev() {
            self.drop_registration(CapabilityKind::Evaluator, name).await;
        }
        for name in set.providers.iter().rev() {
            self.drop_registration(CapabilityKind::Provider, name).await;
        }
        for key in set.services.iter().rev() {
            self.drop_registration(CapabilityKind::Service, key).await;
        }
        for name in set.actions.iter().rev() {
            self.drop_registration(CapabilityKind::Action, name).await;
        }
        debug!("plugin '{}' registrations reverted", plugin);
    }

    async fn drop_registration(&self, kind: CapabilityKind, name: &str) {
        let result = match kind {
            CapabilityKind::Action => self.host.unregister_action(name).await,
            CapabilityKind::Provider => self.host.unregister_provider(name).await,
            CapabilityKind::Evaluator => self.host.unregister_evaluator(name).await,
            CapabilityKind::Service => self.host.unregister_service(name).await,
            CapabilityKind::Task => self.host.unregister_task(name).await,
        };
        match result {
            Ok(()) => debug!("unregistered {} '{}'", kind, name),
            Err(HostError::NotRegistered { .. }) => {
                debug!("{} '{}' was already gone", kind, name)
            }
            Err(e) => warn!("unregistering {} '{}' failed: {}", kind, name, e),
        }
    }

    /// Snapshot of a plugin's tracked registrations, if any.
    pub async fn registrations(&self, plugin: &str) -> Option<ComponentRegistrationSet> {
        self.sets.lock().await.get(plugin).cloned()
    }

    pub async fn is_tracked(&self, plugin: &str) -> bool {
        self.sets.lock().await.contains_key(plugin)
    }
}
