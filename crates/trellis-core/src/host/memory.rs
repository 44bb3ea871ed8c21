use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::capability::{Action, Evaluator, Provider, Service, TaskWorker};
use crate::host::runtime::{CapabilityKind, HostError, HostResult, HostRuntime};

/// In-memory host runtime.
///
/// Backs the test suite and embedders that want the lifecycle manager
/// without a full agent runtime. Enforces the same contract a real host
/// must: duplicate names are rejected, unknown names report
/// [`HostError::NotRegistered`].
pub struct InMemoryHost {
    data_dir: PathBuf,
    actions: Mutex<HashMap<String, Arc<dyn Action>>>,
    providers: Mutex<HashMap<String, Arc<dyn Provider>>>,
    evaluators: Mutex<HashMap<String, Arc<dyn Evaluator>>>,
    services: Mutex<HashMap<String, Arc<dyn Service>>>,
    tasks: Mutex<HashMap<String, Arc<dyn TaskWorker>>>,
    secure: Mutex<HashMap<(String, String), String>>,
}

impl InMemoryHost {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            actions: Mutex::new(HashMap::new()),
            providers: Mutex::new(HashMap::new()),
            evaluators: Mutex::new(HashMap::new()),
            services: Mutex::new(HashMap::new()),
            tasks: Mutex::new(HashMap::new()),
            secure: Mutex::new(HashMap::new()),
        }
    }

    fn insert<T: ?Sized>(
        map: &Mutex<HashMap<String, Arc<T>>>,
        kind: CapabilityKind,
        name: &str,
        value: Arc<T>,
    ) -> HostResult<()> {
        let mut map = map.lock().unwrap();
        if map.contains_key(name) {
            return Err(HostError::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }
        map.insert(name.to_string(), value);
        Ok(())
    }

    fn remove<T: ?Sized>(
        map: &Mutex<HashMap<String, Arc<T>>>,
        kind: CapabilityKind,
        name: &str,
    ) -> HostResult<()> {
        match map.lock().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => Err(HostError::NotRegistered {
                kind,
                name: name.to_string(),
            }),
        }
    }

    fn sorted_keys<T: ?Sized>(map: &Mutex<HashMap<String, Arc<T>>>) -> Vec<String> {
        let mut keys: Vec<String> = map.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    // Inspection helpers beyond the trait, for assertions and debugging.

    pub fn action_names(&self) -> Vec<String> {
        Self::sorted_keys(&self.actions)
    }

    pub fn provider_names(&self) -> Vec<String> {
        Self::sorted_keys(&self.providers)
    }

    pub fn evaluator_names(&self) -> Vec<String> {
        Self::sorted_keys(&self.evaluators)
    }

    pub fn service_keys(&self) -> Vec<String> {
        Self::sorted_keys(&self.services)
    }

    pub fn task_names(&self) -> Vec<String> {
        Self::sorted_keys(&self.tasks)
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.actions.lock().unwrap().contains_key(name)
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.lock().unwrap().contains_key(name)
    }

    pub fn has_evaluator(&self, name: &str) -> bool {
        self.evaluators.lock().unwrap().contains_key(name)
    }

    pub fn has_service(&self, key: &str) -> bool {
        self.services.lock().unwrap().contains_key(key)
    }

    pub fn has_task(&self, name: &str) -> bool {
        self.tasks.lock().unwrap().contains_key(name)
    }
}

impl fmt::Debug for InMemoryHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryHost")
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HostRuntime for InMemoryHost {
    fn agent_data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    async fn register_action(&self, action: Arc<dyn Action>) -> HostResult<()> {
        let name = action.name().to_string();
        Self::insert(&self.actions, CapabilityKind::Action, &name, action)
    }

    async fn unregister_action(&self, name: &str) -> HostResult<()> {
        Self::remove(&self.actions, CapabilityKind::Action, name)
    }

    async fn register_provider(&self, provider: Arc<dyn Provider>) -> HostResult<()> {
        let name = provider.name().to_string();
        Self::insert(&self.providers, CapabilityKind::Provider, &name, provider)
    }

    async fn unregister_provider(&self, name: &str) -> HostResult<()> {
        Self::remove(&self.providers, CapabilityKind::Provider, name)
    }

    async fn register_evaluator(&self, evaluator: Arc<dyn Evaluator>) -> HostResult<()> {
        let name = evaluator.name().to_string();
        Self::insert(&self.evaluators, CapabilityKind::Evaluator, &name, evaluator)
    }

    async fn unregister_evaluator(&self, name: &str) -> HostResult<()> {
        Self::remove(&self.evaluators, CapabilityKind::Evaluator, name)
    }

    async fn register_service(&self, key: &str, service: Arc<dyn Service>) -> HostResult<()> {
        Self::insert(&self.services, CapabilityKind::Service, key, service)
    }

    async fn unregister_service(&self, key: &str) -> HostResult<()> {
        Self::remove(&self.services, CapabilityKind::Service, key)
    }

    async fn service(&self, key: &str) -> Option<Arc<dyn Service>> {
        self.services.lock().unwrap().get(key).cloned()
    }

    async fn register_task(&self, task: Arc<dyn TaskWorker>) -> HostResult<()> {
        let name = task.name().to_string();
        Self::insert(&self.tasks, CapabilityKind::Task, &name, task)
    }

    async fn unregister_task(&self, name: &str) -> HostResult<()> {
        Self::remove(&self.tasks, CapabilityKind::Task, name)
    }

    async fn set_secure_config(&self, plugin: &str, key: &str, value: &str) -> HostResult<()> {
        self.secure
            .lock()
            .unwrap()
            .insert((plugin.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    async fn get_secure_config(&self, plugin: &str, key: &str) -> HostResult<Option<String>> {
        Ok(self
            .secure
            .lock()
            .unwrap()
            .get(&(plugin.to_string(), key.to_string()))
            .cloned())
    }
}
