//! Shared fakes for lifecycle tests: capability stubs, a descriptor-writing
//! package fetcher, a bundle resolver that skips real module imports, and a
//! host wrapper that records teardown order.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::capability::bundle::{BundleBuilder, PluginBundle};
use crate::capability::manifest::{MANIFEST_FILE, PluginManifest};
use crate::capability::traits::{
    Action, CapabilityError, CapabilityResult, Evaluator, Provider, Service, TaskWorker,
};
use crate::host::memory::InMemoryHost;
use crate::host::runtime::{CapabilityKind, HostResult, HostRuntime};
use crate::lifecycle::error::{PluginSystemError, Result};
use crate::lifecycle::installer::PackageFetcher;
use crate::lifecycle::loader::{BundleResolver, ModuleExports};
use crate::lifecycle::manager::PluginManager;

// ===== Capability stubs =====

pub(crate) struct TestAction {
    name: String,
}

impl TestAction {
    pub(crate) fn new(name: &str) -> Arc<dyn Action> {
        Arc::new(Self {
            name: name.to_string(),
        })
    }
}

#[async_trait]
impl Action for TestAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, input: Value) -> CapabilityResult<Value> {
        Ok(input)
    }
}

pub(crate) struct TestProvider {
    name: String,
}

impl TestProvider {
    pub(crate) fn new(name: &str) -> Arc<dyn Provider> {
        Arc::new(Self {
            name: name.to_string(),
        })
    }
}

#[async_trait]
impl Provider for TestProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, _context: &Value) -> CapabilityResult<Value> {
        Ok(json!({ "provider": self.name }))
    }
}

pub(crate) struct TestEvaluator {
    name: String,
}

impl TestEvaluator {
    pub(crate) fn new(name: &str) -> Arc<dyn Evaluator> {
        Arc::new(Self {
            name: name.to_string(),
        })
    }
}

#[async_trait]
impl Evaluator for TestEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, _context: &Value) -> CapabilityResult<Value> {
        Ok(json!({ "score": 1.0 }))
    }
}

pub(crate) struct TestTask {
    name: String,
}

impl TestTask {
    pub(crate) fn new(name: &str) -> Arc<dyn TaskWorker> {
        Arc::new(Self {
            name: name.to_string(),
        })
    }
}

#[async_trait]
impl TaskWorker for TestTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _context: Value) -> CapabilityResult<()> {
        Ok(())
    }
}

/// Shared start/stop counters for [`TestService`] assertions.
#[derive(Default)]
pub(crate) struct ServiceProbe {
    pub(crate) started: AtomicUsize,
    pub(crate) stopped: AtomicUsize,
}

impl ServiceProbe {
    pub(crate) fn starts(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn stops(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

pub(crate) struct TestService {
    probe: Arc<ServiceProbe>,
    fail_start: bool,
}

impl TestService {
    pub(crate) fn new(probe: Arc<ServiceProbe>) -> Arc<dyn Service> {
        Arc::new(Self {
            probe,
            fail_start: false,
        })
    }

    pub(crate) fn failing(probe: Arc<ServiceProbe>) -> Arc<dyn Service> {
        Arc::new(Self {
            probe,
            fail_start: true,
        })
    }
}

#[async_trait]
impl Service for TestService {
    async fn start(&self) -> CapabilityResult<()> {
        if self.fail_start {
            return Err("service refused to start".into());
        }
        self.probe.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> CapabilityResult<()> {
        self.probe.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ===== Package fetcher =====

/// Writes a plugin descriptor into the destination directory, standing in
/// for the external package installer.
pub(crate) struct MockFetcher {
    descriptors: StdMutex<HashMap<String, Value>>,
    refused: StdMutex<HashSet<String>>,
    bare: StdMutex<HashSet<String>>,
}

impl MockFetcher {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            descriptors: StdMutex::new(HashMap::new()),
            refused: StdMutex::new(HashSet::new()),
            bare: StdMutex::new(HashSet::new()),
        })
    }

    /// Use this descriptor for the named plugin instead of the default.
    pub(crate) fn stage(&self, name: &str, descriptor: Value) {
        self.descriptors
            .lock()
            .unwrap()
            .insert(name.to_string(), descriptor);
    }

    /// Make fetches of this plugin report failure.
    pub(crate) fn refuse(&self, name: &str) {
        self.refused.lock().unwrap().insert(name.to_string());
    }

    /// Materialize the directory but omit the descriptor file.
    pub(crate) fn stage_bare(&self, name: &str) {
        self.bare.lock().unwrap().insert(name.to_string());
    }
}

#[async_trait]
impl PackageFetcher for MockFetcher {
    async fn fetch(
        &self,
        name: &str,
        dest: &Path,
        _version: Option<&str>,
    ) -> std::result::Result<bool, CapabilityError> {
        if self.refused.lock().unwrap().contains(name) {
            return Ok(false);
        }
        std::fs::create_dir_all(dest)?;
        if self.bare.lock().unwrap().contains(name) {
            return Ok(true);
        }
        let descriptor = self
            .descriptors
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_else(|| json!({ "name": name, "version": "1.0.0" }));
        std::fs::write(dest.join(MANIFEST_FILE), serde_json::to_vec_pretty(&descriptor)?)?;
        Ok(true)
    }
}

// ===== Bundle resolver =====

/// Hands back pre-staged bundles instead of importing real modules.
pub(crate) struct StaticResolver {
    bundles: StdMutex<HashMap<String, Arc<PluginBundle>>>,
    failing: StdMutex<HashSet<String>>,
}

impl StaticResolver {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            bundles: StdMutex::new(HashMap::new()),
            failing: StdMutex::new(HashSet::new()),
        })
    }

    pub(crate) fn stage(&self, bundle: PluginBundle) {
        self.bundles
            .lock()
            .unwrap()
            .insert(bundle.name.clone(), Arc::new(bundle));
    }

    pub(crate) fn fail(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub(crate) fn clear_fail(&self, name: &str) {
        self.failing.lock().unwrap().remove(name);
    }
}

#[async_trait]
impl BundleResolver for StaticResolver {
    async fn resolve(&self, manifest: &PluginManifest, _dir: &Path) -> Result<ModuleExports> {
        if self.failing.lock().unwrap().contains(&manifest.name) {
            return Err(PluginSystemError::load(
                &manifest.name,
                "forced import failure",
                None,
            ));
        }
        let bundle = self
            .bundles
            .lock()
            .unwrap()
            .get(&manifest.name)
            .cloned()
            .ok_or_else(|| {
                PluginSystemError::load(&manifest.name, "no bundle staged for plugin", None)
            })?;
        Ok(ModuleExports {
            default_export: Some(bundle),
            named_exports: Vec::new(),
            library: None,
        })
    }
}

// ===== Recording host =====

/// Wraps the in-memory host, recording every unregister call in order.
pub(crate) struct RecordingHost {
    pub(crate) inner: InMemoryHost,
    pub(crate) unregistered: StdMutex<Vec<(CapabilityKind, String)>>,
}

impl RecordingHost {
    pub(crate) fn new(data_dir: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryHost::new(data_dir),
            unregistered: StdMutex::new(Vec::new()),
        })
    }

    fn note(&self, kind: CapabilityKind, name: &str) {
        self.unregistered
            .lock()
            .unwrap()
            .push((kind, name.to_string()));
    }
}

#[async_trait]
impl HostRuntime for RecordingHost {
    fn agent_data_dir(&self) -> PathBuf {
        self.inner.agent_data_dir()
    }

    async fn register_action(&self, action: Arc<dyn Action>) -> HostResult<()> {
        self.inner.register_action(action).await
    }

    async fn unregister_action(&self, name: &str) -> HostResult<()> {
        self.note(CapabilityKind::Action, name);
        self.inner.unregister_action(name).await
    }

    async fn register_provider(&self, provider: Arc<dyn Provider>) -> HostResult<()> {
        self.inner.register_provider(provider).await
    }

    async fn unregister_provider(&self, name: &str) -> HostResult<()> {
        self.note(CapabilityKind::Provider, name);
        self.inner.unregister_provider(name).await
    }

    async fn register_evaluator(&self, evaluator: Arc<dyn Evaluator>) -> HostResult<()> {
        self.inner.register_evaluator(evaluator).await
    }

    async fn unregister_evaluator(&self, name: &str) -> HostResult<()> {
        self.note(CapabilityKind::Evaluator, name);
        self.inner.unregister_evaluator(name).await
    }

    async fn register_service(&self, key: &str, service: Arc<dyn Service>) -> HostResult<()> {
        self.inner.register_service(key, service).await
    }

    async fn unregister_service(&self, key: &str) -> HostResult<()> {
        self.note(CapabilityKind::Service, key);
        self.inner.unregister_service(key).await
    }

    async fn service(&self, key: &str) -> Option<Arc<dyn Service>> {
        self.inner.service(key).await
    }

    async fn register_task(&self, task: Arc<dyn TaskWorker>) -> HostResult<()> {
        self.inner.register_task(task).await
    }

    async fn unregister_task(&self, name: &str) -> HostResult<()> {
        self.note(CapabilityKind::Task, name);
        self.inner.unregister_task(name).await
    }

    async fn set_secure_config(&self, plugin: &str, key: &str, value: &str) -> HostResult<()> {
        self.inner.set_secure_config(plugin, key, value).await
    }

    async fn get_secure_config(&self, plugin: &str, key: &str) -> HostResult<Option<String>> {
        self.inner.get_secure_config(plugin, key).await
    }
}

// ===== Manager fixture =====

pub(crate) struct Fixture {
    pub(crate) host: Arc<InMemoryHost>,
    pub(crate) fetcher: Arc<MockFetcher>,
    pub(crate) resolver: Arc<StaticResolver>,
    pub(crate) manager: PluginManager,
    pub(crate) dir: TempDir,
}

pub(crate) fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("temp agent dir");
    let host = Arc::new(InMemoryHost::new(dir.path().to_path_buf()));
    let fetcher = MockFetcher::new();
    let resolver = StaticResolver::new();
    let manager = PluginManager::new(host.clone(), fetcher.clone(), resolver.clone());
    Fixture {
        host,
        fetcher,
        resolver,
        manager,
        dir,
    }
}

/// A minimal bundle exposing a single action.
pub(crate) fn action_bundle(name: &str, action_name: &str) -> PluginBundle {
    BundleBuilder::new(name, "1.0.0")
        .action(TestAction::new(action_name))
        .build()
}

/// Descriptor declaring sensitive required-config keys.
pub(crate) fn descriptor_with_config(name: &str, keys: &[&str]) -> Value {
    let entries: Vec<Value> = keys
        .iter()
        .map(|key| json!({ "name": key, "description": "required credential", "sensitive": true }))
        .collect();
    json!({ "name": name, "version": "1.0.0", "required_config": entries })
}
