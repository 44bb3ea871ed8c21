//! Shared setup for integration scenarios, built on the lifecycle test
//! fakes: an agent sandbox directory, an in-memory host, and a manager
//! wired with the mock fetcher and static resolver.

use std::path::Path;
use std::sync::Arc;

pub(super) use crate::lifecycle::tests::support::{
    Fixture, ServiceProbe, TestAction, TestService, action_bundle, descriptor_with_config, fixture,
};

use crate::capability::bundle::BundleBuilder;
use crate::host::memory::InMemoryHost;
use crate::lifecycle::manager::PluginManager;
use crate::lifecycle::tests::support::{MockFetcher, StaticResolver};

/// A second manager over the same agent directory, standing in for the
/// host process after a restart.
pub(super) fn restarted_manager(agent_dir: &Path) -> (PluginManager, Arc<InMemoryHost>) {
    let host = Arc::new(InMemoryHost::new(agent_dir.to_path_buf()));
    let manager = PluginManager::new(host.clone(), MockFetcher::new(), StaticResolver::new());
    (manager, host)
}

/// Stage a one-action bundle and walk the plugin to `Loaded`.
pub(super) async fn install_and_load(f: &Fixture, name: &str, action_name: &str) {
    f.resolver.stage(action_bundle(name, action_name));
    f.manager.install(name, None).await.unwrap();
    assert!(f.manager.load(name).await.unwrap());
}

/// Bundle with one action and one service sharing a probe.
pub(super) fn service_bundle(
    name: &str,
    action_name: &str,
    service_key: &str,
    probe: Arc<ServiceProbe>,
) -> crate::capability::bundle::PluginBundle {
    BundleBuilder::new(name, "1.0.0")
        .action(TestAction::new(action_name))
        .service(service_key, TestService::new(probe))
        .build()
}
