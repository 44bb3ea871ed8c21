use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use super::common::{
    ServiceProbe, descriptor_with_config, fixture, install_and_load, service_bundle,
};
use crate::host::runtime::HostRuntime;
use crate::lifecycle::error::PluginSystemError;
use crate::lifecycle::manager::PluginStatus;
use crate::lifecycle::tests::support::{TestAction, action_bundle};

#[tokio::test]
async fn full_lifecycle_walk_for_an_unconfigured_plugin() {
    let f = fixture();
    let name = "@scope/plugin-example";
    let probe = Arc::new(ServiceProbe::default());
    f.fetcher.stage(name, json!({ "name": name, "version": "1.0.0" }));
    f.resolver.stage(service_bundle(name, "example-act", "example-svc", probe.clone()));

    // install → Installed, under a sanitized directory
    let record = f.manager.install(name, None).await.unwrap();
    assert_eq!(record.status, PluginStatus::Installed);
    assert!(record.install_path.ends_with("plugins/_scope_plugin-example"));

    // load → Loaded, action visible in the host registry
    assert!(f.manager.load(name).await.unwrap());
    assert_eq!(f.manager.record(name).await.unwrap().status, PluginStatus::Loaded);
    assert!(f.host.has_action("example-act"));

    // activate → Active, service started
    assert!(f.manager.activate(name).await.unwrap());
    assert_eq!(f.manager.record(name).await.unwrap().status, PluginStatus::Active);
    assert_eq!(probe.starts(), 1);

    // deactivate → Inactive, service stopped
    f.manager.deactivate(name).await.unwrap();
    assert_eq!(f.manager.record(name).await.unwrap().status, PluginStatus::Inactive);
    assert_eq!(probe.stops(), 1);

    // unload → Installed, action gone from the host registry
    f.manager.unload(name).await.unwrap();
    assert_eq!(f.manager.record(name).await.unwrap().status, PluginStatus::Installed);
    assert!(!f.host.has_action("example-act"));
}

#[tokio::test]
async fn configuration_gates_the_whole_runway() {
    let f = fixture();
    let name = "@scope/plugin-with-config";
    f.fetcher.stage(name, descriptor_with_config(name, &["API_KEY"]));
    f.resolver.stage(action_bundle(name, "gated-act"));

    let record = f.manager.install(name, None).await.unwrap();
    assert_eq!(record.status, PluginStatus::NeedsConfiguration);

    // loading before configuration is refused
    assert!(matches!(
        f.manager.load(name).await,
        Err(PluginSystemError::NotReady { .. })
    ));
    // and so is activation, which loads first
    assert!(matches!(
        f.manager.activate(name).await,
        Err(PluginSystemError::NotReady { .. })
    ));

    let mut values = HashMap::new();
    values.insert("API_KEY".to_string(), "x".to_string());
    let record = f.manager.configure(name, &values).await.unwrap();
    assert_eq!(record.status, PluginStatus::Installed);

    assert!(f.manager.load(name).await.unwrap());
    assert!(f.manager.activate(name).await.unwrap());
    assert_eq!(f.manager.record(name).await.unwrap().status, PluginStatus::Active);
}

#[tokio::test]
async fn plugins_never_clobber_each_other_or_the_host() {
    let f = fixture();
    // a component the host carried before any plugin loaded
    f.host
        .register_action(TestAction::new("host-native"))
        .await
        .unwrap();

    install_and_load(&f, "alpha", "alpha-act").await;
    install_and_load(&f, "beta", "beta-act").await;

    assert!(f.host.has_action("host-native"));
    assert!(f.host.has_action("alpha-act"));
    assert!(f.host.has_action("beta-act"));

    // unloading alpha removes exactly alpha's registrations
    f.manager.unload("alpha").await.unwrap();
    assert!(!f.host.has_action("alpha-act"));
    assert!(f.host.has_action("beta-act"));
    assert!(f.host.has_action("host-native"));
}

#[tokio::test]
async fn a_plugin_colliding_with_a_host_name_fails_but_cleans_up() {
    let f = fixture();
    f.host
        .register_action(TestAction::new("taken"))
        .await
        .unwrap();

    f.resolver.stage(action_bundle("grabby", "taken"));
    f.manager.install("grabby", None).await.unwrap();

    // the duplicate is rejected by the host, the load is contained
    assert!(!f.manager.load("grabby").await.unwrap());
    assert_eq!(f.manager.record("grabby").await.unwrap().status, PluginStatus::Error);

    // unload reverts whatever partial state existed without touching the
    // host's own registration
    f.manager.unload("grabby").await.unwrap();
    assert!(f.host.has_action("taken"));
}

#[tokio::test]
async fn one_broken_plugin_leaves_the_rest_running() {
    let f = fixture();
    f.resolver.fail("broken");
    f.manager.install("broken", None).await.unwrap();

    let probe = Arc::new(ServiceProbe::default());
    f.resolver
        .stage(service_bundle("steady", "steady-act", "steady-svc", probe.clone()));
    f.manager.install("steady", None).await.unwrap();
    assert!(f.manager.activate("steady").await.unwrap());

    assert!(!f.manager.load("broken").await.unwrap());
    let broken = f.manager.record("broken").await.unwrap();
    assert_eq!(broken.status, PluginStatus::Error);
    assert!(broken.error_detail.is_some());

    let steady = f.manager.record("steady").await.unwrap();
    assert_eq!(steady.status, PluginStatus::Active);
    assert!(f.host.has_action("steady-act"));
    assert_eq!(probe.starts(), 1);
}
