use std::fs;

use super::common::{fixture, install_and_load, restarted_manager};
use crate::lifecycle::manager::PluginStatus;

#[tokio::test]
async fn registry_survives_a_restart() {
    let f = fixture();
    f.manager.install("keeper", None).await.unwrap();

    // the state file exists and names the plugin
    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(f.manager.state_path()).unwrap()).unwrap();
    assert!(raw["installedPlugins"].get("keeper").is_some());

    let (manager, _host) = restarted_manager(f.dir.path());
    manager.initialize().await.unwrap();

    let record = manager.record("keeper").await.unwrap();
    assert_eq!(record.status, PluginStatus::Installed);
    assert_eq!(record.version, "1.0.0");
    assert!(record.install_path.is_dir());
}

#[tokio::test]
async fn runtime_statuses_do_not_survive_a_restart() {
    let f = fixture();
    install_and_load(&f, "worker", "worker-act").await;
    assert_eq!(f.manager.record("worker").await.unwrap().status, PluginStatus::Loaded);

    let (manager, host) = restarted_manager(f.dir.path());
    manager.initialize().await.unwrap();

    // the record came back demoted; its registrations were process-local
    assert_eq!(manager.record("worker").await.unwrap().status, PluginStatus::Installed);
    assert!(!manager.is_loaded("worker").await);
    assert!(!host.has_action("worker-act"));
}

#[tokio::test]
async fn reconciliation_drops_plugins_whose_files_vanished() {
    let f = fixture();
    f.manager.install("kept", None).await.unwrap();
    let doomed = f.manager.install("doomed", None).await.unwrap();

    // the doomed plugin's files disappear between runs
    fs::remove_dir_all(&doomed.install_path).unwrap();

    let (manager, _host) = restarted_manager(f.dir.path());
    manager.initialize().await.unwrap();

    assert!(manager.record("kept").await.is_some());
    assert!(manager.record("doomed").await.is_none());

    // the persisted file reflects the removal
    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(manager.state_path()).unwrap()).unwrap();
    assert!(raw["installedPlugins"].get("kept").is_some());
    assert!(raw["installedPlugins"].get("doomed").is_none());
}

#[tokio::test]
async fn required_config_state_survives_a_restart() {
    use std::collections::HashMap;

    let f = fixture();
    f.fetcher.stage(
        "gated",
        super::common::descriptor_with_config("gated", &["API_KEY", "REGION"]),
    );
    f.manager.install("gated", None).await.unwrap();

    let mut values = HashMap::new();
    values.insert("API_KEY".to_string(), "x".to_string());
    f.manager.configure("gated", &values).await.unwrap();

    let (manager, _host) = restarted_manager(f.dir.path());
    manager.initialize().await.unwrap();

    let record = manager.record("gated").await.unwrap();
    assert_eq!(record.status, PluginStatus::NeedsConfiguration);
    let api_key = record.required_config.iter().find(|e| e.key == "API_KEY").unwrap();
    let region = record.required_config.iter().find(|e| e.key == "REGION").unwrap();
    assert!(api_key.is_set);
    assert!(!region.is_set);
}
