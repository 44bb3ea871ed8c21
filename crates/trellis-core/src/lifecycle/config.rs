//! Required-configuration bookkeeping.
//!
//! The record only ever tracks whether each required key is satisfied; the
//! value itself goes to the host's secure store, keeping secrets out of
//! the persisted plugin registry.

use std::collections::HashMap;

use log::{debug, warn};

use crate::host::runtime::HostRuntime;
use crate::lifecycle::error::{PluginSystemError, Result};
use crate::lifecycle::manager::PluginRecord;

/// Merge supplied values into the record's required config by key, marking
/// matches satisfied. Keys the plugin never declared are logged and
/// ignored. A secure-store write failure aborts the merge and propagates.
pub(crate) async fn apply_values(
    host: &dyn HostRuntime,
    record: &mut PluginRecord,
    values: &HashMap<String, String>,
) -> Result<()> {
    for (key, value) in values {
        let Some(index) = record.required_config.iter().position(|e| &e.key == key) else {
            warn!(
                "plugin '{}' declares no required config key '{}'; ignoring",
                record.name, key
            );
            continue;
        };
        host.set_secure_config(&record.name, key, value)
            .await
            .map_err(|e| {
                PluginSystemError::host(
                    format!("storing config '{}' for plugin '{}'", key, record.name),
                    e,
                )
            })?;
        record.required_config[index].is_set = true;
        debug!("plugin '{}' config key '{}' satisfied", record.name, key);
    }
    Ok(())
}

/// Whether every required config entry is satisfied.
pub(crate) fn all_satisfied(record: &PluginRecord) -> bool {
    record.required_config.iter().all(|entry| entry.is_set)
}
