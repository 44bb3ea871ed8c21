//! Persisted plugin registry.
//!
//! One JSON document holding every plugin record, rewritten wholesale
//! after each mutating transition — no partial or append writes. Writes go
//! through a temp file in the target directory and an atomic persist, so a
//! crash mid-write leaves the previous state intact. A corrupt or missing
//! file must never prevent the host from booting.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::lifecycle::error::{PluginSystemError, Result};
use crate::lifecycle::manager::{PluginRecord, PluginStatus};

/// Filename of the persisted registry under the agent data directory.
pub(crate) const STATE_FILE: &str = "plugin-management-state.json";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PluginStateFile {
    installed_plugins: HashMap<String, PluginRecord>,
    last_updated: DateTime<Utc>,
}

pub(crate) fn state_path(agent_data_dir: &Path) -> PathBuf {
    agent_data_dir.join(STATE_FILE)
}

/// Read the persisted registry. Missing file → empty registry; unreadable
/// or corrupt file → warn and empty registry.
pub(crate) fn load_state(path: &Path) -> HashMap<String, PluginRecord> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            warn!(
                "could not read plugin state at '{}': {}; starting empty",
                path.display(),
                e
            );
            return HashMap::new();
        }
    };
    match serde_json::from_str::<PluginStateFile>(&raw) {
        Ok(state) => state.installed_plugins,
        Err(e) => {
            warn!(
                "plugin state at '{}' is corrupt: {}; starting empty",
                path.display(),
                e
            );
            HashMap::new()
        }
    }
}

/// Rewrite the whole registry: serialize, write to a named temp file next
/// to the target, then persist over it.
pub(crate) fn save_state(path: &Path, records: &HashMap<String, PluginRecord>) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        PluginSystemError::persistence(
            "resolve_state_dir",
            path,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "state path has no parent directory",
            )),
        )
    })?;
    fs::create_dir_all(parent)
        .map_err(|e| PluginSystemError::persistence("create_state_dir", path, Box::new(e)))?;

    let state = PluginStateFile {
        installed_plugins: records.clone(),
        last_updated: Utc::now(),
    };
    let json = serde_json::to_string_pretty(&state)
        .map_err(|e| PluginSystemError::persistence("serialize_state", path, Box::new(e)))?;

    let mut tmp = NamedTempFile::new_in(parent)
        .map_err(|e| PluginSystemError::persistence("create_temp_file", path, Box::new(e)))?;
    tmp.write_all(json.as_bytes())
        .map_err(|e| PluginSystemError::persistence("write_temp_file", path, Box::new(e)))?;
    tmp.persist(path)
        .map_err(|e| PluginSystemError::persistence("persist_state", path, Box::new(e.error)))?;
    Ok(())
}

/// Startup pass over a freshly restored registry: drop records whose
/// install directory vanished, and demote `Loaded`/`Active`/`Inactive`
/// records to `Installed` — registration sets are process-local handles and
/// did not survive the restart. Returns whether anything changed.
pub(crate) fn reconcile(records: &mut HashMap<String, PluginRecord>) -> bool {
    let mut changed = false;

    records.retain(|name, record| {
        if record.install_path.is_dir() {
            true
        } else {
            info!(
                "dropping plugin '{}' from the registry: install path '{}' no longer exists",
                name,
                record.install_path.display()
            );
            changed = true;
            false
        }
    });

    for record in records.values_mut() {
        if matches!(
            record.status,
            PluginStatus::Loaded | PluginStatus::Active | PluginStatus::Inactive
        ) {
            record.status = PluginStatus::Installed;
            changed = true;
        }
    }
    changed
}
