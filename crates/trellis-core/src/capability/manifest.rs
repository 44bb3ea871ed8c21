use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::lifecycle::error::PluginSystemError;

/// Descriptor file every installed plugin carries at its directory root.
pub const MANIFEST_FILE: &str = "plugin.json";

/// A configuration value a plugin declares it needs before it may run.
///
/// Serialized form matches the persisted registry layout: the key is
/// written as `name`, the satisfaction flag as `isSet`. Only the boolean
/// state is ever recorded; the value lives in the host's secure store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredConfigEntry {
    #[serde(rename = "name")]
    pub key: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub is_set: bool,
}

/// Parsed plugin descriptor.
#[derive(Debug, Clone)]
pub struct PluginManifest {
    /// Declared plugin name; the canonical registry key.
    pub name: String,

    /// Plugin version (validated as semver at parse time)
    pub version: String,

    /// Plugin description
    pub description: String,

    /// Entry module filename, relative to the plugin directory
    pub entry: Option<String>,

    /// Configuration the plugin requires before it may load
    pub required_config: Vec<RequiredConfigEntry>,
}

impl PluginManifest {
    /// Entry filename to load, defaulting to `lib<name>.so`. Plugins whose
    /// declared name is not a valid filename must set `entry` explicitly.
    pub fn entry_file(&self) -> String {
        self.entry
            .clone()
            .unwrap_or_else(|| format!("lib{}.so", self.name))
    }
}

// --- Intermediate structs for deserialization ---

#[derive(Deserialize, Debug)]
struct RawRequiredConfig {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    sensitive: bool,
}

#[derive(Deserialize, Debug)]
struct RawManifest {
    name: String,
    version: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    entry: Option<String>,
    #[serde(default)]
    required_config: Vec<RawRequiredConfig>,
}

// --- End Intermediate structs ---

/// Read and validate the descriptor of an installed plugin directory.
///
/// A missing or unparsable descriptor is a [`PluginSystemError::Metadata`]
/// failure; callers treat it as install/load failure, never partial
/// success.
pub async fn parse_manifest(dir: &Path) -> Result<PluginManifest, PluginSystemError> {
    let path = dir.join(MANIFEST_FILE);

    let raw = fs::read_to_string(&path).await.map_err(|e| {
        PluginSystemError::metadata(&path, "could not read plugin descriptor", Some(Box::new(e)))
    })?;

    let raw: RawManifest = serde_json::from_str(&raw).map_err(|e| {
        PluginSystemError::metadata(&path, "plugin descriptor is not valid JSON", Some(Box::new(e)))
    })?;

    if raw.name.trim().is_empty() {
        return Err(PluginSystemError::metadata(
            &path,
            "descriptor field `name` must not be empty",
            None,
        ));
    }

    if let Err(e) = semver::Version::parse(&raw.version) {
        return Err(PluginSystemError::metadata(
            &path,
            format!("descriptor field `version` ('{}') is not semver", raw.version),
            Some(Box::new(e)),
        ));
    }

    Ok(PluginManifest {
        name: raw.name,
        version: raw.version,
        description: raw.description,
        entry: raw.entry,
        required_config: raw
            .required_config
            .into_iter()
            .map(|entry| RequiredConfigEntry {
                key: entry.name,
                description: entry.description,
                sensitive: entry.sensitive,
                is_set: false,
            })
            .collect(),
    })
}
