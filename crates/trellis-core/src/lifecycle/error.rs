//! Lifecycle error taxonomy.
//!
//! Every failure a lifecycle operation can surface is one of these
//! variants. Install-time errors propagate to the caller before any record
//! exists; load/activate errors are caught by the manager and recorded on
//! the plugin's registry entry instead of escaping.

use std::path::{Path, PathBuf};

use crate::host::runtime::HostError;
use crate::lifecycle::manager::PluginStatus;

#[derive(Debug, thiserror::Error)]
pub enum PluginSystemError {
    #[error("plugin descriptor error at '{path}': {message}")]
    Metadata {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("install conflict for plugin '{name}': {message}")]
    InstallConflict { name: String, message: String },

    #[error("fetching plugin '{name}' failed: {message}")]
    FetchFailed { name: String, message: String },

    #[error("loading plugin '{plugin}' failed: {message}")]
    Load {
        plugin: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("no export of plugin '{plugin}' qualifies as a bundle: {detail}")]
    InvalidPluginExport { plugin: String, detail: String },

    #[error("plugin '{plugin}' cannot {operation} while {status}")]
    NotReady {
        plugin: String,
        operation: &'static str,
        status: PluginStatus,
    },

    #[error("plugin not found: {0}")]
    NotFound(String),

    #[error("service '{key}' of plugin '{plugin}' failed to {operation}: {message}")]
    Service {
        plugin: String,
        key: String,
        operation: &'static str,
        message: String,
    },

    #[error("persisting plugin state failed during '{operation}' at '{path}': {source}")]
    Persistence {
        operation: String,
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("host runtime rejected {operation}: {source}")]
    Host {
        operation: String,
        #[source]
        source: HostError,
    },
}

impl PluginSystemError {
    pub fn metadata(
        path: &Path,
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        PluginSystemError::Metadata {
            path: path.to_path_buf(),
            message: message.into(),
            source,
        }
    }

    pub fn load(
        plugin: &str,
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        PluginSystemError::Load {
            plugin: plugin.to_string(),
            message: message.into(),
            source,
        }
    }

    pub fn persistence(
        operation: impl Into<String>,
        path: &Path,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        PluginSystemError::Persistence {
            operation: operation.into(),
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn host(operation: impl Into<String>, source: HostError) -> Self {
        PluginSystemError::Host {
            operation: operation.into(),
            source,
        }
    }
}

/// Shorthand for Result with the lifecycle error type
pub type Result<T> = std::result::Result<T, PluginSystemError>;
