use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::capability::{Action, Evaluator, Provider, Service, TaskWorker};

/// The categories of host registry a plugin can extend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    Action,
    Provider,
    Evaluator,
    Service,
    Task,
}

impl CapabilityKind {
    /// Order in which the registrar applies a bundle's capability kinds.
    pub const REGISTRATION_ORDER: [CapabilityKind; 5] = [
        CapabilityKind::Action,
        CapabilityKind::Service,
        CapabilityKind::Provider,
        CapabilityKind::Evaluator,
        CapabilityKind::Task,
    ];

    /// Teardown walks the exact reverse of [`Self::REGISTRATION_ORDER`]:
    /// later kinds may depend on earlier ones during their own teardown.
    pub const TEARDOWN_ORDER: [CapabilityKind; 5] = [
        CapabilityKind::Task,
        CapabilityKind::Evaluator,
        CapabilityKind::Provider,
        CapabilityKind::Service,
        CapabilityKind::Action,
    ];
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CapabilityKind::Action => "action",
            CapabilityKind::Provider => "provider",
            CapabilityKind::Evaluator => "evaluator",
            CapabilityKind::Service => "service",
            CapabilityKind::Task => "task",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("{kind} '{name}' is already registered")]
    DuplicateName { kind: CapabilityKind, name: String },

    #[error("{kind} '{name}' is not registered")]
    NotRegistered { kind: CapabilityKind, name: String },

    #[error("secure config store failed for plugin '{plugin}', key '{key}': {message}")]
    SecureStore {
        plugin: String,
        key: String,
        message: String,
    },

    #[error("host runtime error: {0}")]
    Other(String),
}

/// Shorthand for Result with the host boundary error type
pub type HostResult<T> = std::result::Result<T, HostError>;

/// Interface over the host runtime's shared registries.
///
/// Registration must reject a duplicate name with
/// [`HostError::DuplicateName`] — the lifecycle core's no-clobber guarantee
/// rests on that contract. Unregistering a name that is not present yields
/// [`HostError::NotRegistered`]; callers that need idempotence handle it.
#[async_trait]
pub trait HostRuntime: Send + Sync {
    /// Per-agent data directory; the plugin install root and the persisted
    /// registry both live under it.
    fn agent_data_dir(&self) -> PathBuf;

    async fn register_action(&self, action: Arc<dyn Action>) -> HostResult<()>;
    async fn unregister_action(&self, name: &str) -> HostResult<()>;

    async fn register_provider(&self, provider: Arc<dyn Provider>) -> HostResult<()>;
    async fn unregister_provider(&self, name: &str) -> HostResult<()>;

    async fn register_evaluator(&self, evaluator: Arc<dyn Evaluator>) -> HostResult<()>;
    async fn unregister_evaluator(&self, name: &str) -> HostResult<()>;

    /// Register a service under its declared key. The host owns the
    /// instance from here on; starting and stopping go through
    /// [`Self::service`] lookups.
    async fn register_service(&self, key: &str, service: Arc<dyn Service>) -> HostResult<()>;
    async fn unregister_service(&self, key: &str) -> HostResult<()>;
    async fn service(&self, key: &str) -> Option<Arc<dyn Service>>;

    async fn register_task(&self, task: Arc<dyn TaskWorker>) -> HostResult<()>;
    async fn unregister_task(&self, name: &str) -> HostResult<()>;

    /// Store a configuration value in the host's secure store. The
    /// lifecycle core only ever records the boolean satisfaction state;
    /// the value itself must not end up in the persisted plugin registry.
    async fn set_secure_config(&self, plugin: &str, key: &str, value: &str) -> HostResult<()>;
    async fn get_secure_config(&self, plugin: &str, key: &str) -> HostResult<Option<String>>;
}
