use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// Error type for capability hooks. Plugins surface whatever error they
/// carry; the lifecycle core only ever records the message.
pub type CapabilityError = Box<dyn std::error::Error + Send + Sync>;

/// Shorthand for Result with the capability hook error type
pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;

/// A named operation the host can invoke on behalf of an agent.
#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Whether this action applies to the given request payload.
    async fn validate(&self, _input: &Value) -> bool {
        true
    }

    async fn handle(&self, input: Value) -> CapabilityResult<Value>;
}

/// Supplies context data to the host on demand.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, context: &Value) -> CapabilityResult<Value>;
}

/// Scores or annotates host state after the fact.
#[async_trait]
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;

    async fn evaluate(&self, context: &Value) -> CapabilityResult<Value>;
}

/// A background unit of work the host schedules by name.
#[async_trait]
pub trait TaskWorker: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, context: Value) -> CapabilityResult<()>;
}

/// A long-lived component with start/stop hooks, driven on plugin
/// activation and deactivation. Both hooks default to no-ops.
#[async_trait]
pub trait Service: Send + Sync {
    async fn start(&self) -> CapabilityResult<()> {
        Ok(())
    }

    async fn stop(&self) -> CapabilityResult<()> {
        Ok(())
    }
}

/// A service together with its registry key.
///
/// The key is the single, explicit service identifier; a descriptor with an
/// empty key fails bundle validation instead of being registered under a
/// guessed name.
pub struct ServiceDescriptor {
    pub key: String,
    pub service: Arc<dyn Service>,
}

impl ServiceDescriptor {
    pub fn new(key: impl Into<String>, service: Arc<dyn Service>) -> Self {
        Self {
            key: key.into(),
            service,
        }
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
