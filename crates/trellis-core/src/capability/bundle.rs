use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::capability::traits::{
    Action, CapabilityResult, Evaluator, Provider, Service, ServiceDescriptor, TaskWorker,
};
use crate::host::runtime::{CapabilityKind, HostRuntime};

/// One-shot setup hook a bundle may carry; invoked once during load, after
/// its components are registered.
#[async_trait]
pub trait PluginInit: Send + Sync {
    async fn init(&self, host: &dyn HostRuntime) -> CapabilityResult<()>;
}

/// Everything one plugin exposes to the host.
pub struct PluginBundle {
    pub name: String,
    pub version: String,
    pub description: String,
    pub actions: Vec<Arc<dyn Action>>,
    pub providers: Vec<Arc<dyn Provider>>,
    pub evaluators: Vec<Arc<dyn Evaluator>>,
    pub services: Vec<ServiceDescriptor>,
    pub tasks: Vec<Arc<dyn TaskWorker>>,
    pub init: Option<Arc<dyn PluginInit>>,
}

/// Why a candidate export failed bundle validation. Each variant names the
/// field the schema expected.
#[derive(Debug, thiserror::Error)]
pub enum BundleShapeError {
    #[error("bundle is missing the required `name` field")]
    MissingName,

    #[error(
        "bundle '{name}' declares no capabilities: expected at least one of \
         actions, providers, evaluators, services, tasks, or an init hook"
    )]
    NoCapabilities { name: String },

    #[error("bundle '{name}' service #{index} is missing the required `key` field")]
    MissingServiceKey { name: String, index: usize },

    #[error("bundle '{name}' declares duplicate {kind} name '{duplicate}'")]
    DuplicateName {
        name: String,
        kind: CapabilityKind,
        duplicate: String,
    },
}

impl PluginBundle {
    /// Validate the bundle against the strict plugin shape.
    pub fn validate(&self) -> Result<(), BundleShapeError> {
        if self.name.trim().is_empty() {
            return Err(BundleShapeError::MissingName);
        }

        let capability_count = self.actions.len()
            + self.providers.len()
            + self.evaluators.len()
            + self.services.len()
            + self.tasks.len();
        if capability_count == 0 && self.init.is_none() {
            return Err(BundleShapeError::NoCapabilities {
                name: self.name.clone(),
            });
        }

        for (index, descriptor) in self.services.iter().enumerate() {
            if descriptor.key.trim().is_empty() {
                return Err(BundleShapeError::MissingServiceKey {
                    name: self.name.clone(),
                    index,
                });
            }
        }

        self.check_unique(CapabilityKind::Action, self.actions.iter().map(|a| a.name()))?;
        self.check_unique(
            CapabilityKind::Provider,
            self.providers.iter().map(|p| p.name()),
        )?;
        self.check_unique(
            CapabilityKind::Evaluator,
            self.evaluators.iter().map(|e| e.name()),
        )?;
        self.check_unique(
            CapabilityKind::Service,
            self.services.iter().map(|s| s.key.as_str()),
        )?;
        self.check_unique(CapabilityKind::Task, self.tasks.iter().map(|t| t.name()))?;
        Ok(())
    }

    fn check_unique<'a>(
        &self,
        kind: CapabilityKind,
        names: impl Iterator<Item = &'a str>,
    ) -> Result<(), BundleShapeError> {
        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name.to_string()) {
                return Err(BundleShapeError::DuplicateName {
                    name: self.name.clone(),
                    kind,
                    duplicate: name.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for PluginBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginBundle")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("actions", &self.actions.len())
            .field("providers", &self.providers.len())
            .field("evaluators", &self.evaluators.len())
            .field("services", &self.services.len())
            .field("tasks", &self.tasks.len())
            .field("has_init", &self.init.is_some())
            .finish()
    }
}

/// Builder for assembling a plugin bundle
pub struct BundleBuilder {
    bundle: PluginBundle,
}

impl BundleBuilder {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            bundle: PluginBundle {
                name: name.to_string(),
                version: version.to_string(),
                description: String::new(),
                actions: Vec::new(),
                providers: Vec::new(),
                evaluators: Vec::new(),
                services: Vec::new(),
                tasks: Vec::new(),
                init: None,
            },
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.bundle.description = description.to_string();
        self
    }

    pub fn action(mut self, action: Arc<dyn Action>) -> Self {
        self.bundle.actions.push(action);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.bundle.providers.push(provider);
        self
    }

    pub fn evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.bundle.evaluators.push(evaluator);
        self
    }

    pub fn service(mut self, key: &str, service: Arc<dyn Service>) -> Self {
        self.bundle.services.push(ServiceDescriptor::new(key, service));
        self
    }

    pub fn task(mut self, task: Arc<dyn TaskWorker>) -> Self {
        self.bundle.tasks.push(task);
        self
    }

    pub fn init(mut self, init: Arc<dyn PluginInit>) -> Self {
        self.bundle.init = Some(init);
        self
    }

    pub fn build(self) -> PluginBundle {
        self.bundle
    }
}
