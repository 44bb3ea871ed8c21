//! # Host Runtime Boundary
//!
//! The host framework owns the shared component registries (actions,
//! providers, evaluators, services, tasks), the per-agent data directory,
//! and the secure configuration store. This module defines the injected
//! interface the lifecycle core consumes — never a module-level singleton —
//! plus an in-memory implementation for tests and embedders that do not
//! carry a full runtime.

pub mod memory;
pub mod runtime;

pub use memory::InMemoryHost;
pub use runtime::{CapabilityKind, HostError, HostResult, HostRuntime};

// Test module declaration
#[cfg(test)]
mod tests;
