//! Agentgate Core Library
//!
//! Policy engine sitting between a host orchestrator and the agents it may
//! spawn: registry validation with content-digest attestation, spawn
//! authorization, and bounded parallel invocation with an append-only audit
//! trail.

pub mod audit;
pub mod domain;
pub mod gate;
pub mod hook;
pub mod inspect;
pub mod obs;
pub mod parallel;
pub mod prepare;
pub mod registry;
pub mod telemetry;
pub mod validate;

pub use audit::{AuditKind, AuditLog, AuditRecord};
pub use domain::{EnvelopeError, PolicyError, ResponseEnvelope, Result};
pub use gate::{
    decide, FsTeamDirectory, GateDecision, SpawnGate, SpawnRequest, SpawnRule, SubagentRole,
    TeamDirectory, TeamState,
};
pub use hook::{run_hook, EXIT_ALLOW, EXIT_BLOCK};
pub use inspect::{inspect, ArtifactInfo};
pub use parallel::{
    run_batch, AggregationReport, BatchSummary, TaskExecutor, TaskRequest, TaskResult,
    DEFAULT_CONCURRENCY_CAP,
};
pub use prepare::{prepare, InvocationBundle};
pub use registry::{AgentSpec, Registry, SkillSpec, Version, VersionReq};
pub use telemetry::init_tracing;
pub use validate::{validate, ValidationResult};

/// Agentgate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
