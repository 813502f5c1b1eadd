//! Validator: cross-checks a registry entry against the inspected artifact.
//!
//! This path is fail-closed: any missing entry, unreadable artifact, or
//! version mismatch yields `ok = false` with a specific reason, and nothing
//! downstream may build an invocation bundle from a failed result.

use serde::{Deserialize, Serialize};

use crate::domain::error::PolicyError;
use crate::inspect::{inspect, ArtifactInfo};
use crate::obs;
use crate::registry::{AgentSpec, Registry};

/// The outcome of validating one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub ok: bool,
    /// Present when the agent was found in the registry.
    pub spec: Option<AgentSpec>,
    /// Present when the artifact could be inspected.
    pub artifact: Option<ArtifactInfo>,
    /// Stable error kind code when `ok` is false.
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

impl ValidationResult {
    fn pass(spec: AgentSpec, artifact: ArtifactInfo) -> Self {
        Self {
            ok: true,
            spec: Some(spec),
            artifact: Some(artifact),
            error_kind: None,
            error_message: None,
        }
    }

    fn fail(spec: Option<AgentSpec>, artifact: Option<ArtifactInfo>, err: &PolicyError) -> Self {
        Self {
            ok: false,
            spec,
            artifact,
            error_kind: Some(err.kind().to_string()),
            error_message: Some(err.to_string()),
        }
    }

    /// Reconstruct the failure as a domain error for envelope conversion.
    pub fn to_error(&self) -> Option<PolicyError> {
        if self.ok {
            return None;
        }
        let message = self
            .error_message
            .clone()
            .unwrap_or_else(|| "validation failed".to_string());
        Some(match self.error_kind.as_deref() {
            Some("ARTIFACT.UNREADABLE") => PolicyError::ArtifactUnreadable {
                path: self
                    .spec
                    .as_ref()
                    .map(|s| s.path.display().to_string())
                    .unwrap_or_default(),
                reason: message,
            },
            Some("ARTIFACT.NO_VERSION") => PolicyError::ArtifactNoVersion {
                path: self
                    .spec
                    .as_ref()
                    .map(|s| s.path.display().to_string())
                    .unwrap_or_default(),
            },
            _ => PolicyError::RegistryResolution(message),
        })
    }
}

/// Validate one agent: registry lookup, artifact inspection, version
/// resolution. Specs and artifacts are recomputed on every call.
pub fn validate(registry: &Registry, name: &str) -> ValidationResult {
    let Some(spec) = registry.agent(name).cloned() else {
        let err = PolicyError::RegistryResolution(format!("agent '{name}' not in registry"));
        obs::emit_validation_checked(name, false, Some(err.kind()));
        return ValidationResult::fail(None, None, &err);
    };

    let artifact = match inspect(&spec.path) {
        Ok(info) => info,
        Err(err) => {
            obs::emit_validation_checked(name, false, Some(err.kind()));
            return ValidationResult::fail(Some(spec), None, &err);
        }
    };

    if !spec.required_version.matches(&artifact.declared_version) {
        let err = PolicyError::RegistryResolution(format!(
            "agent '{name}' declares {}, registry requires {}",
            artifact.declared_version, spec.required_version
        ));
        obs::emit_validation_checked(name, false, Some(err.kind()));
        return ValidationResult::fail(Some(spec), Some(artifact), &err);
    }

    obs::emit_validation_checked(name, true, None);
    ValidationResult::pass(spec, artifact)
}
