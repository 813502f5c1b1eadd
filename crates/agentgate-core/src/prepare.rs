//! Invocation preparer: turns a successful validation into an opaque,
//! executable task bundle for the host. The engine never executes a bundle.
//!
//! Audit policy is two-phase: a `prepared` record is written here at bundle
//! creation; the matching `task_outcome` record is written by whoever
//! observes completion (the parallel coordinator for batch tasks, the host
//! via the bundle's `audit_path` otherwise).

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::audit::{AuditKind, AuditLog, AuditRecord};
use crate::domain::error::{PolicyError, Result};
use crate::validate::ValidationResult;

/// A prepared, not-yet-executed task. Immutable once created; ownership of
/// its execution passes entirely to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationBundle {
    pub agent: String,
    pub path: PathBuf,
    pub version: String,
    /// Content digest of the artifact the bundle was built from.
    pub digest: String,
    /// Opaque key/value parameters. Never interpolated into shell text.
    pub params: BTreeMap<String, String>,
    pub timeout_secs: u64,
    /// Where outcome records for this invocation should be appended.
    pub audit_path: PathBuf,
}

/// Build an [`InvocationBundle`] from a prior successful validation.
///
/// Validation is never re-run implicitly; callers re-validate when artifacts
/// may have changed. A failed `ValidationResult` is rejected outright —
/// no partial or best-effort bundle exists.
pub fn prepare(
    validation: &ValidationResult,
    params: BTreeMap<String, String>,
    timeout_secs: u64,
    audit: &AuditLog,
) -> Result<InvocationBundle> {
    if !validation.ok {
        return Err(validation.to_error().unwrap_or_else(|| {
            PolicyError::RegistryResolution("validation failed".to_string())
        }));
    }
    // ok=true implies both halves are present.
    let spec = validation
        .spec
        .as_ref()
        .ok_or_else(|| PolicyError::InvalidInput("validation result missing spec".into()))?;
    let artifact = validation
        .artifact
        .as_ref()
        .ok_or_else(|| PolicyError::InvalidInput("validation result missing artifact".into()))?;

    if timeout_secs == 0 {
        return Err(PolicyError::InvalidInput(
            "timeout must be at least 1 second".to_string(),
        ));
    }
    for key in params.keys() {
        if key.is_empty() {
            return Err(PolicyError::InvalidInput(
                "parameter keys must be non-empty".to_string(),
            ));
        }
    }

    let bundle = InvocationBundle {
        agent: spec.name.clone(),
        path: artifact.path.clone(),
        version: artifact.declared_version.to_string(),
        digest: artifact.content_digest.clone(),
        params,
        timeout_secs,
        audit_path: audit.path().to_path_buf(),
    };

    audit.append(
        &AuditRecord::new(AuditKind::Validation, "prepared").with_agent(
            &bundle.agent,
            &bundle.version,
            &bundle.digest,
        ),
    );

    Ok(bundle)
}
