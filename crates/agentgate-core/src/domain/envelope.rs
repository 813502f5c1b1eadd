//! Response envelope shared by the CLI and the host-facing call boundary.
//!
//! Every public operation resolves to this shape: either `success=true` with
//! a `data` payload, or `success=false` with a populated `error` object.
//! Errors never cross the boundary as panics.

use serde::{Deserialize, Serialize};

use super::error::PolicyError;

/// Structured error body inside a failed envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvelopeError {
    /// Stable kind code, e.g. `REGISTRY.RESOLUTION`.
    pub code: String,
    pub message: String,
    pub recoverable: bool,
    pub suggested_action: String,
}

/// The standard request/response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseEnvelope {
    pub success: bool,
    pub canceled: bool,
    /// `"user" | "timeout" | "policy"` when a task was aborted, else `None`.
    pub aborted_by: Option<String>,
    pub data: Option<serde_json::Value>,
    pub error: Option<EnvelopeError>,
}

impl ResponseEnvelope {
    /// Successful envelope wrapping a data payload.
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            canceled: false,
            aborted_by: None,
            data: Some(data),
            error: None,
        }
    }

    /// Failed envelope derived from a domain error.
    pub fn from_error(err: &PolicyError) -> Self {
        let aborted_by = match err {
            PolicyError::ExecutionTimeout { .. } => Some("timeout".to_string()),
            PolicyError::SpawnRule1(_) | PolicyError::SpawnRule2(_) => {
                Some("policy".to_string())
            }
            _ => None,
        };
        Self {
            success: false,
            canceled: matches!(err, PolicyError::ExecutionTimeout { .. }),
            aborted_by,
            data: None,
            error: Some(EnvelopeError {
                code: err.kind().to_string(),
                message: err.to_string(),
                recoverable: err.recoverable(),
                suggested_action: err.suggested_action().to_string(),
            }),
        }
    }
}
