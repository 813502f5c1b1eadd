//! Domain-level error taxonomy for the policy engine.
//!
//! Every variant maps to a stable kind code (e.g. `REGISTRY.RESOLUTION`)
//! carried on the wire in the response envelope. The codes are part of the
//! external contract; the variant names are not.

/// Policy engine errors.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("registry not found or malformed: {0}")]
    RegistryNotFound(String),

    #[error("agent resolution failed: {0}")]
    RegistryResolution(String),

    #[error("artifact unreadable at {path}: {reason}")]
    ArtifactUnreadable { path: String, reason: String },

    #[error("artifact at {path} declares no version tag")]
    ArtifactNoVersion { path: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("task '{correlation_id}' exceeded its {timeout_secs}s deadline")]
    ExecutionTimeout {
        correlation_id: String,
        timeout_secs: u64,
    },

    #[error("spawn rule 1 violated: {0}")]
    SpawnRule1(String),

    #[error("spawn rule 2 violated: {0}")]
    SpawnRule2(String),

    #[error("audit write failed: {0}")]
    AuditIo(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PolicyError {
    /// Stable kind code for the response envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            PolicyError::RegistryNotFound(_) => "REGISTRY.NOT_FOUND",
            PolicyError::RegistryResolution(_) => "REGISTRY.RESOLUTION",
            PolicyError::ArtifactUnreadable { .. } => "ARTIFACT.UNREADABLE",
            PolicyError::ArtifactNoVersion { .. } => "ARTIFACT.NO_VERSION",
            PolicyError::InvalidInput(_) => "VALIDATION.INPUT",
            PolicyError::ExecutionTimeout { .. } => "EXECUTION.TIMEOUT",
            PolicyError::SpawnRule1(_) => "SPAWN.RULE1_VIOLATION",
            PolicyError::SpawnRule2(_) => "SPAWN.RULE2_VIOLATION",
            PolicyError::AuditIo(_) => "AUDIT.IO",
            PolicyError::Serialization(_) => "VALIDATION.INPUT",
            PolicyError::Io(_) => "ARTIFACT.UNREADABLE",
        }
    }

    /// Whether the caller can recover without an external change.
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            PolicyError::ExecutionTimeout { .. }
                | PolicyError::SpawnRule1(_)
                | PolicyError::SpawnRule2(_)
                | PolicyError::InvalidInput(_)
        )
    }

    /// Operator-facing remediation hint for the response envelope.
    pub fn suggested_action(&self) -> &'static str {
        match self {
            PolicyError::RegistryNotFound(_) => {
                "check the registry path and that the file parses as YAML"
            }
            PolicyError::RegistryResolution(_) => {
                "register the agent or align its required version with the artifact"
            }
            PolicyError::ArtifactUnreadable { .. } => {
                "restore the agent definition file at the registered path"
            }
            PolicyError::ArtifactNoVersion { .. } => {
                "add a 'version:' tag to the agent definition"
            }
            PolicyError::InvalidInput(_) => "correct the request parameters and retry",
            PolicyError::ExecutionTimeout { .. } => {
                "retry with a larger timeout or a smaller unit of work"
            }
            PolicyError::SpawnRule1(_) => {
                "give orchestrator-role agents a teammate name and team"
            }
            PolicyError::SpawnRule2(_) => {
                "have the team lead session issue this spawn"
            }
            PolicyError::AuditIo(_) => "check the audit log path is writable",
            PolicyError::Serialization(_) => "correct the request payload and retry",
            PolicyError::Io(_) => "check file permissions and retry",
        }
    }
}

/// Result type for policy engine operations.
pub type Result<T> = std::result::Result<T, PolicyError>;
