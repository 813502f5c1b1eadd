//! Spawn gate: decides whether a proposed agent spawn is structurally safe.
//!
//! Two rules, evaluated as a pure function over the request plus the
//! externally-owned team state:
//!
//! 1. Orchestrator-role agents must be spawned as named teammates.
//! 2. Once a team has an established lead, only the lead session may create
//!    named teammates in it.
//!
//! A team with no recorded state cannot yet have a lead, so its first
//! creator is trusted. The team store is read-only here; the host owns all
//! writes to it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audit::{AuditKind, AuditLog, AuditRecord};
use crate::obs;

/// Closed vocabulary of subagent roles the gate recognizes.
///
/// Roles carrying orchestration authority get the named-teammate lifecycle
/// requirement; anything unrecognized falls through to `Unknown` and is
/// treated as a plain worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubagentRole {
    ScrumMaster,
    TeamLead,
    Coordinator,
    Unknown,
}

impl SubagentRole {
    /// Classify the host-supplied `subagent_type` string.
    pub fn classify(subagent_type: &str) -> Self {
        match subagent_type {
            "scrum-master" => SubagentRole::ScrumMaster,
            "team-lead" => SubagentRole::TeamLead,
            "coordinator" => SubagentRole::Coordinator,
            _ => SubagentRole::Unknown,
        }
    }

    /// Whether this role carries orchestration authority (Rule 1 applies).
    pub fn is_orchestrator(&self) -> bool {
        !matches!(self, SubagentRole::Unknown)
    }
}

/// A proposed agent spawn, as classified from the host's hook payload.
///
/// Empty-string teammate and team names are normalized to `None`, so after
/// construction a request is exactly one of: named-teammate request
/// (`team_name` present) or background request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnRequest {
    pub subagent_type: String,
    pub teammate_name: Option<String>,
    pub team_name: Option<String>,
    pub run_in_background: bool,
    pub caller_session_id: String,
}

impl SpawnRequest {
    pub fn new(
        subagent_type: impl Into<String>,
        teammate_name: Option<String>,
        team_name: Option<String>,
        run_in_background: bool,
        caller_session_id: impl Into<String>,
    ) -> Self {
        Self {
            subagent_type: subagent_type.into(),
            teammate_name: teammate_name.filter(|s| !s.is_empty()),
            team_name: team_name.filter(|s| !s.is_empty()),
            run_in_background,
            caller_session_id: caller_session_id.into(),
        }
    }

    pub fn role(&self) -> SubagentRole {
        SubagentRole::classify(&self.subagent_type)
    }
}

/// External lookup result for one team. Absence means the team does not
/// exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamState {
    pub team_name: String,
    pub lead_session_id: String,
}

/// Which authorization rule a blocked request violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpawnRule {
    Rule1,
    Rule2,
}

/// The gate's verdict on one spawn request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    pub allow: bool,
    pub rule_violated: Option<SpawnRule>,
    pub message: String,
}

impl GateDecision {
    fn allow(message: impl Into<String>) -> Self {
        Self {
            allow: true,
            rule_violated: None,
            message: message.into(),
        }
    }

    fn block(rule: SpawnRule, message: impl Into<String>) -> Self {
        Self {
            allow: false,
            rule_violated: Some(rule),
            message: message.into(),
        }
    }
}

/// Decide one spawn request. Pure: same request + same team state always
/// yields the same decision.
pub fn decide(request: &SpawnRequest, team: Option<&TeamState>) -> GateDecision {
    // Rule 1: orchestrator roles require the named-teammate lifecycle.
    if request.role().is_orchestrator() && request.teammate_name.is_none() {
        return GateDecision::block(
            SpawnRule::Rule1,
            format!(
                "orchestrator role '{}' requires named-teammate lifecycle",
                request.subagent_type
            ),
        );
    }

    match (&request.team_name, team) {
        // Team named but not yet established: the first creator is trusted.
        (Some(name), None) => {
            GateDecision::allow(format!("team '{name}' not yet established"))
        }
        // Rule 2: only the established lead creates named teammates.
        (Some(name), Some(state)) => {
            if state.lead_session_id == request.caller_session_id {
                GateDecision::allow(format!("caller is lead of team '{name}'"))
            } else {
                GateDecision::block(
                    SpawnRule::Rule2,
                    format!("only the team lead may create named teammates in '{name}'"),
                )
            }
        }
        // Background request, no team membership: lightweight lifecycle.
        (None, _) => GateDecision::allow("background spawn"),
    }
}

/// Read-only port onto the externally-written team/session registry.
pub trait TeamDirectory: Send + Sync {
    /// Look up a team by name. `None` means the team does not exist yet.
    fn lookup(&self, team_name: &str) -> Option<TeamState>;
}

/// Filesystem team directory: one `<dir>/<team>.json` file per team,
/// written by the host, read-only here.
pub struct FsTeamDirectory {
    dir: PathBuf,
}

impl FsTeamDirectory {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl TeamDirectory for FsTeamDirectory {
    fn lookup(&self, team_name: &str) -> Option<TeamState> {
        // Team names come from the host payload; refuse anything that would
        // leave the directory.
        if team_name.contains('/') || team_name.contains("..") {
            return None;
        }
        let path = self.dir.join(format!("{team_name}.json"));
        let text = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&text).ok()
    }
}

/// Auditing wrapper around the pure decision function: every verdict is
/// recorded with its full classification inputs, never the request's
/// free-text payload.
pub struct SpawnGate {
    directory: Arc<dyn TeamDirectory>,
    audit: AuditLog,
}

impl SpawnGate {
    pub fn new(directory: Arc<dyn TeamDirectory>, audit: AuditLog) -> Self {
        Self { directory, audit }
    }

    /// Decide and audit one spawn request.
    pub fn check(&self, request: &SpawnRequest) -> GateDecision {
        let team = request
            .team_name
            .as_deref()
            .and_then(|name| self.directory.lookup(name));
        let decision = decide(request, team.as_ref());

        let kind = if decision.allow {
            AuditKind::SpawnAllowed
        } else {
            AuditKind::SpawnBlocked
        };
        let outcome = if decision.allow { "allow" } else { "block" };
        self.audit.append(
            &AuditRecord::new(kind, outcome)
                .with_reason(&decision.message)
                .with_spawn_inputs(
                    &request.subagent_type,
                    request.teammate_name.clone(),
                    request.team_name.clone(),
                    request.run_in_background,
                    &request.caller_session_id,
                ),
        );
        obs::emit_gate_decided(&request.subagent_type, decision.allow, &decision.message);
        decision
    }

    /// Record a malformed hook payload. The gate fails open on these, but
    /// the anomaly is still visible in the trail.
    pub fn audit_parse_anomaly(&self, detail: &str) {
        self.audit.append(
            &AuditRecord::new(AuditKind::SpawnAllowed, "allow")
                .with_reason(format!("unparseable hook input, failing open: {detail}")),
        );
    }
}
