//! Append-only audit trail: newline-delimited JSON, one record per line.
//!
//! The sink is the only shared mutable resource in the engine, so all writes
//! go through a single mutex-protected file handle rather than relying on
//! filesystem atomicity. Records carry structural metadata only — agent
//! names, versions, digests, outcomes — never secret values or free-text
//! tool payloads.
//!
//! A failed append is reported via `tracing::warn!` and never aborts the
//! caller's primary operation. This is the deliberate asymmetry against the
//! fail-closed validator.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::error::{PolicyError, Result};

/// The record kinds the engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Validation,
    SpawnAllowed,
    SpawnBlocked,
    TaskOutcome,
}

/// One audit trail entry. Write-once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: AuditKind,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subagent_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teammate_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_in_background: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl AuditRecord {
    /// A bare record of the given kind and outcome; subject fields start
    /// empty and are filled by the `with_*` builders.
    pub fn new(kind: AuditKind, outcome: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            outcome: outcome.into(),
            reason: None,
            agent: None,
            version: None,
            digest: None,
            subagent_type: None,
            teammate_name: None,
            team_name: None,
            run_in_background: None,
            session_id: None,
            correlation_id: None,
            duration_ms: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_agent(
        mut self,
        agent: impl Into<String>,
        version: impl Into<String>,
        digest: impl Into<String>,
    ) -> Self {
        self.agent = Some(agent.into());
        self.version = Some(version.into());
        self.digest = Some(digest.into());
        self
    }

    pub fn with_spawn_inputs(
        mut self,
        subagent_type: impl Into<String>,
        teammate_name: Option<String>,
        team_name: Option<String>,
        run_in_background: bool,
        session_id: impl Into<String>,
    ) -> Self {
        self.subagent_type = Some(subagent_type.into());
        self.teammate_name = teammate_name;
        self.team_name = team_name;
        self.run_in_background = Some(run_in_background);
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Durable, append-only audit sink. Cheap to clone; all clones share one
/// serialized writer.
#[derive(Clone)]
pub struct AuditLog {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl AuditLog {
    /// Open (or create) the audit file in append mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| PolicyError::AuditIo(e.to_string()))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| PolicyError::AuditIo(e.to_string()))?;
        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Path of the underlying audit file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Never fails the caller: write errors are logged
    /// and swallowed.
    pub fn append(&self, record: &AuditRecord) {
        if let Err(e) = self.try_append(record) {
            warn!(event = "audit.append_failed", error = %e, path = %self.path.display());
        }
    }

    fn try_append(&self, record: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = self
            .file
            .lock()
            .map_err(|_| PolicyError::AuditIo("audit writer poisoned".to_string()))?;
        file.write_all(line.as_bytes())
            .map_err(|e| PolicyError::AuditIo(e.to_string()))?;
        Ok(())
    }

    /// Read the full trail back. Used by tests and the CLI.
    pub fn read_all(&self) -> Result<Vec<AuditRecord>> {
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| PolicyError::AuditIo(e.to_string()))?;
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(PolicyError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_log() -> (tempfile::TempDir, AuditLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("audit.ndjson")).unwrap();
        (dir, log)
    }

    #[test]
    fn test_append_and_read_back() {
        let (_dir, log) = make_log();
        log.append(
            &AuditRecord::new(AuditKind::Validation, "prepared")
                .with_agent("agent-a", "1.0.0", "deadbeef"),
        );
        log.append(
            &AuditRecord::new(AuditKind::SpawnBlocked, "block").with_reason("rule 1"),
        );

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, AuditKind::Validation);
        assert_eq!(records[0].agent.as_deref(), Some("agent-a"));
        assert_eq!(records[1].kind, AuditKind::SpawnBlocked);
        assert_eq!(records[1].reason.as_deref(), Some("rule 1"));
    }

    #[test]
    fn test_records_are_one_json_object_per_line() {
        let (_dir, log) = make_log();
        for i in 0..3 {
            log.append(
                &AuditRecord::new(AuditKind::TaskOutcome, "ok")
                    .with_correlation(format!("task-{i}")),
            );
        }
        let text = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in lines {
            serde_json::from_str::<AuditRecord>(line).expect("each line parses alone");
        }
    }

    #[test]
    fn test_concurrent_appends_do_not_interleave() {
        let (_dir, log) = make_log();
        let mut handles = Vec::new();
        for t in 0..8 {
            let log = log.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..25 {
                    log.append(
                        &AuditRecord::new(AuditKind::TaskOutcome, "ok")
                            .with_correlation(format!("t{t}-{i}")),
                    );
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 200);
    }

    #[test]
    fn test_timestamps_are_monotonic_per_stream() {
        let (_dir, log) = make_log();
        for _ in 0..5 {
            log.append(&AuditRecord::new(AuditKind::Validation, "prepared"));
        }
        let records = log.read_all().unwrap();
        for pair in records.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/audit.ndjson");
        let log = AuditLog::open(&nested).unwrap();
        log.append(&AuditRecord::new(AuditKind::Validation, "prepared"));
        assert!(nested.exists());
    }
}
