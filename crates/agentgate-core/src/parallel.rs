//! Parallel coordinator: runs validated invocations under a concurrency cap
//! with per-task timeouts and deterministic aggregation.
//!
//! Execution itself is external — the host implements [`TaskExecutor`] and
//! owns every side effect. A timeout here only stops *waiting*: the result
//! flips to canceled, the batch moves on, and the host-side work may still
//! be in flight. Results always come back in submission order, one per
//! submitted task, regardless of completion order.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::debug;
use uuid::Uuid;

use crate::audit::{AuditKind, AuditLog, AuditRecord};
use crate::domain::error::{PolicyError, Result};
use crate::obs;
use crate::prepare::InvocationBundle;

/// Default worker-pool size.
pub const DEFAULT_CONCURRENCY_CAP: usize = 4;

/// Port the host implements to actually execute a bundle.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Execute one bundle to completion, returning its result payload or an
    /// error message.
    async fn execute(
        &self,
        bundle: &InvocationBundle,
    ) -> std::result::Result<serde_json::Value, String>;
}

/// One unit submitted to the coordinator.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    /// Caller-supplied key, unique within a batch.
    pub correlation_id: String,
    pub bundle: InvocationBundle,
    /// Per-task override of the batch timeout.
    pub timeout: Option<Duration>,
}

impl TaskRequest {
    pub fn new(correlation_id: impl Into<String>, bundle: InvocationBundle) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            bundle,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Outcome of one submitted task. Exactly one per [`TaskRequest`], always.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub correlation_id: String,
    pub success: bool,
    pub canceled: bool,
    pub aborted_by: Option<String>,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl TaskResult {
    fn ok(correlation_id: String, data: serde_json::Value) -> Self {
        Self {
            correlation_id,
            success: true,
            canceled: false,
            aborted_by: None,
            data: Some(data),
            error: None,
        }
    }

    fn failed(correlation_id: String, error: String) -> Self {
        Self {
            correlation_id,
            success: false,
            canceled: false,
            aborted_by: None,
            data: None,
            error: Some(error),
        }
    }

    fn timed_out(correlation_id: String, timeout: Duration) -> Self {
        Self {
            correlation_id,
            success: false,
            canceled: true,
            aborted_by: Some("timeout".to_string()),
            data: None,
            error: Some(format!(
                "task exceeded its {}s deadline",
                timeout.as_secs_f64()
            )),
        }
    }
}

/// Batch totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Aggregated batch outcome: results in submission order, length equal to
/// the submitted count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationReport {
    pub concurrency_cap: usize,
    pub per_task_timeout_secs: u64,
    pub results: Vec<TaskResult>,
    pub summary: BatchSummary,
}

/// Run a batch of already-validated invocations.
///
/// Rejects duplicate correlation ids up front with `VALIDATION.INPUT`;
/// after dispatch no task is ever silently dropped. A worker that panics in
/// the host executor is reported as a failed result, not an aborted batch.
pub async fn run_batch(
    executor: Arc<dyn TaskExecutor>,
    tasks: Vec<TaskRequest>,
    concurrency_cap: usize,
    per_task_timeout: Duration,
    audit: &AuditLog,
) -> Result<AggregationReport> {
    let cap = concurrency_cap.max(1);

    let mut seen = HashSet::new();
    for task in &tasks {
        if !seen.insert(task.correlation_id.clone()) {
            return Err(PolicyError::InvalidInput(format!(
                "duplicate correlation_id '{}' in batch",
                task.correlation_id
            )));
        }
    }

    let submitted = tasks.len();
    let batch_id = Uuid::new_v4().to_string();
    obs::emit_batch_started(&batch_id, submitted, cap, per_task_timeout.as_secs());

    let correlation_ids: Vec<String> =
        tasks.iter().map(|t| t.correlation_id.clone()).collect();
    let semaphore = Arc::new(Semaphore::new(cap));
    let mut handles = Vec::with_capacity(submitted);

    for task in tasks {
        let executor = Arc::clone(&executor);
        let semaphore = Arc::clone(&semaphore);
        let audit = audit.clone();
        let deadline = task.timeout.unwrap_or(per_task_timeout);

        handles.push(tokio::spawn(async move {
            // Closing the semaphore is not part of this protocol, so the
            // only acquire failure mode is unreachable.
            let _permit = semaphore
                .acquire()
                .await
                .expect("batch semaphore never closed");

            let started = std::time::Instant::now();
            let correlation_id = task.correlation_id.clone();
            debug!(event = "batch.task_dispatched", correlation_id = %correlation_id);

            let result =
                match tokio::time::timeout(deadline, executor.execute(&task.bundle)).await {
                    Ok(Ok(data)) => TaskResult::ok(correlation_id, data),
                    Ok(Err(message)) => TaskResult::failed(correlation_id, message),
                    Err(_) => TaskResult::timed_out(correlation_id, deadline),
                };

            let outcome = if result.success {
                "ok"
            } else if result.canceled {
                "timeout"
            } else {
                "failed"
            };
            audit.append(
                &AuditRecord::new(AuditKind::TaskOutcome, outcome)
                .with_correlation(&result.correlation_id)
                .with_agent(
                    &task.bundle.agent,
                    &task.bundle.version,
                    &task.bundle.digest,
                )
                .with_duration(started.elapsed().as_millis() as u64),
            );
            result
        }));
    }

    // Reassemble in submission order; completion order is irrelevant.
    let mut results = Vec::with_capacity(submitted);
    for (index, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(result) => results.push(result),
            Err(join_err) => {
                // The worker itself died (host executor panic). Still one
                // result per task, under the submitted correlation id.
                results.push(TaskResult::failed(
                    correlation_ids[index].clone(),
                    format!("worker failed: {join_err}"),
                ));
            }
        }
    }

    let succeeded = results.iter().filter(|r| r.success).count();
    let summary = BatchSummary {
        succeeded,
        failed: submitted - succeeded,
    };
    obs::emit_batch_finished(&batch_id, submitted, summary.succeeded, summary.failed);

    Ok(AggregationReport {
        concurrency_cap: cap,
        per_task_timeout_secs: per_task_timeout.as_secs(),
        results,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bundle(agent: &str) -> InvocationBundle {
        InvocationBundle {
            agent: agent.to_string(),
            path: std::path::PathBuf::from(format!("agents/{agent}.md")),
            version: "1.0.0".to_string(),
            digest: "0".repeat(64),
            params: BTreeMap::new(),
            timeout_secs: 30,
            audit_path: std::path::PathBuf::from("audit.ndjson"),
        }
    }

    fn make_audit() -> (tempfile::TempDir, AuditLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("audit.ndjson")).unwrap();
        (dir, log)
    }

    /// Executor that sleeps a per-agent duration, then echoes the agent name.
    struct SleepyExecutor {
        delays: BTreeMap<String, Duration>,
        in_flight: AtomicUsize,
        observed_max: AtomicUsize,
    }

    impl SleepyExecutor {
        fn new(delays: &[(&str, u64)]) -> Self {
            Self {
                delays: delays
                    .iter()
                    .map(|(a, ms)| (a.to_string(), Duration::from_millis(*ms)))
                    .collect(),
                in_flight: AtomicUsize::new(0),
                observed_max: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TaskExecutor for SleepyExecutor {
        async fn execute(
            &self,
            bundle: &InvocationBundle,
        ) -> std::result::Result<serde_json::Value, String> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.observed_max.fetch_max(current, Ordering::SeqCst);

            let delay = self
                .delays
                .get(&bundle.agent)
                .copied()
                .unwrap_or(Duration::from_millis(1));
            tokio::time::sleep(delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(serde_json::json!({ "agent": bundle.agent }))
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl TaskExecutor for FailingExecutor {
        async fn execute(
            &self,
            bundle: &InvocationBundle,
        ) -> std::result::Result<serde_json::Value, String> {
            Err(format!("{} exploded", bundle.agent))
        }
    }

    #[tokio::test]
    async fn test_batch_completeness_and_order() {
        let (_dir, audit) = make_audit();
        // Reverse-sorted delays so completion order inverts submission order.
        let executor = Arc::new(SleepyExecutor::new(&[
            ("a", 40),
            ("b", 30),
            ("c", 20),
            ("d", 10),
        ]));
        let tasks: Vec<TaskRequest> = ["a", "b", "c", "d"]
            .iter()
            .map(|name| TaskRequest::new(format!("task-{name}"), bundle(name)))
            .collect();

        let report = run_batch(executor, tasks, 4, Duration::from_secs(5), &audit)
            .await
            .unwrap();

        assert_eq!(report.results.len(), 4);
        let ids: Vec<&str> = report
            .results
            .iter()
            .map(|r| r.correlation_id.as_str())
            .collect();
        assert_eq!(ids, vec!["task-a", "task-b", "task-c", "task-d"]);
        assert_eq!(report.summary.succeeded, 4);
        assert_eq!(report.summary.failed, 0);
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_cap() {
        let (_dir, audit) = make_audit();
        let executor = Arc::new(SleepyExecutor::new(&[
            ("a", 20),
            ("b", 20),
            ("c", 20),
            ("d", 20),
            ("e", 20),
            ("f", 20),
        ]));
        let tasks: Vec<TaskRequest> = ["a", "b", "c", "d", "e", "f"]
            .iter()
            .map(|name| TaskRequest::new(format!("task-{name}"), bundle(name)))
            .collect();

        let report = run_batch(
            Arc::clone(&executor) as Arc<dyn TaskExecutor>,
            tasks,
            2,
            Duration::from_secs(5),
            &audit,
        )
        .await
        .unwrap();

        assert_eq!(report.results.len(), 6);
        assert!(executor.observed_max.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_timeout_isolates_one_task() {
        // Spec scenario 6: five tasks, cap 2, one sleeper past the deadline.
        let (_dir, audit) = make_audit();
        let executor = Arc::new(SleepyExecutor::new(&[
            ("a", 5),
            ("b", 5),
            ("slow", 5_000),
            ("d", 5),
            ("e", 5),
        ]));
        let tasks: Vec<TaskRequest> = ["a", "b", "slow", "d", "e"]
            .iter()
            .map(|name| TaskRequest::new(format!("task-{name}"), bundle(name)))
            .collect();

        let report = run_batch(executor, tasks, 2, Duration::from_millis(100), &audit)
            .await
            .unwrap();

        assert_eq!(report.results.len(), 5);
        let slow = &report.results[2];
        assert!(!slow.success);
        assert!(slow.canceled);
        assert_eq!(slow.aborted_by.as_deref(), Some("timeout"));
        for (i, result) in report.results.iter().enumerate() {
            if i != 2 {
                assert!(result.success, "peer task {i} should be unaffected");
            }
        }
        assert_eq!(report.summary.succeeded, 4);
        assert_eq!(report.summary.failed, 1);
    }

    #[tokio::test]
    async fn test_per_task_timeout_override() {
        let (_dir, audit) = make_audit();
        let executor = Arc::new(SleepyExecutor::new(&[("slow", 200)]));
        let tasks = vec![
            TaskRequest::new("tight", bundle("slow")).with_timeout(Duration::from_millis(20)),
        ];
        let report = run_batch(executor, tasks, 1, Duration::from_secs(5), &audit)
            .await
            .unwrap();
        assert!(report.results[0].canceled);
    }

    #[tokio::test]
    async fn test_duplicate_correlation_ids_rejected() {
        let (_dir, audit) = make_audit();
        let executor = Arc::new(SleepyExecutor::new(&[]));
        let tasks = vec![
            TaskRequest::new("same", bundle("a")),
            TaskRequest::new("same", bundle("b")),
        ];
        let err = run_batch(executor, tasks, 2, Duration::from_secs(1), &audit)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "VALIDATION.INPUT");
        // Nothing dispatched, nothing audited.
        assert!(audit.read_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_executor_failure_is_one_failed_result() {
        let (_dir, audit) = make_audit();
        let tasks = vec![TaskRequest::new("t1", bundle("a"))];
        let report = run_batch(
            Arc::new(FailingExecutor),
            tasks,
            1,
            Duration::from_secs(1),
            &audit,
        )
        .await
        .unwrap();
        let result = &report.results[0];
        assert!(!result.success);
        assert!(!result.canceled);
        assert!(result.error.as_deref().unwrap().contains("exploded"));
    }

    #[tokio::test]
    async fn test_empty_batch_yields_empty_report() {
        let (_dir, audit) = make_audit();
        let executor = Arc::new(SleepyExecutor::new(&[]));
        let report = run_batch(executor, vec![], 4, Duration::from_secs(1), &audit)
            .await
            .unwrap();
        assert!(report.results.is_empty());
        assert_eq!(report.summary.succeeded, 0);
        assert_eq!(report.summary.failed, 0);
    }

    #[tokio::test]
    async fn test_each_task_writes_an_outcome_record() {
        let (_dir, audit) = make_audit();
        let executor = Arc::new(SleepyExecutor::new(&[("a", 1), ("b", 1), ("c", 1)]));
        let tasks: Vec<TaskRequest> = ["a", "b", "c"]
            .iter()
            .map(|name| TaskRequest::new(format!("task-{name}"), bundle(name)))
            .collect();
        run_batch(executor, tasks, 3, Duration::from_secs(5), &audit)
            .await
            .unwrap();

        let records = audit.read_all().unwrap();
        assert_eq!(records.len(), 3);
        let mut ids: Vec<String> = records
            .iter()
            .map(|r| r.correlation_id.clone().unwrap())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["task-a", "task-b", "task-c"]);
        for record in &records {
            assert_eq!(record.kind, AuditKind::TaskOutcome);
            assert!(record.duration_ms.is_some());
        }
    }

    #[tokio::test]
    async fn test_zero_cap_is_clamped_to_one() {
        let (_dir, audit) = make_audit();
        let executor = Arc::new(SleepyExecutor::new(&[("a", 1)]));
        let tasks = vec![TaskRequest::new("t1", bundle("a"))];
        let report = run_batch(executor, tasks, 0, Duration::from_secs(1), &audit)
            .await
            .unwrap();
        assert_eq!(report.concurrency_cap, 1);
        assert!(report.results[0].success);
    }
}
