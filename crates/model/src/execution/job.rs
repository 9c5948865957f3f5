use crate::execution::{
    status::ExecutionStatus,
    step::{StepCounts, StepExecution, StepFailure},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Run state of one job launch: its step executions in the order they ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    pub run_id: String,
    pub job_name: String,
    pub status: ExecutionStatus,
    pub steps: Vec<StepExecution>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Job-level error that is not attributable to any step.
    pub error: Option<String>,
}

impl JobExecution {
    pub fn new(run_id: impl Into<String>, job_name: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            job_name: job_name.into(),
            status: ExecutionStatus::Pending,
            steps: Vec::new(),
            started_at: None,
            ended_at: None,
            error: None,
        }
    }

    pub fn start(&mut self) {
        if self.status == ExecutionStatus::Pending {
            self.status = ExecutionStatus::Running;
            self.started_at = Some(Utc::now());
        }
    }

    pub fn record_step(&mut self, step: StepExecution) {
        self.steps.push(step);
    }

    /// Finalizes the job: COMPLETED only if every step (and every partition of
    /// every step) completed and no job-level error was recorded.
    pub fn finish(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        let ok = self.error.is_none() && self.steps.iter().all(|s| s.is_success());
        self.status = if ok {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        };
        self.ended_at = Some(Utc::now());
    }

    /// Aborts the job with a fatal error.
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.error = Some(error.into());
        self.status = ExecutionStatus::Failed;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        self.ended_at = Some(Utc::now());
    }

    pub fn step(&self, name: &str) -> Option<&StepExecution> {
        self.steps.iter().find(|s| s.step_name == name)
    }

    pub fn failures(&self) -> Vec<StepFailure> {
        self.steps.iter().flat_map(|s| s.failures()).collect()
    }

    pub fn totals(&self) -> StepCounts {
        let mut total = StepCounts::default();
        for step in &self.steps {
            total += step.counts;
        }
        total
    }

    /// One line per step and partition, suitable for logs.
    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "job '{}' ({}) {}",
            self.job_name, self.run_id, self.status
        )];
        if let Some(err) = &self.error {
            lines.push(format!("  error: {err}"));
        }
        for step in &self.steps {
            lines.push(format!(
                "  step '{}' {} read={} written={} filtered={} commits={} rollbacks={}",
                step.step_name,
                step.status,
                step.counts.read,
                step.counts.written,
                step.counts.filtered,
                step.counts.commits,
                step.counts.rollbacks
            ));
            for part in &step.partitions {
                let range = part
                    .partition
                    .map(|p| p.range().to_string())
                    .unwrap_or_default();
                lines.push(format!(
                    "    {} {} {} read={} written={}{}",
                    part.step_name,
                    range,
                    part.status,
                    part.counts.read,
                    part.counts.written,
                    part.last_error
                        .as_ref()
                        .map(|e| format!(" error={e}"))
                        .unwrap_or_default()
                ));
            }
        }
        lines.join("\n")
    }
}
