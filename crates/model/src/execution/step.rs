use crate::{
    core::identifiers::PartitionId,
    execution::{partition::PartitionContext, status::ExecutionStatus},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Item and chunk counters of a step execution.
///
/// For a successful step `read == written + filtered` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounts {
    pub read: u64,
    pub written: u64,
    pub filtered: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

impl StepCounts {
    /// Items read but neither written nor filtered: the items of a rolled
    /// back chunk, or of a partial chunk abandoned on a read error.
    pub fn unaccounted(&self) -> u64 {
        self.read.saturating_sub(self.written + self.filtered)
    }

    pub fn is_reconciled(&self) -> bool {
        self.read == self.written + self.filtered
    }
}

impl AddAssign for StepCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.read += rhs.read;
        self.written += rhs.written;
        self.filtered += rhs.filtered;
        self.commits += rhs.commits;
        self.rollbacks += rhs.rollbacks;
    }
}

/// Run state of one step invocation.
///
/// A partitioned (master) step carries one child execution per partition in
/// `partitions`; its own counts are the sum of its children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub id: String,
    pub step_name: String,
    pub partition: Option<PartitionContext>,
    pub status: ExecutionStatus,
    pub counts: StepCounts,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub partitions: Vec<StepExecution>,
}

/// A failure attributed to the step (and partition) that raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step_name: String,
    pub partition: Option<PartitionId>,
    pub error: String,
}

impl StepExecution {
    pub fn new(step_name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            step_name: step_name.into(),
            partition: None,
            status: ExecutionStatus::Pending,
            counts: StepCounts::default(),
            started_at: None,
            ended_at: None,
            last_error: None,
            partitions: Vec::new(),
        }
    }

    pub fn for_partition(step_name: impl Into<String>, partition: PartitionContext) -> Self {
        Self {
            partition: Some(partition),
            ..Self::new(step_name)
        }
    }

    pub fn start(&mut self) {
        if self.status == ExecutionStatus::Pending {
            self.status = ExecutionStatus::Running;
            self.started_at = Some(Utc::now());
        }
    }

    pub fn complete(&mut self) {
        self.finish(ExecutionStatus::Completed, None);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.finish(ExecutionStatus::Failed, Some(error.into()));
    }

    fn finish(&mut self, status: ExecutionStatus, error: Option<String>) {
        if self.status.is_terminal() {
            return;
        }
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        self.status = status;
        self.ended_at = Some(Utc::now());
        if error.is_some() {
            self.last_error = error;
        }
    }

    pub fn items_read(&self) -> u64 {
        self.counts.read
    }

    pub fn items_written(&self) -> u64 {
        self.counts.written
    }

    pub fn items_filtered(&self) -> u64 {
        self.counts.filtered
    }

    pub fn partition_id(&self) -> Option<PartitionId> {
        self.partition.map(|p| p.id())
    }

    /// Completed, and so is every partition underneath it.
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed && self.partitions.iter().all(|p| p.is_success())
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.ended_at) {
            (Some(s), Some(e)) => Some((e - s).num_milliseconds()),
            _ => None,
        }
    }

    /// Every failure in this execution tree, partitions first.
    pub fn failures(&self) -> Vec<StepFailure> {
        let mut out: Vec<StepFailure> = self.partitions.iter().flat_map(|p| p.failures()).collect();
        if self.status == ExecutionStatus::Failed && out.is_empty() {
            out.push(StepFailure {
                step_name: self.step_name.clone(),
                partition: self.partition_id(),
                error: self
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::key_range::KeyRange;

    #[test]
    fn terminal_status_is_final() {
        let mut step = StepExecution::new("load");
        step.start();
        step.fail("boom");
        step.complete();

        assert_eq!(step.status, ExecutionStatus::Failed);
        assert_eq!(step.last_error.as_deref(), Some("boom"));
        assert!(step.ended_at.is_some());
    }

    #[test]
    fn failures_are_attributed_to_partitions() {
        let mut master = StepExecution::new("master");
        master.start();

        let mut ok = StepExecution::for_partition(
            "worker:partition0",
            PartitionContext::new(PartitionId(0), KeyRange::new(1, 10)),
        );
        ok.complete();
        let mut bad = StepExecution::for_partition(
            "worker:partition1",
            PartitionContext::new(PartitionId(1), KeyRange::new(11, 20)),
        );
        bad.fail("sink down");

        master.partitions = vec![ok, bad];
        master.fail("1 of 2 partitions failed");

        let failures = master.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].partition, Some(PartitionId(1)));
        assert_eq!(failures[0].error, "sink down");
        assert!(!master.is_success());
    }

    #[test]
    fn counts_accumulate() {
        let mut total = StepCounts::default();
        total += StepCounts {
            read: 10,
            written: 8,
            filtered: 2,
            commits: 1,
            rollbacks: 0,
        };
        total += StepCounts {
            read: 5,
            written: 0,
            filtered: 0,
            commits: 0,
            rollbacks: 1,
        };
        assert_eq!(total.read, 15);
        assert_eq!(total.unaccounted(), 5);
        assert!(!total.is_reconciled());
    }
}
