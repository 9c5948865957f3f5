use model::pagination::key_range::KeyRange;

/// Deterministic failures a [`MemorySink`](super::sink::MemorySink) injects
/// into its transactions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FaultPlan {
    #[default]
    None,

    /// Any chunk holding a key inside the range is rejected while staging.
    /// Rejections are permanent, so a partition covering the range always fails.
    RejectKeys(KeyRange),

    /// The commit with this 0-based attempt number fails; everything else
    /// commits.
    FailCommit(u64),

    /// The next `n` commits fail with a transient error.
    TransientCommits(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fault {
    Reject,
    Fail,
    Transient,
}

#[derive(Debug, Default)]
pub(crate) struct FaultState {
    plan: FaultPlan,
    commit_attempts: u64,
}

impl FaultState {
    pub(crate) fn new(plan: FaultPlan) -> Self {
        Self {
            plan,
            commit_attempts: 0,
        }
    }

    pub(crate) fn on_stage(&self, keys: impl IntoIterator<Item = i64>) -> Option<Fault> {
        match &self.plan {
            FaultPlan::RejectKeys(range) => keys
                .into_iter()
                .any(|k| range.contains(k))
                .then_some(Fault::Reject),
            _ => None,
        }
    }

    pub(crate) fn on_commit(&mut self) -> Option<Fault> {
        let attempt = self.commit_attempts;
        self.commit_attempts += 1;
        match &mut self.plan {
            FaultPlan::FailCommit(n) if *n == attempt => Some(Fault::Fail),
            FaultPlan::TransientCommits(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Some(Fault::Transient)
            }
            _ => None,
        }
    }
}
