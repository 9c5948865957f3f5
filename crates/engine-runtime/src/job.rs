use crate::error::EngineError;
use engine_core::step::Step;

/// Named, ordered sequence of steps.
pub struct Job {
    name: String,
    steps: Vec<Box<dyn Step>>,
}

impl Job {
    pub fn builder(name: impl Into<String>) -> JobBuilder {
        JobBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Box<dyn Step>] {
        &self.steps
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

/// Builds a [`Job`]: `start` with the first step, `next` for each following
/// one.
pub struct JobBuilder {
    name: String,
    steps: Vec<Box<dyn Step>>,
}

impl JobBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn start(mut self, step: impl Step + 'static) -> Self {
        self.steps.clear();
        self.steps.push(Box::new(step));
        self
    }

    pub fn next(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn next_boxed(mut self, step: Box<dyn Step>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn build(self) -> Result<Job, EngineError> {
        if self.steps.is_empty() {
            return Err(EngineError::EmptyJob(self.name));
        }
        Ok(Job {
            name: self.name,
            steps: self.steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasklet::{FnTasklet, TaskletStep};
    use engine_core::{error::TaskletError, step::StepContext};

    fn noop(name: &str) -> TaskletStep {
        TaskletStep::new(
            name,
            FnTasklet::new(|_ctx: StepContext| async { Ok::<(), TaskletError>(()) }),
        )
    }

    #[test]
    fn keeps_steps_in_order() {
        let job = Job::builder("flow")
            .start(noop("a"))
            .next(noop("b"))
            .next(noop("c"))
            .build()
            .unwrap();

        assert_eq!(job.name(), "flow");
        assert_eq!(job.step_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn rejects_jobs_without_steps() {
        assert!(matches!(
            Job::builder("empty").build(),
            Err(EngineError::EmptyJob(name)) if name == "empty"
        ));
    }
}
