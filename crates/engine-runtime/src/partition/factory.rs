use engine_core::{error::BoxError, step::Step};
use model::execution::partition::PartitionContext;

/// Builds the worker step of one partition.
///
/// Called once per partition with the worker's step name and its
/// [`PartitionContext`]; the returned step must scope its reads to the
/// partition's key range.
pub trait StepFactory: Send + Sync {
    fn create(&self, name: &str, partition: &PartitionContext) -> Result<Box<dyn Step>, BoxError>;
}

impl<F> StepFactory for F
where
    F: Fn(&str, &PartitionContext) -> Result<Box<dyn Step>, BoxError> + Send + Sync,
{
    fn create(&self, name: &str, partition: &PartitionContext) -> Result<Box<dyn Step>, BoxError> {
        self(name, partition)
    }
}
