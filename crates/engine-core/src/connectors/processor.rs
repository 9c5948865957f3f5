use crate::error::ProcessError;

/// Maps one input item to zero or one output item.
///
/// Returning `Ok(None)` filters the item out. Implementations must be free of
/// side effects: a rolled back chunk may see its items processed again.
pub trait ItemProcessor<I, O>: Send + Sync {
    fn process(&self, item: I) -> Result<Option<O>, ProcessError>;
}

impl<I, O, F> ItemProcessor<I, O> for F
where
    F: Fn(I) -> Result<Option<O>, ProcessError> + Send + Sync,
{
    fn process(&self, item: I) -> Result<Option<O>, ProcessError> {
        self(item)
    }
}
