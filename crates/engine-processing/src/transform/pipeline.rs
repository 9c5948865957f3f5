use engine_core::{connectors::processor::ItemProcessor, error::ProcessError};
use std::{marker::PhantomData, sync::Arc};

/// Passes every item through unchanged.
pub struct PassThrough<T>(PhantomData<fn(T) -> T>);

impl<T> PassThrough<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for PassThrough<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ItemProcessor<T, T> for PassThrough<T> {
    fn process(&self, item: T) -> Result<Option<T>, ProcessError> {
        Ok(Some(item))
    }
}

/// Keeps the items matching `predicate`, filters out the rest.
pub fn filter<T, P>(predicate: P) -> impl ItemProcessor<T, T>
where
    P: Fn(&T) -> bool + Send + Sync,
{
    move |item: T| -> Result<Option<T>, ProcessError> { Ok(predicate(&item).then_some(item)) }
}

/// Infallible one-to-one mapping.
pub fn map<I, O, F>(f: F) -> impl ItemProcessor<I, O>
where
    F: Fn(I) -> O + Send + Sync,
{
    move |item: I| -> Result<Option<O>, ProcessError> { Ok(Some(f(item))) }
}

pub trait ProcessorPipelineExt<T> {
    fn add_if<P, F>(self, condition: bool, factory: F) -> Self
    where
        P: ItemProcessor<T, T> + 'static,
        F: FnOnce() -> P;
}

/// Chains same-typed processors. The first stage that filters an item (or
/// fails) ends its trip through the pipeline.
pub struct ProcessorPipeline<T> {
    stages: Vec<Arc<dyn ItemProcessor<T, T>>>,
}

impl<T> Clone for ProcessorPipeline<T> {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
        }
    }
}

impl<T> ProcessorPipeline<T> {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn add_stage<P: ItemProcessor<T, T> + 'static>(mut self, stage: P) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl<T> ProcessorPipelineExt<T> for ProcessorPipeline<T> {
    fn add_if<P, F>(mut self, condition: bool, factory: F) -> Self
    where
        P: ItemProcessor<T, T> + 'static,
        F: FnOnce() -> P,
    {
        if condition {
            self = self.add_stage(factory());
        }
        self
    }
}

impl<T> Default for ProcessorPipeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ItemProcessor<T, T> for ProcessorPipeline<T> {
    fn process(&self, item: T) -> Result<Option<T>, ProcessError> {
        let mut current = item;
        for stage in &self.stages {
            match stage.process(current)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}
