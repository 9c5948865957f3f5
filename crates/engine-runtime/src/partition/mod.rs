pub mod bounds;
pub mod factory;
pub mod partitioner;
pub mod step;
