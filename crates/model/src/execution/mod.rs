pub mod job;
pub mod partition;
pub mod status;
pub mod step;
