pub mod error;
pub mod job;
pub mod launcher;
pub mod partition;
pub mod tasklet;
