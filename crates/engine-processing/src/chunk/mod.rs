pub mod id;
pub mod step;
mod worker;
