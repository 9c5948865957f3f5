pub mod connectors;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod progress;
pub mod retry;
pub mod state;
pub mod step;
