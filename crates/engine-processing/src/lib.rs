pub mod chunk;
pub mod error;
pub mod reader;
pub mod state_manager;
pub mod transform;
pub mod writer;
