pub mod processor;
pub mod reader;
pub mod sink;
pub mod source;
pub mod writer;
