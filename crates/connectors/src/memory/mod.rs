pub mod fault;
pub mod sink;
pub mod table;
