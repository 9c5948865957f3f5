pub mod chunk;
pub mod user;
