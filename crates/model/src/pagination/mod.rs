pub mod cursor;
pub mod key_range;
pub mod page;
