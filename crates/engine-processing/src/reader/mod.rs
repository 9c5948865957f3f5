pub mod list;
pub mod paging;
