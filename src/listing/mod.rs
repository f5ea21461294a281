//! Listing page parsing and page range summaries.

pub mod page_info;
pub mod parser;

pub use page_info::PageInfo;
pub use parser::{parse_exact_time, parse_list_page, PostRecord};
