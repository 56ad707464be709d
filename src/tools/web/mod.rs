//! Web tools: search and page text extraction

mod search;
mod text;

pub use search::{BraveSearch, SearchResult, format_results};
pub use text::{MAX_PAGE_TEXT_CHARS, visible_text};
