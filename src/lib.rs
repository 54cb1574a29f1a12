pub mod core;
pub mod features;
pub mod scraping;
pub mod search;

// --- Primary exports ---
pub use crate::core::config;
pub use crate::core::types::{HtmlResponse, SearchOptions, SearchResponse, SearchResult};
pub use crate::core::SearchError;
pub use crate::scraping::browser_manager::BrowserHandle;
pub use crate::search::{fetch_result_page_markup, run_search, try_search};

// --- Component module paths ---
pub use crate::features::{challenge, fingerprint, mode, session_store};
pub use crate::scraping::{browser_manager, extract};
