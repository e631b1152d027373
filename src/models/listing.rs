use serde::{Deserialize, Serialize};

/// Value stored in `salary` (and `address` as a last resort) when a listing
/// does not publish the field.
pub const NOT_SPECIFIED: &str = "not specified";

/// One job posting. `link` is the dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub link: String,
    pub position: String,
    pub salary: String,
    pub company: String,
    pub address: String,
}

/// Search parameters shared by every collection run of the process.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub main_tag: String,
    pub cities: Vec<String>,
    /// All of these must appear in a listing's description. Empty accepts everything.
    pub extra_tags: Vec<String>,
    pub page_count: u32,
}

/// Outcome of fetching a single listing's detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detail {
    Found(ListingRecord),
    /// The listing did not pass the keyword filter.
    Skipped,
}
