//! Extraction of listing and job-page fields from raw HTML
//!
//! The crawl stages never look inside a page themselves; they ask an
//! [`Extractor`] for URLs, listing entries, listing records and job
//! descriptions. [`SelectorExtractor`] implements this from CSS selectors in
//! the configuration.

pub mod dates;
mod selector;

pub use selector::SelectorExtractor;

use crate::storage::ListingRecord;

/// A subcategory link found on a category page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subcategory {
    pub name: String,
    pub url: String,
}

/// One raw listing entry cut out of a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub job_id: String,
    pub html: String,
}

/// Result of extracting one listing entry
#[derive(Debug, Clone, PartialEq)]
pub struct ListingExtraction {
    /// `None` when the entry is outside the day window
    pub record: Option<ListingRecord>,

    /// False once a posting older than the day window is reached
    pub within_day_limit: bool,
}

/// Site-specific page understanding
///
/// All methods are synchronous and take page text, so no parsed document is
/// ever held across an await point.
pub trait Extractor: Send + Sync {
    // ===== URLs =====

    /// Landing page of a category
    fn category_url(&self, category: &str) -> String;

    /// A numbered page of a subcategory listing (pages start at 1)
    fn listing_page_url(&self, subcategory_url: &str, page: u32) -> Result<String, url::ParseError>;

    /// Detail page of one job
    fn content_url(&self, job_id: &str) -> String;

    // ===== Listing pages =====

    /// Subcategory links on a category page; relative links are resolved
    /// against `base_url`
    fn list_subcategories(&self, page: &str, base_url: &str) -> Vec<Subcategory>;

    /// Listing entries on a listing page, in page order
    fn listing_entries(&self, page: &str) -> Vec<ListingEntry>;

    /// True when the page states it has no results
    fn is_zero_results(&self, page: &str) -> bool;

    /// Extracts a listing record and checks it against the day window
    fn extract_listing(&self, entry: &ListingEntry, day_limit: u32) -> ListingExtraction;

    // ===== Job pages =====

    /// Job description, if the page carries one
    fn extract_content(&self, page: &str) -> Option<String>;

    /// True when the page marks the job as expired
    fn is_expired(&self, page: &str) -> bool;
}
