//! Statistics generation from the job database
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the persistence gateway.

use crate::output::SessionSummary;
use crate::storage::Gateway;
use crate::HarvestError;

/// Harvest statistics for one site
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    pub site: String,

    /// Total number of listings stored
    pub total_jobs: u64,

    /// Listings still waiting for their description
    pub null_content: u64,

    /// Listings whose description is the missing sentinel
    pub missing_content: u64,

    /// Most recent recorded session, if any
    pub last_session: Option<SessionSummary>,
}

impl HarvestStatistics {
    /// Listings that carry a real description
    pub fn with_content(&self) -> u64 {
        self.total_jobs
            .saturating_sub(self.null_content)
            .saturating_sub(self.missing_content)
    }
}

/// Loads statistics from the gateway
///
/// # Arguments
///
/// * `gateway` - The gateway to query
/// * `site` - Site namespace to report on
pub fn load_statistics(gateway: &dyn Gateway, site: &str) -> Result<HarvestStatistics, HarvestError> {
    Ok(HarvestStatistics {
        site: site.to_string(),
        total_jobs: gateway.count_total(site)?,
        null_content: gateway.count_null_content(site)?,
        missing_content: gateway.count_sentinel_content(site)?,
        last_session: gateway.latest_session(site)?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics: {} ===\n", stats.site);

    println!("Overview:");
    println!("  Listings stored: {}", stats.total_jobs);
    println!("  With description: {}", stats.with_content());
    println!("  Missing description: {}", stats.missing_content);
    println!("  Not yet fetched: {}", stats.null_content);

    let coverage = if stats.total_jobs > 0 {
        (stats.with_content() as f64 / stats.total_jobs as f64) * 100.0
    } else {
        0.0
    };
    println!("  Coverage: {:.1}%", coverage);
    println!();

    match &stats.last_session {
        Some(session) => print_session(session),
        None => println!("No sessions recorded yet."),
    }
}

/// Prints one session summary
pub fn print_session(session: &SessionSummary) {
    println!("Session {} -> {}:", session.session_start, session.session_finish);
    println!("  New listings: {}", session.last_session_jobs);
    println!("  Categories: {}", session.total_cat);
    println!("  Avg time per listing: {:.5}s", session.avg_time_info);
    println!("  Avg time per description: {:.5}s", session.avg_time_jd);
    println!("  Avg time per subcategory: {:.5}s", session.avg_time_subcat);
    println!("  Avg time per category: {:.5}s", session.avg_time_cat);

    if !session.counters.is_empty() {
        println!("  Counters:");
        for (name, value) in session.counters.iter() {
            println!("    {}: {}", name, value);
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{JobContent, ListingRecord, SqliteGateway};

    #[test]
    fn test_load_statistics() {
        let gateway = SqliteGateway::new_in_memory().unwrap();
        for id in ["1", "2", "3"] {
            gateway
                .insert_listing("jora", &ListingRecord::new(id))
                .unwrap();
        }
        gateway
            .write_content("jora", "1", &JobContent::Description("x".to_string()))
            .unwrap();
        gateway
            .write_content("jora", "2", &JobContent::Missing)
            .unwrap();

        let stats = load_statistics(&gateway, "jora").unwrap();
        assert_eq!(stats.total_jobs, 3);
        assert_eq!(stats.null_content, 1);
        assert_eq!(stats.missing_content, 1);
        assert_eq!(stats.with_content(), 1);
        assert!(stats.last_session.is_none());
    }
}
