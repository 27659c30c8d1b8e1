use serde::Deserialize;

/// Main configuration structure for Job Harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub identity: IdentityConfig,
    pub storage: StorageConfig,
    pub selectors: SelectorConfig,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Job board description: namespace and URL templates
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Site name, used as the store and queue namespace (e.g. "jora")
    pub name: String,

    /// Category landing page, `{category}` is replaced by the category slug
    #[serde(rename = "category-url")]
    pub category_url: String,

    /// Query parameter carrying the page number on listing pages
    #[serde(rename = "page-param", default = "default_page_param")]
    pub page_param: String,

    /// Extra query appended to every listing page (e.g. "sortmode=ListedDate")
    #[serde(rename = "listing-query", default)]
    pub listing_query: Option<String>,

    /// Job detail page, `{job_id}` is replaced by the job id
    #[serde(rename = "content-url")]
    pub content_url: String,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of categories crawled in parallel by the listing stage
    #[serde(rename = "listing-workers", default = "default_listing_workers")]
    pub listing_workers: u32,

    /// Number of long-lived workers draining the work queue
    #[serde(rename = "content-workers", default = "default_content_workers")]
    pub content_workers: u32,

    /// Number of workers replaying jobs whose content is still missing
    #[serde(rename = "recovery-workers", default = "default_recovery_workers")]
    pub recovery_workers: u32,

    /// Listings older than this many days stop pagination
    #[serde(rename = "day-limit", default = "default_day_limit")]
    pub day_limit: u32,

    /// How long a single queue pop waits for an entry (milliseconds)
    #[serde(rename = "pop-timeout-ms", default = "default_pop_timeout_ms")]
    pub pop_timeout_ms: u64,

    /// Sleep after a transport failure (milliseconds)
    #[serde(rename = "backoff-ms", default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Redirects tolerated on a job page before giving up
    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: u32,

    /// Redirects tolerated on a listing page before abandoning it
    #[serde(
        rename = "listing-max-redirects",
        default = "default_listing_max_redirects"
    )]
    pub listing_max_redirects: u32,

    /// Successful responses without a description before giving up
    #[serde(rename = "max-content-misses", default = "default_max_content_misses")]
    pub max_content_misses: u32,

    /// Consecutive same-kind transport failures that force a pool refresh
    #[serde(rename = "escalation-threshold", default = "default_escalation_threshold")]
    pub escalation_threshold: u32,

    /// Consecutive unclassified failures before giving up
    #[serde(rename = "max-unknown-failures", default = "default_max_unknown_failures")]
    pub max_unknown_failures: u32,

    /// Already-stored ids on one page above which the page counts as skipped
    #[serde(
        rename = "seen-per-page-threshold",
        default = "default_seen_per_page_threshold"
    )]
    pub seen_per_page_threshold: u32,

    /// Consecutive skipped pages that end a subcategory
    #[serde(rename = "max-skipped-pages", default = "default_max_skipped_pages")]
    pub max_skipped_pages: u32,

    /// Consecutive empty queue pops after which a content worker exits
    #[serde(rename = "max-empty-pops", default = "default_max_empty_pops")]
    pub max_empty_pops: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            listing_workers: default_listing_workers(),
            content_workers: default_content_workers(),
            recovery_workers: default_recovery_workers(),
            day_limit: default_day_limit(),
            pop_timeout_ms: default_pop_timeout_ms(),
            backoff_ms: default_backoff_ms(),
            max_redirects: default_max_redirects(),
            listing_max_redirects: default_listing_max_redirects(),
            max_content_misses: default_max_content_misses(),
            escalation_threshold: default_escalation_threshold(),
            max_unknown_failures: default_max_unknown_failures(),
            seen_per_page_threshold: default_seen_per_page_threshold(),
            max_skipped_pages: default_max_skipped_pages(),
            max_empty_pops: default_max_empty_pops(),
        }
    }
}

/// Outbound identity configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// User-Agent header values rotated across requests
    #[serde(rename = "user-agents")]
    pub user_agents: Vec<String>,

    /// URL serving a plain `host:port` proxy list, one per line
    #[serde(rename = "proxy-list-url", default)]
    pub proxy_list_url: Option<String>,

    /// Local file with a `host:port` proxy list
    #[serde(rename = "proxy-file", default)]
    pub proxy_file: Option<String>,
}

/// Persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database holding jobs, sessions and the work queue
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Work queue key; defaults to `<site>_queue`
    #[serde(rename = "queue-key", default)]
    pub queue_key: Option<String>,
}

impl StorageConfig {
    /// Resolves the queue key for a site
    pub fn queue_key_for(&self, site: &str) -> String {
        self.queue_key
            .clone()
            .unwrap_or_else(|| format!("{}_queue", site))
    }
}

/// CSS selectors driving the configurable extractor
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    /// Links to subcategories on a category page; absent means the category
    /// page itself is the only listing
    #[serde(default)]
    pub subcategory: Option<String>,

    /// One element per listing entry
    pub article: String,

    /// Attribute of the article element holding the job id
    #[serde(rename = "job-id-attr")]
    pub job_id_attr: String,

    /// Prefix stripped from the job id attribute (e.g. "j_")
    #[serde(rename = "job-id-prefix", default)]
    pub job_id_prefix: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub company: Option<String>,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub salary: Option<String>,

    #[serde(rename = "listing-date", default)]
    pub listing_date: Option<String>,

    #[serde(default)]
    pub summary: Option<String>,

    #[serde(default)]
    pub sponsored: Option<String>,

    /// Description containers on a job page, tried in order
    pub content: Vec<String>,

    /// Marker present on expired job pages
    #[serde(default)]
    pub expired: Option<String>,

    /// Marker present on listing pages without results
    #[serde(rename = "zero-results", default)]
    pub zero_results: Option<String>,
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_listing_workers() -> u32 {
    4
}

fn default_content_workers() -> u32 {
    5
}

fn default_recovery_workers() -> u32 {
    10
}

fn default_day_limit() -> u32 {
    1
}

fn default_pop_timeout_ms() -> u64 {
    10_000
}

fn default_backoff_ms() -> u64 {
    100
}

fn default_max_redirects() -> u32 {
    3
}

fn default_listing_max_redirects() -> u32 {
    4
}

fn default_max_content_misses() -> u32 {
    3
}

fn default_escalation_threshold() -> u32 {
    3
}

fn default_max_unknown_failures() -> u32 {
    5
}

fn default_seen_per_page_threshold() -> u32 {
    3
}

fn default_max_skipped_pages() -> u32 {
    2
}

fn default_max_empty_pops() -> u32 {
    3
}
