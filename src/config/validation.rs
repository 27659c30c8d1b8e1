use crate::config::types::{
    Config, CrawlerConfig, IdentityConfig, SelectorConfig, SiteConfig, StorageConfig,
};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_crawler_config(&config.crawler)?;
    validate_identity_config(&config.identity)?;
    validate_storage_config(&config.storage)?;
    validate_selector_config(&config.selectors)?;
    validate_categories(&config.categories)?;
    Ok(())
}

/// Validates the site name and URL templates
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    if config.name.is_empty() {
        return Err(ConfigError::Validation("site name cannot be empty".to_string()));
    }

    // The name prefixes queue keys and store rows
    if !config
        .name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "site name must contain only alphanumeric characters, '_' and '-', got '{}'",
            config.name
        )));
    }

    validate_template("category-url", &config.category_url, "{category}")?;
    validate_template("content-url", &config.content_url, "{job_id}")?;

    if config.page_param.is_empty() {
        return Err(ConfigError::Validation(
            "page-param cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates a URL template: it must carry its placeholder and parse as http(s)
fn validate_template(name: &str, template: &str, placeholder: &str) -> Result<(), ConfigError> {
    if !template.contains(placeholder) {
        return Err(ConfigError::Validation(format!(
            "{} must contain the {} placeholder, got '{}'",
            name, placeholder, template
        )));
    }

    let sample = template.replace(placeholder, "sample");
    let url = Url::parse(&sample)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, template, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} must use http or https, got '{}'",
            name, template
        )));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("listing-workers", config.listing_workers),
        ("content-workers", config.content_workers),
        ("recovery-workers", config.recovery_workers),
    ] {
        if !(1..=64).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "{} must be between 1 and 64, got {}",
                name, value
            )));
        }
    }

    if config.day_limit < 1 {
        return Err(ConfigError::Validation(format!(
            "day-limit must be >= 1, got {}",
            config.day_limit
        )));
    }

    if config.pop_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "pop-timeout-ms must be >= 100ms, got {}ms",
            config.pop_timeout_ms
        )));
    }

    for (name, value) in [
        ("max-redirects", config.max_redirects),
        ("listing-max-redirects", config.listing_max_redirects),
        ("max-content-misses", config.max_content_misses),
        ("escalation-threshold", config.escalation_threshold),
        ("max-unknown-failures", config.max_unknown_failures),
        ("max-skipped-pages", config.max_skipped_pages),
        ("max-empty-pops", config.max_empty_pops),
    ] {
        if value < 1 {
            return Err(ConfigError::Validation(format!(
                "{} must be >= 1, got {}",
                name, value
            )));
        }
    }

    Ok(())
}

/// Validates identity configuration
fn validate_identity_config(config: &IdentityConfig) -> Result<(), ConfigError> {
    if config.user_agents.is_empty() {
        return Err(ConfigError::Validation(
            "user-agents must list at least one value".to_string(),
        ));
    }

    if config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user-agents cannot contain empty values".to_string(),
        ));
    }

    if config.proxy_list_url.is_some() && config.proxy_file.is_some() {
        return Err(ConfigError::Validation(
            "proxy-list-url and proxy-file are mutually exclusive".to_string(),
        ));
    }

    if let Some(list_url) = &config.proxy_list_url {
        Url::parse(list_url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid proxy-list-url '{}': {}", list_url, e))
        })?;
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if matches!(&config.queue_key, Some(key) if key.is_empty()) {
        return Err(ConfigError::Validation(
            "queue-key cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates that every configured selector parses
fn validate_selector_config(config: &SelectorConfig) -> Result<(), ConfigError> {
    validate_selector(&config.article)?;

    if config.job_id_attr.is_empty() {
        return Err(ConfigError::Validation(
            "job-id-attr cannot be empty".to_string(),
        ));
    }

    if config.content.is_empty() {
        return Err(ConfigError::Validation(
            "content must list at least one selector".to_string(),
        ));
    }

    let optional = [
        &config.subcategory,
        &config.title,
        &config.company,
        &config.location,
        &config.salary,
        &config.listing_date,
        &config.summary,
        &config.sponsored,
        &config.expired,
        &config.zero_results,
    ];

    for selector in optional.into_iter().flatten() {
        validate_selector(selector)?;
    }

    for selector in &config.content {
        validate_selector(selector)?;
    }

    Ok(())
}

fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))
}

/// Validates category names
fn validate_categories(categories: &[String]) -> Result<(), ConfigError> {
    if categories.is_empty() {
        return Err(ConfigError::Validation(
            "at least one category is required".to_string(),
        ));
    }

    if let Some(empty) = categories.iter().find(|c| c.trim().is_empty()) {
        return Err(ConfigError::Validation(format!(
            "category names cannot be blank, got '{}'",
            empty
        )));
    }

    Ok(())
}
