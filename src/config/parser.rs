use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Reads, parses and validates the harvester config at `path`
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    load_config_with_hash(path).map(|(config, _)| config)
}

/// Parses and validates configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Hex SHA-256 of the config file
///
/// Recorded with every session so runs made with different settings can be
/// told apart.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    Ok(hash_config_text(&std::fs::read_to_string(path)?))
}

fn hash_config_text(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Loads a config and the hash of exactly the text that was parsed
///
/// # Returns
///
/// * `Ok((Config, String))` - The validated config and its hash
/// * `Err(ConfigError)` - The file could not be read, parsed or validated
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_config_text(&content)))
}

#[cfg(test)]
pub(crate) const SAMPLE_CONFIG: &str = r#"
categories = ["Accounting", "Information Technology"]

[site]
name = "jora"
category-url = "https://au.jora.com/findjobs/{category}"
listing-query = "st=date"
content-url = "https://au.jora.com/job/-{job_id}"

[crawler]
listing-workers = 2
content-workers = 3
day-limit = 1

[identity]
user-agents = ["Mozilla/5.0 (X11; Linux x86_64)", "Mozilla/5.0 (Macintosh)"]

[storage]
database-path = "./jora.db"

[selectors]
subcategory = "div.browse.keyword li a"
article = "li.result"
job-id-attr = "id"
job-id-prefix = "j_"
title = "a.job"
company = "span.company"
location = "span.location"
salary = "div.salary"
listing-date = "span.date"
summary = "div.summary"
content = ["div.summary", "div.templatetext"]
expired = "div[data-automation='expiredJobPage']"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn config_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_sample_site_loads() {
        let file = config_file(SAMPLE_CONFIG);
        let (config, hash) = load_config_with_hash(file.path()).unwrap();

        assert_eq!(config.site.name, "jora");
        assert_eq!(config.site.listing_query.as_deref(), Some("st=date"));
        assert_eq!(config.crawler.listing_workers, 2);
        assert_eq!(config.crawler.content_workers, 3);
        assert_eq!(config.categories, vec!["Accounting", "Information Technology"]);
        assert_eq!(config.selectors.content, vec!["div.summary", "div.templatetext"]);
        assert_eq!(config.storage.queue_key_for("jora"), "jora_queue");
        assert_eq!(hash, compute_config_hash(file.path()).unwrap());
    }

    #[test]
    fn test_crawler_defaults_apply() {
        let config = parse_config(SAMPLE_CONFIG).unwrap();
        assert_eq!(config.crawler.recovery_workers, 10);
        assert_eq!(config.crawler.max_redirects, 3);
        assert_eq!(config.crawler.listing_max_redirects, 4);
        assert_eq!(config.crawler.escalation_threshold, 3);
        assert_eq!(config.crawler.max_unknown_failures, 5);
        assert_eq!(config.crawler.max_skipped_pages, 2);
        assert_eq!(config.crawler.max_empty_pops, 3);
        assert_eq!(config.site.page_param, "page");
        assert!(config.identity.proxy_list_url.is_none());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_config(Path::new("/nonexistent/jora.toml"));
        assert!(matches!(result.unwrap_err(), ConfigError::Io(_)));
    }

    #[test]
    fn test_broken_toml_is_parse_error() {
        let file = config_file("[site\nname = ");
        assert!(matches!(
            load_config(file.path()).unwrap_err(),
            ConfigError::Parse(_)
        ));
    }

    #[test]
    fn test_zero_content_workers_rejected() {
        let content = SAMPLE_CONFIG.replace("content-workers = 3", "content-workers = 0");
        assert!(matches!(
            parse_config(&content).unwrap_err(),
            ConfigError::Validation(_)
        ));
    }

    #[test]
    fn test_hash_tracks_settings() {
        let original = config_file(SAMPLE_CONFIG);
        let tuned = config_file(&SAMPLE_CONFIG.replace("day-limit = 1", "day-limit = 2"));

        let first = compute_config_hash(original.path()).unwrap();
        assert_eq!(first, compute_config_hash(original.path()).unwrap());
        assert_eq!(first.len(), 64);
        assert_ne!(first, compute_config_hash(tuned.path()).unwrap());
    }
}
