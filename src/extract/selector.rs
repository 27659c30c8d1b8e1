//! CSS-selector driven extractor
//!
//! Field rules:
//! - Missing fields are stored as `<missing>`
//! - Location is split into `state` and `area`; full state names become
//!   their abbreviation
//! - Salary periods are normalized (`$24 an hour` -> `$24 hourly`,
//!   `$40,000 - $50,000 a year` -> `$40,000-$50,000 yearly`)
//! - Relative posting dates become absolute timestamps

use crate::config::{SelectorConfig, SiteConfig};
use crate::extract::dates::{parse_relative_age, posted_at, within_day_limit};
use crate::extract::{Extractor, ListingEntry, ListingExtraction, Subcategory};
use crate::storage::{ListingRecord, MISSING_CONTENT};
use crate::ConfigError;
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::{form_urlencoded, Url};

/// State abbreviations and their full names
const STATES: &[(&str, &str)] = &[
    ("NSW", "New South Wales"),
    ("QLD", "Queensland"),
    ("TAS", "Tasmania"),
    ("WA", "Western Australia"),
    ("NT", "Northern Territory"),
    ("SA", "South Australia"),
    ("VIC", "Victoria"),
    ("ACT", "Australian Capital Territory"),
];

const PERIODS: &[(&str, &str)] = &[
    ("hour", "hourly"),
    ("day", "daily"),
    ("week", "weekly"),
    ("month", "monthly"),
    ("year", "yearly"),
];

/// Extractor configured entirely from CSS selectors
#[derive(Debug)]
pub struct SelectorExtractor {
    category_url: String,
    page_param: String,
    listing_query: Option<String>,
    content_url: String,

    subcategory: Option<Selector>,
    article: Selector,
    job_id_attr: String,
    job_id_prefix: Option<String>,
    title: Option<Selector>,
    company: Option<Selector>,
    location: Option<Selector>,
    salary: Option<Selector>,
    listing_date: Option<Selector>,
    summary: Option<Selector>,
    sponsored: Option<Selector>,
    content: Vec<Selector>,
    expired: Option<Selector>,
    zero_results: Option<Selector>,
}

impl SelectorExtractor {
    /// Compiles every configured selector
    pub fn from_config(site: &SiteConfig, selectors: &SelectorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            category_url: site.category_url.clone(),
            page_param: site.page_param.clone(),
            listing_query: site.listing_query.clone(),
            content_url: site.content_url.clone(),

            subcategory: compile_optional(&selectors.subcategory)?,
            article: compile(&selectors.article)?,
            job_id_attr: selectors.job_id_attr.clone(),
            job_id_prefix: selectors.job_id_prefix.clone(),
            title: compile_optional(&selectors.title)?,
            company: compile_optional(&selectors.company)?,
            location: compile_optional(&selectors.location)?,
            salary: compile_optional(&selectors.salary)?,
            listing_date: compile_optional(&selectors.listing_date)?,
            summary: compile_optional(&selectors.summary)?,
            sponsored: compile_optional(&selectors.sponsored)?,
            content: selectors
                .content
                .iter()
                .map(|s| compile(s))
                .collect::<Result<Vec<_>, _>>()?,
            expired: compile_optional(&selectors.expired)?,
            zero_results: compile_optional(&selectors.zero_results)?,
        })
    }

    fn job_id_of(&self, element: &ElementRef<'_>) -> Option<String> {
        let raw = element.value().attr(&self.job_id_attr)?.trim();
        let id = match &self.job_id_prefix {
            Some(prefix) => raw.strip_prefix(prefix.as_str()).unwrap_or(raw),
            None => raw,
        };
        if id.is_empty() {
            None
        } else {
            Some(id.to_string())
        }
    }
}

impl Extractor for SelectorExtractor {
    fn category_url(&self, category: &str) -> String {
        self.category_url.replace("{category}", &category_slug(category))
    }

    fn listing_page_url(&self, subcategory_url: &str, page: u32) -> Result<String, url::ParseError> {
        let mut url = Url::parse(subcategory_url)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair(&self.page_param, &page.to_string());
            if let Some(query) = &self.listing_query {
                for (key, value) in form_urlencoded::parse(query.as_bytes()) {
                    pairs.append_pair(&key, &value);
                }
            }
        }
        Ok(url.to_string())
    }

    fn content_url(&self, job_id: &str) -> String {
        self.content_url.replace("{job_id}", job_id)
    }

    fn list_subcategories(&self, page: &str, base_url: &str) -> Vec<Subcategory> {
        let Some(selector) = &self.subcategory else {
            return Vec::new();
        };
        let Ok(base) = Url::parse(base_url) else {
            return Vec::new();
        };

        let document = Html::parse_document(page);
        let mut seen = HashSet::new();
        let mut subcategories = Vec::new();

        for link in document.select(selector) {
            let name = element_text(&link);
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let Ok(url) = base.join(href) else {
                continue;
            };
            if name.is_empty() || !seen.insert(url.to_string()) {
                continue;
            }
            subcategories.push(Subcategory {
                name,
                url: url.to_string(),
            });
        }

        subcategories
    }

    fn listing_entries(&self, page: &str) -> Vec<ListingEntry> {
        let document = Html::parse_document(page);
        document
            .select(&self.article)
            .filter_map(|article| {
                let job_id = self.job_id_of(&article)?;
                Some(ListingEntry {
                    job_id,
                    html: article.html(),
                })
            })
            .collect()
    }

    fn is_zero_results(&self, page: &str) -> bool {
        match &self.zero_results {
            Some(selector) => Html::parse_document(page).select(selector).next().is_some(),
            None => false,
        }
    }

    fn extract_listing(&self, entry: &ListingEntry, day_limit: u32) -> ListingExtraction {
        let fragment = Html::parse_fragment(&entry.html);
        let mut record = ListingRecord::new(&entry.job_id);

        if let Some(selector) = &self.listing_date {
            let posted = match first_text(&fragment, selector) {
                Some(text) => match parse_relative_age(&text) {
                    Some(age) if !within_day_limit(age, day_limit) => {
                        return ListingExtraction {
                            record: None,
                            within_day_limit: false,
                        };
                    }
                    Some(age) => posted_at(Utc::now(), age),
                    None => MISSING_CONTENT.to_string(),
                },
                None => MISSING_CONTENT.to_string(),
            };
            record.attributes.insert("listing_date".to_string(), posted);
        }

        for (key, selector) in [
            ("title", &self.title),
            ("company", &self.company),
            ("summary", &self.summary),
        ] {
            if let Some(selector) = selector {
                let value = first_text(&fragment, selector).map(|text| {
                    if key == "summary" {
                        text.trim_end_matches(['.', ',', '\u{2026}']).trim_end().to_string()
                    } else {
                        text
                    }
                });
                record.attributes.insert(
                    key.to_string(),
                    value.unwrap_or_else(|| MISSING_CONTENT.to_string()),
                );
            }
        }

        if let Some(selector) = &self.location {
            let location = first_text(&fragment, selector);
            let (state, area) = match &location {
                Some(text) => split_location(text),
                None => (MISSING_CONTENT.to_string(), MISSING_CONTENT.to_string()),
            };
            record.attributes.insert(
                "location".to_string(),
                location.unwrap_or_else(|| MISSING_CONTENT.to_string()),
            );
            record.attributes.insert("state".to_string(), state);
            record.attributes.insert("area".to_string(), area);
        }

        if let Some(selector) = &self.salary {
            let salary = first_text(&fragment, selector)
                .map(|text| normalize_salary(&text))
                .unwrap_or_else(|| MISSING_CONTENT.to_string());
            record.attributes.insert("salary".to_string(), salary);
        }

        if let Some(selector) = &self.sponsored {
            let sponsored = fragment.select(selector).next().is_some();
            record
                .attributes
                .insert("sponsored".to_string(), sponsored.to_string());
        }

        ListingExtraction {
            record: Some(record),
            within_day_limit: true,
        }
    }

    fn extract_content(&self, page: &str) -> Option<String> {
        let document = Html::parse_document(page);
        self.content.iter().find_map(|selector| {
            document
                .select(selector)
                .next()
                .map(|element| element.html())
                .filter(|html| !html.trim().is_empty())
        })
    }

    fn is_expired(&self, page: &str) -> bool {
        match &self.expired {
            Some(selector) => Html::parse_document(page).select(selector).next().is_some(),
            None => false,
        }
    }
}

fn compile(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector)
        .map_err(|e| ConfigError::InvalidSelector(format!("{}: {:?}", selector, e)))
}

fn compile_optional(selector: &Option<String>) -> Result<Option<Selector>, ConfigError> {
    selector.as_deref().map(compile).transpose()
}

/// Text of an element with whitespace collapsed
fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(|element| element_text(&element))
        .filter(|text| !text.is_empty())
}

/// Lowercase, hyphen-joined category name used in URLs
fn category_slug(category: &str) -> String {
    category
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Splits a location such as "Parramatta NSW" into (state, area)
fn split_location(location: &str) -> (String, String) {
    let missing = || MISSING_CONTENT.to_string();
    let words: Vec<&str> = location.split_whitespace().collect();
    let joined = words.join(" ");

    let state_of = |word: &str| {
        STATES
            .iter()
            .find(|(abbrev, name)| *abbrev == word || *name == word)
            .map(|(abbrev, _)| abbrev.to_string())
    };

    if let Some(state) = state_of(joined.as_str()) {
        return (state, missing());
    }

    match words.as_slice() {
        [] | [_] => (missing(), missing()),
        [area @ .., last] => (last.to_string(), area.join(" ")),
    }
}

/// Rewrites the pay period of a salary string when it is recognized
fn normalize_salary(salary: &str) -> String {
    let tokens: Vec<&str> = salary.split_whitespace().collect();
    let period_of = |token: &str| {
        PERIODS
            .iter()
            .find(|(period, _)| *period == token)
            .map(|(_, adverb)| *adverb)
    };

    match tokens.as_slice() {
        [amount, _, period] => match period_of(*period) {
            Some(adverb) => format!("{} {}", amount, adverb),
            None => salary.to_string(),
        },
        [low, _, high, _, period] => match period_of(*period) {
            Some(adverb) => format!("{}-{} {}", low, high, adverb),
            None => salary.to_string(),
        },
        _ => salary.to_string(),
    }
}
