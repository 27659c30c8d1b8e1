//! Integration tests for the harvester
//!
//! These tests use wiremock to stand in for a job board and drive the
//! reqwest fetcher, the SQLite store and the SQLite queue end-to-end.

use job_harvester::config::{parse_config, Config};
use job_harvester::crawler::{Coordinator, HttpFetcher, PageFetcher};
use job_harvester::rotation::{Identity, ProxyEndpoint};
use job_harvester::storage::{Gateway, JobContent, SqliteGateway};
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DESCRIPTION: &str = r#"<div class="description">Reconcile the ledgers</div>"#;

/// Creates a test configuration pointed at the mock board
fn create_test_config(base_url: &str, db_path: &Path) -> Config {
    let toml = format!(
        r#"
categories = ["Accounting"]

[site]
name = "mockjobs"
category-url = "{base}/category/{{category}}"
content-url = "{base}/job/{{job_id}}"

[crawler]
listing-workers = 1
content-workers = 2
pop-timeout-ms = 100
backoff-ms = 1

[identity]
user-agents = ["integration-agent"]

[storage]
database-path = "{db}"

[selectors]
subcategory = "a.subcategory"
article = "article.job"
job-id-attr = "data-job-id"
title = "h2"
listing-date = "span.date"
content = ["div.description"]
expired = "div.expired"
zero-results = "div.no-results"
"#,
        base = base_url,
        db = db_path.display()
    );
    parse_config(&toml).expect("test config should be valid")
}

fn listing_html(ids: &[&str]) -> String {
    let articles: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<article class="job" data-job-id="{id}"><h2>Job {id}</h2><span class="date">2h ago</span></article>"#
            )
        })
        .collect();
    format!("<html><body>{}</body></html>", articles)
}

/// Mounts a category with one page of listings
async fn mount_category(server: &MockServer, ids: &[&str]) {
    // Page mocks first: the first matching mock wins
    Mock::given(method("GET"))
        .and(path("/category/accounting"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(ids)))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/category/accounting"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/category/accounting"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body>Accounting</body></html>"),
        )
        .mount(server)
        .await;
}

async fn mount_job(server: &MockServer, id: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/job/{}", id)))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

fn direct_identity() -> Identity {
    Identity {
        proxy: ProxyEndpoint::Direct,
        user_agent: "integration-agent".to_string(),
    }
}

#[tokio::test]
async fn test_fetcher_sends_user_agent_and_keeps_redirects() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/moved"))
        .and(header("user-agent", "integration-agent"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", "/elsewhere"),
        )
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new();
    let response = fetcher
        .fetch(&format!("{}/moved", mock_server.uri()), &direct_identity())
        .await
        .expect("mock server should answer");

    assert_eq!(response.status, 302);
    assert!(response.is_redirect());
}

#[tokio::test]
async fn test_full_run_single_category() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("harvest.db");

    mount_category(&mock_server, &["101", "102"]).await;
    mount_job(&mock_server, "101", 200, DESCRIPTION).await;
    mount_job(&mock_server, "102", 404, "gone").await;

    let config = create_test_config(&mock_server.uri(), &db_path);
    let coordinator = Coordinator::new(config, "integration".to_string()).unwrap();
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.total_jobs, 2);
    assert_eq!(summary.last_session_jobs, 2);
    assert_eq!(summary.null_jd, 0);
    assert_eq!(summary.missing_jd, 1);

    let gateway = SqliteGateway::new(&db_path).unwrap();
    assert_eq!(
        gateway.get_content("mockjobs", "101").unwrap(),
        Some(JobContent::Description(DESCRIPTION.to_string()))
    );
    assert_eq!(
        gateway.get_content("mockjobs", "102").unwrap(),
        Some(JobContent::Missing)
    );
    let listing = gateway.get_listing("mockjobs", "101").unwrap().unwrap();
    assert_eq!(listing.attribute("title"), Some("Job 101"));
    assert_eq!(listing.category, "Accounting");

    let recorded = gateway.latest_session("mockjobs").unwrap().unwrap();
    assert_eq!(recorded.config_hash, "integration");
}

#[tokio::test]
async fn test_info_then_content_across_processes() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("harvest.db");

    mount_category(&mock_server, &["7", "8", "9"]).await;
    for id in ["7", "8", "9"] {
        mount_job(&mock_server, id, 200, DESCRIPTION).await;
    }

    let config = create_test_config(&mock_server.uri(), &db_path);
    let report = Coordinator::new(config.clone(), "h".to_string())
        .unwrap()
        .run_info()
        .await
        .unwrap();
    assert_eq!(report.categories, 1);

    // A fresh coordinator sees the queued ids and the listing summary
    let summary = Coordinator::new(config, "h".to_string())
        .unwrap()
        .run_content()
        .await
        .unwrap();

    assert_eq!(summary.total_jobs, 3);
    assert_eq!(summary.null_jd, 0);
    assert_eq!(summary.counters.get_named("jobs_listed"), 3.0);
    assert_eq!(summary.counters.get_named("jobs_saved"), 3.0);
}

#[tokio::test]
async fn test_missing_content_recovers_failed_jobs() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("harvest.db");

    mount_category(&mock_server, &["55"]).await;
    mount_job(&mock_server, "55", 500, "maintenance").await;

    let config = create_test_config(&mock_server.uri(), &db_path);
    let first = Coordinator::new(config.clone(), "h".to_string())
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(first.null_jd, 1);

    mock_server.reset().await;
    mount_job(&mock_server, "55", 200, DESCRIPTION).await;

    let recovered = Coordinator::new(config, "h".to_string())
        .unwrap()
        .run_missing_content()
        .await
        .unwrap();

    assert_eq!(recovered.null_jd, 0);
    assert_eq!(recovered.last_session_jobs, 0);
    let gateway = SqliteGateway::new(&db_path).unwrap();
    assert_eq!(
        gateway.get_content("mockjobs", "55").unwrap(),
        Some(JobContent::Description(DESCRIPTION.to_string()))
    );
}

#[tokio::test]
async fn test_unopenable_store_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("missing-dir").join("harvest.db");
    let config = create_test_config("http://127.0.0.1:9", &db_path);

    assert!(Coordinator::new(config, "h".to_string()).is_err());
}
