mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;
use wiremock::{
    matchers::{body_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};
use workday_scrap::{
    output::read_result,
    parse::parse_listing,
    process::{process_site, Overrides},
    Configuration, FetchError, FetchErrorKind, Orchestrator, PageFetcher, PageToken, RetryPolicy,
    Retrying, RunOutcome, ScrapeTarget, WorkdayFetcher,
};

use common::{listing, RecordingPause};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
}

fn config(target: ScrapeTarget) -> Configuration {
    Configuration::new(vec![target], "unused.json")
}

#[tokio::test]
async fn posts_the_search_and_reads_the_page() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/wday/cxs/acme/External/jobs"))
        .and(header("accept-language", "en-US,en;q=0.9"))
        .and(body_json(json!({
            "appliedFacets": {}, "limit": 20, "offset": 40, "searchText": "rust"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&["R1"], 41)))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(ScrapeTarget::new("acme.wd1").with_keywords("rust"));
    let fetcher = WorkdayFetcher::new(&config)
        .unwrap()
        .with_base_url(server.uri());

    let raw = fetcher
        .fetch(&config.targets[0], Some(PageToken::from_offset(40)))
        .await
        .unwrap();
    assert_eq!(raw.token, Some(PageToken::from_offset(40)));

    let page = parse_listing(&raw, today()).unwrap();
    assert_eq!(page.next, None);
    assert_eq!(page.postings[0].posting.id, "R1");
    assert_eq!(
        page.postings[0].posting.url,
        format!("{}/External/job/Remote/Job_R1", server.uri())
    );
}

#[tokio::test]
async fn too_many_requests_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "5"))
        .mount(&server)
        .await;

    let config = config(ScrapeTarget::new("acme.wd1"));
    let fetcher = WorkdayFetcher::new(&config)
        .unwrap()
        .with_base_url(server.uri());

    let err = fetcher.fetch(&config.targets[0], None).await.unwrap_err();
    assert_eq!(err.kind(), FetchErrorKind::RateLimited);
    assert!(matches!(
        err,
        FetchError::RateLimited {
            retry_after: Some(d),
            ..
        } if d == Duration::from_secs(5)
    ));
}

#[tokio::test]
async fn error_status_is_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = config(ScrapeTarget::new("acme.wd1"));
    let fetcher = WorkdayFetcher::new(&config)
        .unwrap()
        .with_base_url(server.uri());

    let err = fetcher.fetch(&config.targets[0], None).await.unwrap_err();
    assert!(matches!(err, FetchError::HttpStatus { status: 500, .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn slow_server_times_out_as_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing(&[], 0))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let mut config = config(ScrapeTarget::new("acme.wd1"));
    config.timeout = Duration::from_millis(200);
    let fetcher = WorkdayFetcher::new(&config)
        .unwrap()
        .with_base_url(server.uri());

    let err = fetcher.fetch(&config.targets[0], None).await.unwrap_err();
    assert_eq!(err.kind(), FetchErrorKind::Network);
}

#[tokio::test]
async fn full_run_against_a_workday_site() {
    let server = MockServer::start().await;
    // Rate limited once, then two pages.
    Mock::given(method("POST"))
        .and(path("/wday/cxs/acme/Careers/jobs"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/wday/cxs/acme/Careers/jobs"))
        .and(body_json(json!({
            "appliedFacets": {}, "limit": 2, "offset": 0, "searchText": ""
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&["R1", "R2"], 3)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/wday/cxs/acme/Careers/jobs"))
        .and(body_json(json!({
            "appliedFacets": {}, "limit": 2, "offset": 2, "searchText": ""
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&["R3"], 0)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wday/cxs/acme/Careers/job/Remote/Job_R2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            json!({"jobPostingInfo": {"jobDescription": "<p>Write Rust</p>"}}).to_string(),
        ))
        .mount(&server)
        .await;
    // Every other detail is missing.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .with_priority(10)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    let output_path = dir.path().join("jobs.json");
    std::fs::write(
        &config_path,
        json!({
            "targets": [{"url": "https://acme.wd1.myworkdayjobs.com/en-US/Careers"}],
            "output_path": output_path,
            "request_delay_seconds": 0.25,
            "page_size": 2,
            "include_descriptions": true
        })
        .to_string(),
    )
    .unwrap();

    let pause = Arc::new(RecordingPause::default());
    let (config, report) = process_site(&config_path, &Overrides::default(), |config| {
        let fetcher = Retrying::new(
            WorkdayFetcher::new(config)?.with_base_url(server.uri()),
            Arc::clone(&pause),
            RetryPolicy::default(),
        );
        Ok(Orchestrator::new(fetcher, Arc::clone(&pause)).with_today(today()))
    })
    .await
    .unwrap();

    assert_eq!(report.outcome(), RunOutcome::Success);
    assert_eq!(report.targets[0].pages, 2);
    assert_eq!(report.targets[0].detail_failures, 2);
    // One backoff, then the request delay before page 2 and before each of the 3 details.
    assert_eq!(
        pause.pauses(),
        vec![
            Duration::from_secs(1),
            Duration::from_millis(250),
            Duration::from_millis(250),
            Duration::from_millis(250),
            Duration::from_millis(250),
        ]
    );

    let written = read_result(&config.output_path).await.unwrap();
    assert_eq!(written, report.result);
    let postings: Vec<_> = written.site("acme.wd1").collect();
    assert_eq!(postings.len(), 3);
    assert_eq!(postings[1].id, "R2");
    assert_eq!(postings[1].description.as_deref(), Some("Write Rust"));
    assert_eq!(postings[1].posted_date, Some(today()));
}
