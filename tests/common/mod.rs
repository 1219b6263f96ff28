#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use workday_scrap::{FetchError, PageFetcher, PageToken, Pause, RawPage, ScrapeTarget};

type Respond = dyn Fn(&str, u32) -> Result<String, FetchError> + Send + Sync;
type Detail = dyn Fn(&str) -> Result<String, FetchError> + Send + Sync;

/// Answers listing requests from a closure of `(subdomain, offset)` and records every call.
pub struct StubFetcher {
    respond: Box<Respond>,
    detail: Box<Detail>,
    page_size: u32,
    calls: Mutex<Vec<(String, u32)>>,
    detail_calls: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn new(
        page_size: u32,
        respond: impl Fn(&str, u32) -> Result<String, FetchError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            detail: Box::new(|path| {
                Err(FetchError::HttpStatus {
                    status: 404,
                    url: path.into(),
                })
            }),
            page_size,
            calls: Mutex::new(Vec::new()),
            detail_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_detail(
        mut self,
        detail: impl Fn(&str) -> Result<String, FetchError> + Send + Sync + 'static,
    ) -> Self {
        self.detail = Box::new(detail);
        self
    }

    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, subdomain: &str) -> usize {
        self.calls().iter().filter(|(s, _)| s == subdomain).count()
    }

    pub fn detail_calls(&self) -> Vec<String> {
        self.detail_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(
        &self,
        target: &ScrapeTarget,
        token: Option<PageToken>,
    ) -> Result<RawPage, FetchError> {
        let offset = token.map(PageToken::offset).unwrap_or(0);
        self.calls
            .lock()
            .unwrap()
            .push((target.subdomain().to_string(), offset));
        Ok(RawPage {
            body: (self.respond)(target.subdomain(), offset)?,
            token,
            page_size: self.page_size,
            site_url: format!("https://{}.myworkdayjobs.com/{}", target.subdomain(), target.site()),
        })
    }

    async fn fetch_detail(
        &self,
        _target: &ScrapeTarget,
        external_path: &str,
    ) -> Result<String, FetchError> {
        self.detail_calls
            .lock()
            .unwrap()
            .push(external_path.to_string());
        (self.detail)(external_path)
    }
}

/// Records requested pauses instead of sleeping.
#[derive(Default)]
pub struct RecordingPause(Mutex<Vec<Duration>>);

impl RecordingPause {
    pub fn pauses(&self) -> Vec<Duration> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl Pause for RecordingPause {
    async fn pause(&self, duration: Duration) {
        self.0.lock().unwrap().push(duration);
    }
}

/// A Workday listing response holding one posting per id.
pub fn listing(ids: &[&str], total: u32) -> String {
    let postings: Vec<_> = ids
        .iter()
        .map(|id| {
            json!({
                "title": format!("Job {id}"),
                "externalPath": format!("/job/Remote/Job_{id}"),
                "locationsText": "Remote",
                "postedOn": "Posted Today",
                "bulletFields": [id],
            })
        })
        .collect();
    json!({"total": total, "jobPostings": postings}).to_string()
}

pub fn network_error() -> FetchError {
    FetchError::Network("connection refused".into())
}
