use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, RETRY_AFTER},
    Client, Response, StatusCode,
};
use serde::Serialize;
use tracing::debug;

use crate::config::{Configuration, ScrapeTarget};
use crate::error::FetchError;
use crate::{Result, USER_AGENT, WORKDAY_HOST_SUFFIX};

/// Cursor into a target's result list. Produced by the parser, handed back to the fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageToken(u32);

impl PageToken {
    pub fn from_offset(offset: u32) -> Self {
        Self(offset)
    }

    pub fn offset(self) -> u32 {
        self.0
    }
}

/// An unparsed listing response.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub body: String,
    /// The token this page was requested with, `None` for the first page.
    pub token: Option<PageToken>,
    /// How many postings were asked for.
    pub page_size: u32,
    /// Public career site URL the posting paths are relative to.
    pub site_url: String,
}

/// Source of listing pages for a target. One call is one outbound request.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(
        &self,
        target: &ScrapeTarget,
        token: Option<PageToken>,
    ) -> core::result::Result<RawPage, FetchError>;

    /// Returns the raw detail document of one posting.
    async fn fetch_detail(
        &self,
        target: &ScrapeTarget,
        external_path: &str,
    ) -> core::result::Result<String, FetchError>;
}

#[async_trait]
impl<F: PageFetcher + ?Sized> PageFetcher for Arc<F> {
    async fn fetch(
        &self,
        target: &ScrapeTarget,
        token: Option<PageToken>,
    ) -> core::result::Result<RawPage, FetchError> {
        (**self).fetch(target, token).await
    }

    async fn fetch_detail(
        &self,
        target: &ScrapeTarget,
        external_path: &str,
    ) -> core::result::Result<String, FetchError> {
        (**self).fetch_detail(target, external_path).await
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    applied_facets: serde_json::Map<String, serde_json::Value>,
    limit: u32,
    offset: u32,
    search_text: &'a str,
}

/// Talks to the Workday candidate API (`/wday/cxs/...`).
#[derive(Debug, Clone)]
pub struct WorkdayFetcher {
    // Client uses Arc so we can clone cheaply
    client: Client,
    page_size: u32,
    base_url: Option<String>,
}

impl WorkdayFetcher {
    pub fn new(config: &Configuration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            page_size: config.page_size,
            base_url: None,
        })
    }

    /// Sends every request to `base_url` instead of the target's own Workday host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    fn site_root(&self, target: &ScrapeTarget) -> String {
        match &self.base_url {
            Some(base) => base.clone(),
            None => format!("https://{}{WORKDAY_HOST_SUFFIX}", target.subdomain()),
        }
    }

    fn api_root(&self, target: &ScrapeTarget) -> String {
        format!(
            "{}/wday/cxs/{}/{}",
            self.site_root(target),
            target.tenant(),
            target.site()
        )
    }
}

#[async_trait]
impl PageFetcher for WorkdayFetcher {
    async fn fetch(
        &self,
        target: &ScrapeTarget,
        token: Option<PageToken>,
    ) -> core::result::Result<RawPage, FetchError> {
        let url = format!("{}/jobs", self.api_root(target));
        let offset = token.map(PageToken::offset).unwrap_or(0);
        debug!(%url, offset, "Requesting listing page");

        let res = self
            .client
            .post(&url)
            .json(&SearchRequest {
                applied_facets: serde_json::Map::new(),
                limit: self.page_size,
                offset,
                search_text: target.keywords().unwrap_or_default(),
            })
            .send()
            .await?;
        let body = read_body(res, &url).await?;

        Ok(RawPage {
            body,
            token,
            page_size: self.page_size,
            site_url: format!("{}/{}", self.site_root(target), target.site()),
        })
    }

    async fn fetch_detail(
        &self,
        target: &ScrapeTarget,
        external_path: &str,
    ) -> core::result::Result<String, FetchError> {
        let url = format!("{}{external_path}", self.api_root(target));
        debug!(%url, "Requesting posting detail");

        let res = self.client.get(&url).send().await?;
        read_body(res, &url).await
    }
}

/// Maps the status onto `FetchError` and returns the body of a successful response.
async fn read_body(res: Response, url: &str) -> core::result::Result<String, FetchError> {
    let status = res.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = res
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(FetchError::RateLimited {
            url: url.into(),
            retry_after,
        });
    }
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            status: status.as_u16(),
            url: url.into(),
        });
    }
    Ok(res.text().await?)
}
