//! Scrapes job postings from Workday hosted career sites.
//!
//! A run reads a JSON [`Configuration`], walks every target's listing pages
//! through a [`PageFetcher`], parses them into [`JobPosting`]s and writes the
//! merged, de-duplicated [`ScrapeResult`] to a single file.

mod macros;

pub mod config;
pub mod error;
pub mod output;
pub mod parse;
pub mod posting;
pub mod process;
pub mod request;
pub mod retry;
pub mod telemetry;

pub use config::{Configuration, ScrapeTarget};
pub use error::{ConfigError, Error, FetchError, FetchErrorKind, ParseError, Result, TargetError, WriteError};
pub use posting::{JobPosting, ScrapeResult};
pub use process::{Orchestrator, RunOutcome, RunReport, StopSignal};
pub use request::{PageFetcher, PageToken, RawPage, WorkdayFetcher};
pub use retry::{Pause, RetryPolicy, Retrying, TokioPause};

const WORKDAY_HOST_SUFFIX: &str = ".myworkdayjobs.com";
/// Workday won't hand out more postings per request.
const DEFAULT_PAGE_SIZE: u32 = 20;
/// Pages per target are never more than this, whatever the config says.
const MAX_PAGES_CEILING: u32 = 500;
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
