use std::{fmt, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::process::RunReport;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Write(#[from] WriteError),

    /// Every target ran but the result couldn't be saved.
    #[error("Scraped {} postings but couldn't save them: {source}", report.result.len())]
    Unsaved {
        report: Box<RunReport>,
        source: WriteError,
    },

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Reqwest Error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Refusing to overwrite existing file: {}", .0.display())]
    AlreadyExists(PathBuf),
}

/// Problems with the configuration file. Always fatal, raised before any request is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config file is not valid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Invalid target #{index}: {reason}")]
    InvalidTarget { index: usize, reason: String },

    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Network,
    HttpStatus,
    RateLimited,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FetchErrorKind::Network => "network",
            FetchErrorKind::HttpStatus => "http_status",
            FetchErrorKind::RateLimited => "rate_limited",
        })
    }
}

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Network failure: {0}")]
    Network(String),

    #[error("Server answered {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Rate limited by {url}")]
    RateLimited {
        url: String,
        retry_after: Option<Duration>,
    },
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Network(_) => FetchErrorKind::Network,
            FetchError::HttpStatus { .. } => FetchErrorKind::HttpStatus,
            FetchError::RateLimited { .. } => FetchErrorKind::RateLimited,
        }
    }

    /// Only rate limiting and transport failures can resolve by asking again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            FetchErrorKind::Network | FetchErrorKind::RateLimited
        )
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(value: reqwest::Error) -> Self {
        FetchError::Network(value.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Response is not the expected JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Posting #{index} is missing `{field}`")]
    MissingField { index: usize, field: &'static str },

    #[error("The selector you are trying to scrape for is invalid. Selector: {0}")]
    InvalidSelector(String),
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Couldn't write results to {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Couldn't serialize results: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Why a single target didn't complete. Recorded per target, never fatal to the run.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Interrupted before the target finished")]
    Cancelled,
}

impl TargetError {
    /// Short label used in the run summary.
    pub fn kind(&self) -> String {
        match self {
            TargetError::Fetch(e) => format!("fetch/{}", e.kind()),
            TargetError::Parse(_) => "parse".into(),
            TargetError::Cancelled => "cancelled".into(),
        }
    }
}
