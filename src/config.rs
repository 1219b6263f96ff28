//! Loading and validating the JSON configuration that drives a run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfigError, Error};
use crate::{DEFAULT_PAGE_SIZE, MAX_PAGES_CEILING, WORKDAY_HOST_SUFFIX};

const DEFAULT_SITE: &str = "External";
const DEFAULT_REQUEST_DELAY_SECS: f64 = 2.0;
const DEFAULT_MAX_PAGES: u32 = 10;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// One Workday career site to query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeTarget {
    subdomain: String,
    site: String,
    keywords: Option<String>,
    location: Option<String>,
}

impl ScrapeTarget {
    pub fn new(subdomain: impl Into<String>) -> Self {
        Self {
            subdomain: subdomain.into(),
            site: DEFAULT_SITE.into(),
            keywords: None,
            location: None,
        }
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = site.into();
        self
    }

    pub fn with_keywords(mut self, keywords: impl Into<String>) -> Self {
        self.keywords = Some(keywords.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Derives the target from a career site URL such as
    /// `https://acme.wd1.myworkdayjobs.com/en-US/External`.
    pub fn from_url(raw: &str) -> Result<Self, String> {
        let url = Url::parse(raw).map_err(|e| format!("`{raw}` is not a URL: {e}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("`{raw}` should start with https://"));
        }
        let host = url.host_str().unwrap_or_default();
        let subdomain = host
            .strip_suffix(WORKDAY_HOST_SUFFIX)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("`{host}` is not a {WORKDAY_HOST_SUFFIX} host"))?;

        let site = url
            .path_segments()
            .into_iter()
            .flatten()
            .filter(|seg| !seg.is_empty())
            .find(|seg| !is_locale(seg));

        let target = Self::new(subdomain);
        Ok(match site {
            Some(site) => target.with_site(site),
            None => target,
        })
    }

    /// Company subdomain, e.g. `acme.wd1`.
    pub fn subdomain(&self) -> &str {
        &self.subdomain
    }

    /// Workday tenant, the first label of the subdomain.
    pub fn tenant(&self) -> &str {
        self.subdomain
            .split('.')
            .next()
            .unwrap_or(&self.subdomain)
    }

    /// Career site name, `External` unless configured.
    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn keywords(&self) -> Option<&str> {
        self.keywords.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Case-insensitive location filter. Always true when no filter is configured.
    pub fn matches_location(&self, location: &str) -> bool {
        match &self.location {
            Some(wanted) => location.to_lowercase().contains(&wanted.to_lowercase()),
            None => true,
        }
    }
}

impl std::fmt::Display for ScrapeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.subdomain, self.site)?;
        if let Some(keywords) = &self.keywords {
            write!(f, " [{keywords}]")?;
        }
        Ok(())
    }
}

/// `en-US`, `fr-CA`...
fn is_locale(segment: &str) -> bool {
    let mut parts = segment.split('-');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(lang), Some(region), None)
            if lang.len() == 2 && region.len() == 2
                && lang.chars().all(|c| c.is_ascii_lowercase())
                && region.chars().all(|c| c.is_ascii_uppercase())
    )
}

fn is_valid_subdomain(subdomain: &str) -> bool {
    !subdomain.is_empty()
        && subdomain.split('.').all(|label| {
            !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

/// Validated, read-only settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub targets: Vec<ScrapeTarget>,
    pub output_path: PathBuf,
    pub request_delay: Duration,
    pub max_pages: u32,
    pub page_size: u32,
    pub timeout: Duration,
    pub include_descriptions: bool,
}

impl Configuration {
    /// A configuration with defaults for everything but the targets and the output path.
    pub fn new(targets: Vec<ScrapeTarget>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            targets,
            output_path: output_path.into(),
            request_delay: Duration::from_secs_f64(DEFAULT_REQUEST_DELAY_SECS),
            max_pages: DEFAULT_MAX_PAGES,
            page_size: DEFAULT_PAGE_SIZE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            include_descriptions: false,
        }
    }

    /// Reads and validates the config file. Has no side effects besides reading `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(text)?;
        raw.validate()
    }

    /// Caps `max_pages`, used for the command line override.
    pub fn set_max_pages(&mut self, max_pages: u32) -> Result<(), ConfigError> {
        self.max_pages = check_max_pages(max_pages)?;
        Ok(())
    }

    /// Writes the config to `path`. An existing file is only replaced when `overwrite` is set.
    pub fn save(&self, path: &Path, overwrite: bool) -> crate::Result<()> {
        if path.exists() && !overwrite {
            return Err(Error::AlreadyExists(path.to_path_buf()));
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// The on-disk form of this configuration, as written by `init`.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let raw = RawConfig {
            targets: Some(
                self.targets
                    .iter()
                    .map(|t| RawTarget {
                        subdomain: Some(t.subdomain.clone()),
                        url: None,
                        site: Some(t.site.clone()),
                        keywords: t.keywords.clone(),
                        location: t.location.clone(),
                    })
                    .collect(),
            ),
            output_path: Some(self.output_path.clone()),
            request_delay_seconds: Some(self.request_delay.as_secs_f64()),
            max_pages: Some(self.max_pages),
            page_size: Some(self.page_size),
            timeout_seconds: Some(self.timeout.as_secs()),
            include_descriptions: Some(self.include_descriptions),
        };
        serde_json::to_string_pretty(&raw)
    }
}

fn check_max_pages(max_pages: u32) -> Result<u32, ConfigError> {
    if max_pages == 0 {
        return Err(ConfigError::InvalidValue {
            field: "max_pages",
            reason: "must be at least 1".into(),
        });
    }
    Ok(max_pages.min(MAX_PAGES_CEILING))
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    targets: Option<Vec<RawTarget>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_delay_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_pages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    include_descriptions: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawTarget {
    #[serde(skip_serializing_if = "Option::is_none")]
    subdomain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    site: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keywords: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
}

impl RawConfig {
    fn validate(self) -> Result<Configuration, ConfigError> {
        let raw_targets = self.targets.ok_or(ConfigError::MissingField("targets"))?;
        if raw_targets.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "targets",
                reason: "at least one target is required".into(),
            });
        }
        let targets = raw_targets
            .into_iter()
            .enumerate()
            .map(|(index, raw)| raw.validate(index))
            .collect::<Result<Vec<_>, _>>()?;

        let output_path = self
            .output_path
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(ConfigError::MissingField("output_path"))?;

        let mut config = Configuration::new(targets, output_path);

        if let Some(secs) = self.request_delay_seconds {
            config.request_delay =
                Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::InvalidValue {
                    field: "request_delay_seconds",
                    reason: format!("{secs}: {e}"),
                })?;
        }
        if let Some(max_pages) = self.max_pages {
            config.max_pages = check_max_pages(max_pages)?;
        }
        if let Some(page_size) = self.page_size {
            if !(1..=DEFAULT_PAGE_SIZE).contains(&page_size) {
                return Err(ConfigError::InvalidValue {
                    field: "page_size",
                    reason: format!("must be between 1 and {DEFAULT_PAGE_SIZE}"),
                });
            }
            config.page_size = page_size;
        }
        if let Some(timeout) = self.timeout_seconds {
            if timeout == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "timeout_seconds",
                    reason: "must be at least 1".into(),
                });
            }
            config.timeout = Duration::from_secs(timeout);
        }
        config.include_descriptions = self.include_descriptions.unwrap_or(false);

        Ok(config)
    }
}

impl RawTarget {
    fn validate(self, index: usize) -> Result<ScrapeTarget, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidTarget { index, reason };

        let mut target = match (self.subdomain, self.url) {
            (Some(subdomain), _) => {
                let subdomain = subdomain.trim().to_string();
                if !is_valid_subdomain(&subdomain) {
                    return Err(invalid(format!("`{subdomain}` is not a valid subdomain")));
                }
                ScrapeTarget::new(subdomain)
            }
            (None, Some(url)) => ScrapeTarget::from_url(url.trim()).map_err(invalid)?,
            (None, None) => return Err(invalid("needs a `subdomain` or a `url`".into())),
        };

        if let Some(site) = non_blank(self.site) {
            target = target.with_site(site);
        }
        if let Some(keywords) = non_blank(self.keywords) {
            target = target.with_keywords(keywords);
        }
        if let Some(location) = non_blank(self.location) {
            target = target.with_location(location);
        }
        Ok(target)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
