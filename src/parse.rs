use chrono::{Days, NaiveDate};
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;

use crate::error::ParseError;
use crate::posting::JobPosting;
use crate::request::{PageToken, RawPage};

/// A posting together with the path its detail document lives under.
#[derive(Debug, Clone, PartialEq)]
pub struct ListedPosting {
    pub posting: JobPosting,
    pub external_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage {
    pub postings: Vec<ListedPosting>,
    pub next: Option<PageToken>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingResponse {
    /// Only reliable on the first page, Workday reports 0 afterwards.
    #[serde(default)]
    total: u32,
    job_postings: Vec<RawPosting>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPosting {
    title: Option<String>,
    external_path: Option<String>,
    locations_text: Option<String>,
    posted_on: Option<String>,
    #[serde(default)]
    bullet_fields: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailResponse {
    job_posting_info: DetailInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailInfo {
    job_description: Option<String>,
}

/// Parses one listing page into postings and the token of the following page.
/// Deterministic: `today` anchors the relative "Posted N Days Ago" dates.
pub fn parse_listing(raw: &RawPage, today: NaiveDate) -> Result<ParsedPage, ParseError> {
    let response: ListingResponse = serde_json::from_str(&raw.body)?;

    let postings = response
        .job_postings
        .into_iter()
        .enumerate()
        .map(|(index, posting)| to_listed(index, posting, &raw.site_url, today))
        .collect::<Result<Vec<_>, _>>()?;

    let next = next_token(raw, postings.len() as u32, response.total);
    Ok(ParsedPage { postings, next })
}

fn to_listed(
    index: usize,
    raw: RawPosting,
    site_url: &str,
    today: NaiveDate,
) -> Result<ListedPosting, ParseError> {
    let title = raw
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or(ParseError::MissingField {
            index,
            field: "title",
        })?;
    let external_path = raw
        .external_path
        .filter(|p| !p.trim().is_empty())
        .ok_or(ParseError::MissingField {
            index,
            field: "externalPath",
        })?;

    // The first bullet field is the requisition id.
    let id = raw
        .bullet_fields
        .iter()
        .map(|b| b.trim())
        .find(|b| !b.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| external_path.clone());

    let posted_date = raw
        .posted_on
        .as_deref()
        .and_then(|p| posted_date(p, today));

    Ok(ListedPosting {
        posting: JobPosting {
            id,
            title,
            location: raw.locations_text.unwrap_or_default().trim().to_string(),
            url: format!("{site_url}{external_path}"),
            posted_on: raw.posted_on,
            posted_date,
            description: None,
        },
        external_path,
    })
}

fn next_token(raw: &RawPage, count: u32, total: u32) -> Option<PageToken> {
    if count == 0 || count < raw.page_size {
        return None;
    }
    let offset = raw.token.map(PageToken::offset).unwrap_or(0);
    let next = offset.saturating_add(count);
    if total > 0 && next >= total {
        return None;
    }
    Some(PageToken::from_offset(next))
}

/// Turns Workday's `Posted 3 Days Ago` into a date. `Posted 30+ Days Ago` is too vague and gives `None`.
pub fn posted_date(posted_on: &str, today: NaiveDate) -> Option<NaiveDate> {
    let lowered = posted_on.trim().to_lowercase();
    let text = lowered.strip_prefix("posted ").unwrap_or(&lowered);
    match text {
        "today" => Some(today),
        "yesterday" => today.pred_opt(),
        _ => {
            let days = text
                .strip_suffix(" days ago")
                .or_else(|| text.strip_suffix(" day ago"))?;
            let days: u64 = days.trim().parse().ok()?;
            today.checked_sub_days(Days::new(days))
        }
    }
}

/// Extracts the plain text job description from a detail document.
pub fn parse_detail(body: &str) -> Result<Option<String>, ParseError> {
    let detail: DetailResponse = serde_json::from_str(body)?;
    match detail.job_posting_info.job_description {
        Some(html) => {
            let text = html_to_text(&html)?;
            Ok(Some(text).filter(|t| !t.is_empty()))
        }
        None => Ok(None),
    }
}

/// One line per outermost block element, whitespace collapsed.
fn html_to_text(html: &str) -> Result<String, ParseError> {
    let doc = Html::parse_fragment(html);
    let block_selector = create_selector("p, li, h1, h2, h3, h4, h5, h6, div")?;

    let lines: Vec<String> = doc
        .select(&block_selector)
        .filter(|el| {
            !el.ancestors()
                .filter_map(ElementRef::wrap)
                .any(|parent| block_selector.matches(&parent))
        })
        .map(|el| collapse_whitespace(el.text()))
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        return Ok(collapse_whitespace(doc.root_element().text()));
    }
    Ok(lines.join("\n"))
}

fn collapse_whitespace<'a>(chunks: impl Iterator<Item = &'a str>) -> String {
    chunks
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[inline]
fn create_selector(sel_str: &str) -> Result<Selector, ParseError> {
    Selector::parse(sel_str).map_err(|_| ParseError::InvalidSelector(sel_str.into()))
}
