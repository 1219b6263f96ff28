use std::collections::{btree_map::Values, BTreeMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One scraped job listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosting {
    /// Unique within its source site.
    pub id: String,
    pub title: String,
    pub location: String,
    pub url: String,
    /// Workday's own wording, e.g. `Posted 3 Days Ago`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_on: Option<String>,
    /// Approximate date derived from `posted_on`, when it is precise enough.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Every posting collected in one run, keyed by (subdomain, posting id).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeResult {
    sites: BTreeMap<String, BTreeMap<String, JobPosting>>,
}

impl ScrapeResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a posting unless the site already has one with the same id.
    /// Returns whether it was new.
    pub fn insert(&mut self, subdomain: &str, posting: JobPosting) -> bool {
        let site = self.sites.entry(subdomain.to_string()).or_default();
        if site.contains_key(&posting.id) {
            return false;
        }
        site.insert(posting.id.clone(), posting);
        true
    }

    pub fn contains(&self, subdomain: &str, id: &str) -> bool {
        self.sites
            .get(subdomain)
            .is_some_and(|site| site.contains_key(id))
    }

    pub fn get_mut(&mut self, subdomain: &str, id: &str) -> Option<&mut JobPosting> {
        self.sites.get_mut(subdomain)?.get_mut(id)
    }

    /// Postings of one site, ordered by id.
    pub fn site(&self, subdomain: &str) -> impl Iterator<Item = &JobPosting> {
        self.sites.get(subdomain).into_iter().flat_map(|s| s.values())
    }

    /// `(subdomain, postings)` pairs, ordered by subdomain then id.
    pub fn sites(&self) -> impl Iterator<Item = (&str, Values<'_, String, JobPosting>)> {
        self.sites
            .iter()
            .map(|(subdomain, postings)| (subdomain.as_str(), postings.values()))
    }

    pub fn len(&self) -> usize {
        self.sites.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
pub(crate) fn posting(id: &str) -> JobPosting {
    JobPosting {
        id: id.into(),
        title: format!("Job {id}"),
        location: "Remote".into(),
        url: format!("https://acme.wd1.myworkdayjobs.com/External/job/{id}"),
        posted_on: None,
        posted_date: None,
        description: None,
    }
}
