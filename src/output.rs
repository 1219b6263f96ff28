//! The output file: one JSON document with postings grouped by subdomain.
//!
//! ```json
//! {
//!   "generated_at": "2024-03-10T12:00:00Z",
//!   "total": 1,
//!   "sites": [
//!     {"subdomain": "acme.wd1", "postings": [{"id": "R123", "title": "...", "location": "...", "url": "..."}]}
//!   ]
//! }
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{fs::File, io::AsyncWriteExt};

use crate::error::WriteError;
use crate::posting::{JobPosting, ScrapeResult};
use crate::Result;

#[derive(Serialize, Deserialize)]
struct OutputFile {
    generated_at: DateTime<Utc>,
    total: usize,
    sites: Vec<SiteOutput>,
}

#[derive(Serialize, Deserialize)]
struct SiteOutput {
    subdomain: String,
    postings: Vec<JobPosting>,
}

/// Serializes the result and writes it to `path`, creating missing parent directories.
pub async fn write_result(path: &Path, result: &ScrapeResult) -> core::result::Result<(), WriteError> {
    let output = OutputFile {
        generated_at: Utc::now(),
        total: result.len(),
        sites: result
            .sites()
            .map(|(subdomain, postings)| SiteOutput {
                subdomain: subdomain.to_string(),
                postings: postings.cloned().collect(),
            })
            .collect(),
    };
    let bytes = serde_json::to_vec_pretty(&output)?;

    let io_err = |source: std::io::Error| WriteError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let mut file = File::create(path).await.map_err(io_err)?;
    file.write_all(&bytes).await.map_err(io_err)?;
    file.flush().await.map_err(io_err)?;
    Ok(())
}

/// Reads a file written by [`write_result`] back into a `ScrapeResult`.
pub async fn read_result(path: &Path) -> Result<ScrapeResult> {
    let bytes = tokio::fs::read(path).await?;
    let output: OutputFile = serde_json::from_slice(&bytes)?;

    let mut result = ScrapeResult::new();
    for site in output.sites {
        for posting in site.postings {
            result.insert(&site.subdomain, posting);
        }
    }
    Ok(result)
}
