use std::fmt::Write as _;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{Configuration, ScrapeTarget};
use crate::error::{Error, TargetError};
use crate::output::write_result;
use crate::parse::{parse_detail, parse_listing, ParsedPage};
use crate::posting::ScrapeResult;
use crate::request::{PageFetcher, PageToken};
use crate::retry::Pause;
use crate::{info_time, Result};

/// Command line values that win over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub output_path: Option<PathBuf>,
    pub max_pages: Option<u32>,
}

/// Loads the config, runs every target and writes the merged result.
/// An invalid config fails before `build` is called, so nothing is requested.
pub async fn process_site<F, P, B>(
    config_path: &Path,
    overrides: &Overrides,
    build: B,
) -> Result<(Configuration, RunReport)>
where
    F: PageFetcher,
    P: Pause,
    B: FnOnce(&Configuration) -> Result<Orchestrator<F, P>>,
{
    let mut config = Configuration::load(config_path)?;
    if let Some(output_path) = &overrides.output_path {
        config.output_path = output_path.clone();
    }
    if let Some(max_pages) = overrides.max_pages {
        config.set_max_pages(max_pages)?;
    }
    info!(
        config = %config_path.display(),
        targets = config.targets.len(),
        "Loaded configuration"
    );

    let orchestrator = build(&config)?;
    let report = orchestrator.run(&config).await;

    let local_now = Local::now();
    if let Err(source) = write_result(&config.output_path, &report.result).await {
        return Err(Error::Unsaved {
            report: Box::new(report),
            source,
        });
    }
    info_time!(
        local_now,
        "Wrote {} postings to file: {}",
        report.result.len(),
        config.output_path.display()
    );

    Ok((config, report))
}

/// Cooperative stop flag, flipped on user interrupt.
#[derive(Debug, Clone)]
pub struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self(rx))
    }

    /// A signal that is never raised.
    pub fn never() -> Self {
        Self::channel().1
    }

    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once a stop is requested. Pending forever if the sender is gone.
    pub(crate) async fn stopped(&mut self) {
        loop {
            if *self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Raises `stop` on the first interrupt. Returns `true` once a second one arrives,
/// `false` if interrupts can't be received.
pub async fn relay_interrupts<I, Fut>(mut interrupted: I, stop: watch::Sender<bool>) -> bool
where
    I: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupted().await.is_err() {
        return false;
    }
    warn!("Interrupted, writing out what was collected so far. Interrupt again to quit at once");
    let _ = stop.send(true);
    interrupted().await.is_ok()
}

/// Spaces out consecutive requests by the configured delay.
struct Pacer<'a, P> {
    pause: &'a P,
    delay: Duration,
    stop: StopSignal,
    requested: bool,
}

impl<P: Pause> Pacer<'_, P> {
    /// Waits out the delay since the previous request.
    /// Returns `false` when a stop was requested and no request should be issued.
    async fn turn(&mut self) -> bool {
        if self.stop.is_stopped() {
            return false;
        }
        if self.requested && !self.delay.is_zero() {
            tokio::select! {
                _ = self.pause.pause(self.delay) => {}
                _ = self.stop.stopped() => {}
            }
        }
        if self.stop.is_stopped() {
            return false;
        }
        self.requested = true;
        true
    }
}

/// Lazily walks a target's listing pages, never more than `max_pages` of them.
pub struct Pages<'a> {
    target: &'a ScrapeTarget,
    next: Option<PageToken>,
    fetched: u32,
    max_pages: u32,
    finished: bool,
    today: NaiveDate,
}

impl<'a> Pages<'a> {
    pub fn new(target: &'a ScrapeTarget, max_pages: u32, today: NaiveDate) -> Self {
        Self {
            target,
            next: None,
            fetched: 0,
            max_pages,
            finished: false,
            today,
        }
    }

    pub fn has_next(&self) -> bool {
        !self.finished && self.fetched < self.max_pages
    }

    /// The page cap ended the walk while the site still signalled more pages.
    pub fn truncated(&self) -> bool {
        !self.finished && self.fetched >= self.max_pages
    }

    pub fn fetched(&self) -> u32 {
        self.fetched
    }

    /// Fetches and parses the next page. `None` once the walk is over.
    /// An error ends the walk.
    pub async fn next_page<F: PageFetcher + ?Sized>(
        &mut self,
        fetcher: &F,
    ) -> Option<core::result::Result<ParsedPage, TargetError>> {
        if !self.has_next() {
            return None;
        }
        self.fetched += 1;
        let result = fetch_page(fetcher, self.target, self.next, self.today).await;
        match &result {
            Ok(page) => {
                self.next = page.next;
                self.finished = page.next.is_none();
            }
            Err(_) => self.finished = true,
        }
        Some(result)
    }
}

async fn fetch_page<F: PageFetcher + ?Sized>(
    fetcher: &F,
    target: &ScrapeTarget,
    token: Option<PageToken>,
    today: NaiveDate,
) -> core::result::Result<ParsedPage, TargetError> {
    let raw = fetcher.fetch(target, token).await?;
    Ok(parse_listing(&raw, today)?)
}

#[derive(Debug)]
pub enum TargetStatus {
    Completed,
    Failed(TargetError),
    /// Never started because the run was interrupted.
    Skipped,
}

#[derive(Debug)]
pub struct TargetReport {
    pub subdomain: String,
    pub label: String,
    pub pages: u32,
    /// New postings this target contributed to the result.
    pub postings: usize,
    /// Stopped at the page cap with pages left.
    pub truncated: bool,
    pub detail_failures: usize,
    pub status: TargetStatus,
}

impl TargetReport {
    fn new(target: &ScrapeTarget) -> Self {
        Self {
            subdomain: target.subdomain().to_string(),
            label: target.to_string(),
            pages: 0,
            postings: 0,
            truncated: false,
            detail_failures: 0,
            status: TargetStatus::Completed,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, TargetStatus::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    PartialSuccess,
    Failure,
}

impl RunOutcome {
    pub fn exit_code(self) -> u8 {
        match self {
            RunOutcome::Success => 0,
            RunOutcome::PartialSuccess => 3,
            RunOutcome::Failure => 1,
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub result: ScrapeResult,
    pub targets: Vec<TargetReport>,
}

impl RunReport {
    /// All targets completed is a success. An interrupted run is partial, as is a run
    /// where only some targets completed.
    pub fn outcome(&self) -> RunOutcome {
        let completed = self.targets.iter().filter(|t| t.is_completed()).count();
        if completed == self.targets.len() {
            RunOutcome::Success
        } else if completed > 0 || self.interrupted() {
            RunOutcome::PartialSuccess
        } else {
            RunOutcome::Failure
        }
    }

    pub fn interrupted(&self) -> bool {
        self.targets.iter().any(|t| {
            matches!(
                t.status,
                TargetStatus::Skipped | TargetStatus::Failed(TargetError::Cancelled)
            )
        })
    }

    /// Human readable per-target summary, ending with where the result went.
    pub fn summary(&self, output_path: &Path) -> String {
        let mut out = self.target_lines();
        let _ = writeln!(
            out,
            "Run finished with {}: {} postings written to {}",
            self.outcome_label(),
            self.result.len(),
            output_path.display()
        );
        out
    }

    /// Summary for a run whose result couldn't be written.
    pub fn unsaved_summary(&self) -> String {
        let mut out = self.target_lines();
        let _ = writeln!(
            out,
            "Run finished with {}: {} postings collected, none written",
            self.outcome_label(),
            self.result.len()
        );
        out
    }

    fn outcome_label(&self) -> &'static str {
        match self.outcome() {
            RunOutcome::Success => "success",
            RunOutcome::PartialSuccess => "partial success",
            RunOutcome::Failure => "failure",
        }
    }

    fn target_lines(&self) -> String {
        let mut out = String::new();
        for t in &self.targets {
            let _ = match &t.status {
                TargetStatus::Completed => writeln!(
                    out,
                    "  ok      {:<40} {} pages, {} postings{}{}",
                    t.label,
                    t.pages,
                    t.postings,
                    if t.truncated { " (page cap reached)" } else { "" },
                    if t.detail_failures > 0 {
                        format!(", {} descriptions missing", t.detail_failures)
                    } else {
                        String::new()
                    },
                ),
                TargetStatus::Failed(e) => writeln!(
                    out,
                    "  FAILED  {:<40} [{}] {e} ({} postings kept)",
                    t.label,
                    e.kind(),
                    t.postings
                ),
                TargetStatus::Skipped => writeln!(out, "  skipped {:<40}", t.label),
            };
        }
        out
    }
}

/// Drives fetch -> parse for every target in order and merges the postings.
pub struct Orchestrator<F, P> {
    fetcher: F,
    pause: P,
    stop: StopSignal,
    today: NaiveDate,
}

impl<F: PageFetcher, P: Pause> Orchestrator<F, P> {
    pub fn new(fetcher: F, pause: P) -> Self {
        Self {
            fetcher,
            pause,
            stop: StopSignal::never(),
            today: Local::now().date_naive(),
        }
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Date relative posting dates are resolved against.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Scrapes every target. A failing target is recorded and the run moves on.
    pub async fn run(&self, config: &Configuration) -> RunReport {
        let start_time = Local::now();
        info_time!("Started scraping {} targets", config.targets.len());

        let mut result = ScrapeResult::new();
        let mut targets = Vec::with_capacity(config.targets.len());
        let mut pacer = Pacer {
            pause: &self.pause,
            delay: config.request_delay,
            stop: self.stop.clone(),
            requested: false,
        };

        for target in &config.targets {
            let mut report = TargetReport::new(target);
            if self.stop.is_stopped() {
                report.status = TargetStatus::Skipped;
                targets.push(report);
                continue;
            }

            let target_start = Local::now();
            if let Err(e) = self
                .scrape_target(target, config, &mut pacer, &mut result, &mut report)
                .await
            {
                warn!(site = %target, kind = %e.kind(), error = %e, "Target failed");
                report.status = TargetStatus::Failed(e);
            }
            info_time!(
                target_start,
                "Processed {target}: {} pages, {} new postings",
                report.pages,
                report.postings
            );
            targets.push(report);
        }

        info_time!(start_time, "Finished PROCESSING ALL targets: {} postings", result.len());
        RunReport { result, targets }
    }

    async fn scrape_target(
        &self,
        target: &ScrapeTarget,
        config: &Configuration,
        pacer: &mut Pacer<'_, P>,
        result: &mut ScrapeResult,
        report: &mut TargetReport,
    ) -> core::result::Result<(), TargetError> {
        let mut pages = Pages::new(target, config.max_pages, self.today);
        let mut added = Vec::new();

        while pages.has_next() {
            if !pacer.turn().await {
                return Err(TargetError::Cancelled);
            }
            let Some(page) = pages.next_page(&self.fetcher).await else {
                break;
            };
            let page = match page {
                Err(_) if self.stop.is_stopped() => return Err(TargetError::Cancelled),
                page => page?,
            };
            report.pages = pages.fetched();

            for listed in page.postings {
                if !target.matches_location(&listed.posting.location) {
                    continue;
                }
                let id = listed.posting.id.clone();
                if result.insert(target.subdomain(), listed.posting) {
                    report.postings += 1;
                    added.push((id, listed.external_path));
                } else {
                    debug!(site = %target, id = %id, "Duplicate posting");
                }
            }
        }

        if pages.truncated() {
            report.truncated = true;
            warn!(
                site = %target,
                max_pages = config.max_pages,
                "Stopped at the page cap, more pages were signalled"
            );
        }

        if config.include_descriptions {
            for (id, path) in added {
                if !pacer.turn().await {
                    return Err(TargetError::Cancelled);
                }
                let description = match self.fetcher.fetch_detail(target, &path).await {
                    Ok(body) => parse_detail(&body).map_err(TargetError::from),
                    Err(e) => Err(e.into()),
                };
                match description {
                    Ok(description) => {
                        if let Some(posting) = result.get_mut(target.subdomain(), &id) {
                            posting.description = description;
                        }
                    }
                    Err(e) => {
                        report.detail_failures += 1;
                        warn!(site = %target, id = %id, error = %e, "Couldn't load posting description");
                    }
                }
            }
        }
        Ok(())
    }
}
