use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::{error, warn};
use workday_scrap::{
    info_time,
    process::{process_site, relay_interrupts, Overrides},
    telemetry, ConfigError, Configuration, Error, Orchestrator, RetryPolicy, Retrying, ScrapeTarget,
    StopSignal, TokioPause, WorkdayFetcher,
};

#[derive(Parser, Debug)]
#[command(
    name = "workday-scrap",
    version,
    about = "Scrapes job postings from Workday career sites."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scrape described by a config file
    Scrape {
        /// Path to the JSON config
        #[arg(short, long)]
        config: PathBuf,

        /// Write results here instead of the config's `output_path`
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Maximum listing pages per target
        #[arg(long)]
        max_pages: Option<u32>,
    },
    /// Write a config file for one Workday career site
    Init {
        /// Career site URL, e.g. https://acme.wd1.myworkdayjobs.com/External
        #[arg(long)]
        url: String,

        #[arg(long)]
        keywords: Option<String>,

        #[arg(long)]
        location: Option<String>,

        /// Where scrape results should go
        #[arg(long, default_value = "jobs.json")]
        output_path: PathBuf,

        /// Config file to create
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,

        /// Replace an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init();
    let start_time = Local::now();

    let code = match Cli::parse().command {
        Command::Scrape {
            config,
            output,
            max_pages,
        } => {
            let overrides = Overrides {
                output_path: output,
                max_pages,
            };
            scrape(config, overrides).await
        }
        Command::Init {
            url,
            keywords,
            location,
            output_path,
            config,
            force,
        } => match init(&url, keywords, location, output_path, &config, force) {
            Ok(()) => {
                println!("Configuration saved to {}", config.display());
                println!("Run: workday-scrap scrape --config {}", config.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Setup failed: {e}");
                ExitCode::FAILURE
            }
        },
    };

    info_time!(start_time, "Full program time:");
    code
}

async fn scrape(config_path: PathBuf, overrides: Overrides) -> ExitCode {
    let (stop_tx, stop) = StopSignal::channel();
    tokio::spawn(async move {
        if relay_interrupts(tokio::signal::ctrl_c, stop_tx).await {
            warn!("Interrupted again, quitting without writing results");
            std::process::exit(130);
        }
    });

    let run = process_site(&config_path, &overrides, |config| {
        let fetcher = Retrying::new(
            WorkdayFetcher::new(config)?,
            TokioPause,
            RetryPolicy::default(),
        )
        .with_stop_signal(stop.clone());
        Ok(Orchestrator::new(fetcher, TokioPause).with_stop_signal(stop))
    })
    .await;

    match run {
        Ok((config, report)) => {
            print!("{}", report.summary(&config.output_path));
            ExitCode::from(report.outcome().exit_code())
        }
        Err(Error::Unsaved { report, source }) => {
            print!("{}", report.unsaved_summary());
            error!("Scrape failed: {source}");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Scrape failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init(
    url: &str,
    keywords: Option<String>,
    location: Option<String>,
    output_path: PathBuf,
    config_path: &std::path::Path,
    force: bool,
) -> workday_scrap::Result<()> {
    let mut target = ScrapeTarget::from_url(url.trim())
        .map_err(|reason| ConfigError::InvalidTarget { index: 0, reason })?;
    if let Some(keywords) = keywords {
        target = target.with_keywords(keywords);
    }
    if let Some(location) = location {
        target = target.with_location(location);
    }

    Configuration::new(vec![target], output_path).save(config_path, force)
}
