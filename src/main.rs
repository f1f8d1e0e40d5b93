use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pagescrape::Scraper;
use pagescrape::fetch::{BrowserConfig, BrowserFetcher, HttpFetcher};
use pagescrape::job::Job;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FetcherKind {
    /// Plain HTTP requests
    Http,
    /// Headless browser engine, for pages rendered by scripts
    Browser,
}

/// Scrape paginated pages into JSON
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Job file describing the scrape
    job: PathBuf,

    /// Start here instead of the job's start URL
    #[arg(long, env = "SCRAPE_URL")]
    url: Option<String>,

    #[arg(long, value_enum, env = "SCRAPE_FETCHER", default_value = "http")]
    fetcher: FetcherKind,

    /// Browser engine binary (searched on the PATH otherwise)
    #[arg(long, env = "BROWSER_ENGINE")]
    engine: Option<PathBuf>,

    /// Quiet period before a rendered page is read
    #[arg(long, env = "BROWSER_RESOURCE_WAIT_MS", default_value_t = 300)]
    resource_wait_ms: u64,

    /// Read a rendered page after this long regardless of activity
    #[arg(long, env = "BROWSER_MAX_RENDER_WAIT_MS", default_value_t = 10_000)]
    max_render_wait_ms: u64,

    /// Pretty-print the results
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let raw = tokio::fs::read_to_string(&cli.job)
        .await
        .with_context(|| format!("failed to read job file {}", cli.job.display()))?;
    let job: Job = serde_json::from_str(&raw)
        .with_context(|| format!("invalid job file {}", cli.job.display()))?;
    let url = cli.url.clone().unwrap_or_else(|| job.start_url.clone());

    let config = match cli.fetcher {
        FetcherKind::Http => job.into_config(HttpFetcher::new()?)?,
        FetcherKind::Browser => {
            let fetcher = BrowserFetcher::with_config(BrowserConfig {
                engine: cli.engine.clone(),
                resource_wait: Duration::from_millis(cli.resource_wait_ms),
                max_render_wait: Duration::from_millis(cli.max_render_wait_ms),
                ..BrowserConfig::default()
            })?;
            job.into_config(fetcher)?
        }
    };

    let mut scraper = Scraper::new(config).context("invalid scrape configuration")?;

    info!("Starting scrape at {}", url);
    let results = scraper
        .scrape(&url)
        .await
        .with_context(|| format!("scrape starting at {url} failed"))?;

    let output = if cli.pretty {
        serde_json::to_string_pretty(&results)?
    } else {
        serde_json::to_string(&results)?
    };
    println!("{output}");

    Ok(())
}
