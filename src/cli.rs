use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scrape the tender portal and store new tenders.
    ScrapeTenders(ScrapeTendersArgs),
    /// Scrape the jobs board and store new postings.
    ScrapeJobs(ScrapeJobsArgs),
    /// Fill missing published timestamps of stored tenders.
    Backfill(BackfillArgs),
}

#[derive(Debug, Args)]
pub struct ScrapeTendersArgs {
    /// Listing URL of the tender portal.
    #[arg(long, default_value = crate::sources::tenders::DEFAULT_URL)]
    pub url: String,

    /// Last page to read (inclusive).
    #[arg(long, default_value_t = 10)]
    pub max_pages: u32,

    /// First page to read.
    #[arg(long, default_value_t = 1)]
    pub start_page: u32,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Debug, Args)]
pub struct ScrapeJobsArgs {
    /// Search URL of the jobs board.
    #[arg(long, default_value = crate::sources::jobs::DEFAULT_URL)]
    pub url: String,

    /// Location code the board filters by.
    #[arg(long, default_value = crate::sources::jobs::DEFAULT_LOCATION)]
    pub location: String,

    /// Last page to read (inclusive).
    #[arg(long, default_value_t = 10)]
    pub max_pages: u32,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Knobs shared by the scrape commands.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Database URL (falls back to TENDERWATCH_DATABASE_URL).
    #[arg(long)]
    pub database: Option<String>,

    /// Pause between pages (politeness).
    #[arg(long, default_value_t = 2000)]
    pub delay_ms: u64,

    /// Navigation and render timeout per page.
    #[arg(long, default_value_t = 30_000)]
    pub timeout_ms: u64,

    /// Reloads of an empty page before it ends pagination.
    #[arg(long, default_value_t = 0)]
    pub empty_page_retries: u32,

    /// Chrome/Chromium executable (falls back to TENDERWATCH_CHROME, then auto-detect).
    #[arg(long)]
    pub chrome: Option<PathBuf>,

    /// Show the browser window.
    #[arg(long, default_value_t = false)]
    pub headful: bool,
}

#[derive(Debug, Args)]
pub struct BackfillArgs {
    /// Database URL (falls back to TENDERWATCH_DATABASE_URL).
    #[arg(long)]
    pub database: Option<String>,
}
