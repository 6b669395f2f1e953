use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;

use crate::backfill::{self, BackfillReport};
use crate::browser::{ChromiumLauncher, LaunchConfig};
use crate::cli::{BackfillArgs, RunArgs, ScrapeJobsArgs, ScrapeTendersArgs};
use crate::config::Config;
use crate::model::ScrapeResult;
use crate::paginate::PaginationOptions;
use crate::scrape::{ScrapePlan, Scraper};
use crate::sources::{JobsBoard, Source, TenderPortal};
use crate::store::SqliteRecordStore;

pub async fn scrape_tenders(args: ScrapeTendersArgs) -> anyhow::Result<ScrapeResult> {
    let portal = TenderPortal::new(&args.url)?;
    let plan = ScrapePlan {
        max_pages: args.max_pages,
        start_page: args.start_page,
    };
    scrape(&portal, plan, &args.run).await
}

pub async fn scrape_jobs(args: ScrapeJobsArgs) -> anyhow::Result<ScrapeResult> {
    let board = JobsBoard::new(&args.url, args.location)?;
    let plan = ScrapePlan {
        max_pages: args.max_pages,
        start_page: 1,
    };
    scrape(&board, plan, &args.run).await
}

pub async fn backfill(args: BackfillArgs) -> anyhow::Result<BackfillReport> {
    let config = Config::from_env()?;
    let url = args.database.unwrap_or(config.database_url);
    let store = SqliteRecordStore::connect(&url).await?;
    let report = backfill::run(&store).await;
    store.close().await;
    report
}

/// Connects, scrapes and disconnects; the database is held only for the run.
async fn scrape(
    source: &dyn Source,
    plan: ScrapePlan,
    run: &RunArgs,
) -> anyhow::Result<ScrapeResult> {
    let config = Config::from_env()?;
    let launch = launch_config(run, &config);
    launch.validate().context("validate browser settings")?;

    let url = run.database.clone().unwrap_or(config.database_url);
    let store = SqliteRecordStore::connect(&url).await?;
    let scraper = Scraper::new(
        Arc::new(ChromiumLauncher),
        Arc::new(store.clone()),
        launch,
        pagination_options(run),
    );
    let result = scraper.scrape(source, plan).await;
    store.close().await;
    result
}

fn launch_config(run: &RunArgs, config: &Config) -> LaunchConfig {
    LaunchConfig {
        headless: !run.headful,
        executable: run.chrome.clone().or_else(|| config.chrome.clone()),
        request_timeout: Duration::from_millis(run.timeout_ms),
        ..LaunchConfig::default()
    }
}

fn pagination_options(run: &RunArgs) -> PaginationOptions {
    PaginationOptions {
        delay: Duration::from_millis(run.delay_ms),
        timeout: Duration::from_millis(run.timeout_ms),
        empty_page_retries: run.empty_page_retries,
    }
}
