use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;

use tenderwatch::api::{self, AppState};
use tenderwatch::browser::{ChromiumLauncher, LaunchConfig};
use tenderwatch::config::Config;
use tenderwatch::paginate::PaginationOptions;
use tenderwatch::scheduler::{self, RunGuard, ScheduledScrape};
use tenderwatch::scrape::Scraper;
use tenderwatch::sources::{JobsBoard, Source, TenderPortal, jobs, tenders};
use tenderwatch::store::{RecordStore, SqliteRecordStore};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct ApiArgs {
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: SocketAddr,

    /// Database URL (falls back to TENDERWATCH_DATABASE_URL).
    #[arg(long)]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    tenderwatch::logging::init()?;

    let args = ApiArgs::parse();
    let config = Config::from_env()?;
    tracing::info!(?args, ?config, "starting tenderwatch-api");

    let launch = LaunchConfig {
        executable: config.chrome.clone(),
        ..LaunchConfig::default()
    };
    launch.validate().context("validate browser settings")?;

    let tender_portal = Arc::new(TenderPortal::new(tenders::DEFAULT_URL)?);
    let jobs_board = Arc::new(JobsBoard::new(jobs::DEFAULT_URL, jobs::DEFAULT_LOCATION)?);
    let guard = RunGuard::new();

    let database_url = args.database.unwrap_or_else(|| config.database_url.clone());
    let store = match SqliteRecordStore::connect(&database_url).await {
        Ok(store) => Some(store),
        Err(err) => {
            tracing::error!(
                error = %format!("{err:#}"),
                "database unavailable; serving degraded responses"
            );
            None
        }
    };

    let scraper = store.clone().map(|store| {
        Scraper::new(
            Arc::new(ChromiumLauncher),
            Arc::new(store),
            launch,
            PaginationOptions::default(),
        )
    });

    let scheduler = match &scraper {
        Some(scraper) => {
            let sources = vec![
                Arc::clone(&tender_portal) as Arc<dyn Source>,
                Arc::clone(&jobs_board) as Arc<dyn Source>,
            ];
            let task = ScheduledScrape::new(scraper.clone(), sources, guard.clone());
            scheduler::start(&config.scheduler, task).await?
        }
        None => {
            tracing::warn!("scheduler not started without a database");
            None
        }
    };

    let state = AppState {
        store: store
            .clone()
            .map(|store| Arc::new(store) as Arc<dyn RecordStore>),
        scraper,
        tenders: tender_portal,
        jobs: jobs_board,
        guard,
    };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(mut scheduler) = scheduler {
        if let Err(err) = scheduler.shutdown().await {
            tracing::warn!(%err, "scheduler shutdown");
        }
    }
    if let Some(store) = store {
        store.close().await;
    }
    tracing::info!("stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "listen for ctrl-c");
    }
    tracing::info!("shutdown requested");
}
