use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    tenderwatch::logging::init().context("init logging")?;

    let cli = tenderwatch::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    let summary = match cli.command {
        tenderwatch::cli::Command::ScrapeTenders(args) => {
            let result = tenderwatch::commands::scrape_tenders(args)
                .await
                .context("scrape tenders")?;
            serde_json::to_string_pretty(&result)?
        }
        tenderwatch::cli::Command::ScrapeJobs(args) => {
            let result = tenderwatch::commands::scrape_jobs(args)
                .await
                .context("scrape jobs")?;
            serde_json::to_string_pretty(&result)?
        }
        tenderwatch::cli::Command::Backfill(args) => {
            let report = tenderwatch::commands::backfill(args)
                .await
                .context("backfill")?;
            serde_json::to_string_pretty(&report)?
        }
    };
    println!("{summary}");

    Ok(())
}
