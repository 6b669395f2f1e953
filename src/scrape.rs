use std::sync::Arc;

use anyhow::Context as _;
use tokio::time::Instant;

use crate::browser::{BrowserLauncher, BrowserSession, LaunchConfig};
use crate::model::{Record, ScrapeResult};
use crate::paginate::{PaginationOptions, Paginator};
use crate::sink::Sink;
use crate::sources::Source;
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapePlan {
    pub max_pages: u32,
    pub start_page: u32,
}

impl ScrapePlan {
    /// The source's own page budget, starting from the first page.
    pub fn for_source(source: &dyn Source) -> Self {
        Self {
            max_pages: source.default_max_pages(),
            start_page: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Launching,
    Ready,
    Paginating,
    Closed,
    Persisting,
    Done,
    Failed,
}

struct Run {
    source: &'static str,
    state: RunState,
}

impl Run {
    fn enter(&mut self, next: RunState) {
        tracing::debug!(source = self.source, from = ?self.state, to = ?next, "scrape state");
        self.state = next;
    }
}

/// Runs one source end to end: browser session, pagination, persistence.
///
/// Holds no lock; each call owns its own browser session, so overlapping
/// calls are only serialised by the caller.
#[derive(Clone)]
pub struct Scraper {
    launcher: Arc<dyn BrowserLauncher>,
    sink: Sink,
    launch: LaunchConfig,
    options: PaginationOptions,
}

impl Scraper {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        store: Arc<dyn RecordStore>,
        launch: LaunchConfig,
        options: PaginationOptions,
    ) -> Self {
        Self {
            launcher,
            sink: Sink::new(store),
            launch,
            options,
        }
    }

    /// Scrapes `plan` pages of `source` and commits what was collected.
    ///
    /// The browser session is closed on every path before this returns,
    /// including when opening the tab fails. Collecting nothing is a
    /// success with all-zero counts.
    pub async fn scrape(
        &self,
        source: &dyn Source,
        plan: ScrapePlan,
    ) -> anyhow::Result<ScrapeResult> {
        if plan.start_page == 0 {
            anyhow::bail!("start page must be at least 1");
        }
        if plan.max_pages == 0 {
            anyhow::bail!("max pages must be at least 1");
        }

        let started = Instant::now();
        let mut run = Run {
            source: source.kind().as_str(),
            state: RunState::Idle,
        };
        tracing::info!(
            source = run.source,
            max_pages = plan.max_pages,
            start_page = plan.start_page,
            "scrape started"
        );

        run.enter(RunState::Launching);
        let mut session = match self.launcher.launch(&self.launch).await {
            Ok(session) => session,
            Err(err) => {
                run.enter(RunState::Failed);
                tracing::error!(
                    source = run.source,
                    error = %format!("{err:#}"),
                    "browser launch failed"
                );
                return Err(err.context("launch browser"));
            }
        };

        let collected = self.collect(&mut run, session.as_mut(), source, plan).await;

        if let Err(err) = session.close().await {
            tracing::warn!(
                source = run.source,
                error = %format!("{err:#}"),
                "browser did not close cleanly"
            );
        }
        run.enter(RunState::Closed);

        let records = match collected {
            Ok(records) => records,
            Err(err) => {
                run.enter(RunState::Failed);
                tracing::error!(source = run.source, error = %format!("{err:#}"), "scrape failed");
                return Err(err);
            }
        };

        let result = if records.is_empty() {
            tracing::info!(source = run.source, "nothing collected; skipping persistence");
            ScrapeResult::default()
        } else {
            run.enter(RunState::Persisting);
            self.sink.commit(&records).await
        };
        run.enter(RunState::Done);

        tracing::info!(
            source = run.source,
            saved = result.saved(),
            duplicates = result.duplicates(),
            errors = result.errors(),
            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "scrape finished"
        );
        Ok(result)
    }

    async fn collect(
        &self,
        run: &mut Run,
        session: &mut dyn BrowserSession,
        source: &dyn Source,
        plan: ScrapePlan,
    ) -> anyhow::Result<Vec<Record>> {
        let tab = session.new_tab().await.context("open listing tab")?;
        run.enter(RunState::Ready);

        run.enter(RunState::Paginating);
        let records = Paginator::new(source, self.options)
            .collect(tab.as_ref(), plan.max_pages, plan.start_page)
            .await;
        Ok(records)
    }
}
