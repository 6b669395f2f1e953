use std::sync::Arc;

use anyhow::Context as _;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::SchedulerConfig;
use crate::scrape::{ScrapePlan, Scraper};
use crate::sources::Source;

/// Admits one scrape run at a time.
///
/// Shared between the scheduler and the manual trigger. A run holds the
/// returned permit until it finishes; dropping it lets the next run in.
#[derive(Debug, Clone)]
pub struct RunGuard {
    semaphore: Arc<Semaphore>,
}

impl Default for RunGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl RunGuard {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// `None` while another run holds the guard.
    pub fn try_begin(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore).try_acquire_owned().ok()
    }

    pub fn is_running(&self) -> bool {
        self.semaphore.available_permits() == 0
    }
}

/// One scheduled tick: every source in order under the run guard.
pub struct ScheduledScrape {
    scraper: Scraper,
    sources: Vec<Arc<dyn Source>>,
    guard: RunGuard,
}

impl ScheduledScrape {
    pub fn new(scraper: Scraper, sources: Vec<Arc<dyn Source>>, guard: RunGuard) -> Self {
        Self {
            scraper,
            sources,
            guard,
        }
    }

    /// Returns `false` when skipped because a run was already in flight.
    /// A failing source is logged and does not stop the ones after it.
    pub async fn run(&self) -> bool {
        let Some(_permit) = self.guard.try_begin() else {
            tracing::warn!("previous scrape still running; skipping scheduled run");
            return false;
        };

        tracing::info!(sources = self.sources.len(), "scheduled scrape started");
        for source in &self.sources {
            let started = Instant::now();
            let kind = source.kind().as_str();
            let plan = ScrapePlan::for_source(source.as_ref());
            match self.scraper.scrape(source.as_ref(), plan).await {
                Ok(result) => tracing::info!(
                    source = kind,
                    saved = result.saved(),
                    duplicates = result.duplicates(),
                    errors = result.errors(),
                    duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "scheduled scrape completed"
                ),
                Err(err) => tracing::error!(
                    source = kind,
                    error = %format!("{err:#}"),
                    "scheduled scrape failed"
                ),
            }
        }
        true
    }
}

/// Registers `task` on a cron schedule and starts ticking. `Ok(None)` when
/// the scheduler is disabled.
pub async fn start(
    config: &SchedulerConfig,
    task: ScheduledScrape,
) -> anyhow::Result<Option<JobScheduler>> {
    if !config.enabled {
        tracing::info!("scheduler disabled");
        return Ok(None);
    }

    let scheduler = JobScheduler::new().await.context("create scheduler")?;
    let task = Arc::new(task);
    let job = Job::new_async_tz(config.cron.as_str(), config.timezone, move |_id, _scheduler| {
        let task = Arc::clone(&task);
        Box::pin(async move {
            task.run().await;
        })
    })
    .with_context(|| format!("create scheduled scrape for cron {:?}", config.cron))?;
    scheduler.add(job).await.context("add scheduled scrape")?;
    scheduler.start().await.context("start scheduler")?;

    tracing::info!(cron = %config.cron, timezone = %config.timezone, "scheduler started");
    Ok(Some(scheduler))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::browser::{BrowserLauncher, BrowserSession, LaunchConfig};
    use crate::paginate::PaginationOptions;
    use crate::sources::{JobsBoard, TenderPortal, jobs, tenders};
    use crate::store::SqliteRecordStore;

    /// Never starts a browser; remembers the launch attempts.
    #[derive(Default)]
    struct NoBrowser {
        attempts: Mutex<usize>,
    }

    #[async_trait]
    impl BrowserLauncher for NoBrowser {
        async fn launch(&self, _: &LaunchConfig) -> anyhow::Result<Box<dyn BrowserSession>> {
            *self.attempts.lock().unwrap() += 1;
            anyhow::bail!("chromium exited during startup")
        }
    }

    async fn tick(launcher: &Arc<NoBrowser>, guard: RunGuard) -> ScheduledScrape {
        let store = SqliteRecordStore::connect("sqlite::memory:").await.unwrap();
        let scraper = Scraper::new(
            Arc::clone(launcher) as _,
            Arc::new(store),
            LaunchConfig::default(),
            PaginationOptions::default(),
        );
        let sources: Vec<Arc<dyn Source>> = vec![
            Arc::new(TenderPortal::new(tenders::DEFAULT_URL).unwrap()),
            Arc::new(JobsBoard::new(jobs::DEFAULT_URL, jobs::DEFAULT_LOCATION).unwrap()),
        ];
        ScheduledScrape::new(scraper, sources, guard)
    }

    #[tokio::test]
    async fn tick_is_skipped_while_another_run_holds_the_guard() {
        let launcher = Arc::new(NoBrowser::default());
        let guard = RunGuard::new();
        let task = tick(&launcher, guard.clone()).await;

        let held = guard.try_begin().unwrap();
        assert!(!task.run().await);
        assert_eq!(*launcher.attempts.lock().unwrap(), 0);

        drop(held);
        assert!(task.run().await);
        assert!(!guard.is_running());
    }

    #[tokio::test]
    async fn failing_source_does_not_stop_the_next_one() {
        let launcher = Arc::new(NoBrowser::default());
        let task = tick(&launcher, RunGuard::new()).await;

        assert!(task.run().await);
        assert_eq!(*launcher.attempts.lock().unwrap(), 2);
    }

    #[test]
    fn guard_admits_one_run_at_a_time() {
        let guard = RunGuard::new();
        let shared = guard.clone();

        let permit = guard.try_begin().unwrap();
        assert!(shared.is_running());
        assert!(shared.try_begin().is_none());

        drop(permit);
        assert!(!guard.is_running());
        assert!(shared.try_begin().is_some());
    }

    #[test]
    fn separate_guards_are_independent() {
        let a = RunGuard::new();
        let b = RunGuard::new();
        let _held = a.try_begin().unwrap();
        assert!(b.try_begin().is_some());
    }
}
