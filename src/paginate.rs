use std::time::Duration;

use chrono::Utc;

use crate::browser::Tab;
use crate::model::Record;
use crate::navigator::Navigator;
use crate::sources::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationOptions {
    /// Pause between consecutive pages.
    pub delay: Duration,
    /// Navigation and render timeout per page.
    pub timeout: Duration,
    /// Reloads of an empty page before it is taken as the end of data.
    pub empty_page_retries: u32,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(2000),
            timeout: Duration::from_millis(30_000),
            empty_page_retries: 0,
        }
    }
}

/// Walks listing pages of one source, accumulating normalised records.
pub struct Paginator<'a> {
    source: &'a dyn Source,
    options: PaginationOptions,
}

impl<'a> Paginator<'a> {
    pub fn new(source: &'a dyn Source, options: PaginationOptions) -> Self {
        Self { source, options }
    }

    /// Pages `start_page..=max_pages`, stopping early at the first page with
    /// no records or the first page that fails to load. Never fails: a broken
    /// page leaves the records gathered so far.
    pub async fn collect(&self, tab: &dyn Tab, max_pages: u32, start_page: u32) -> Vec<Record> {
        let navigator = Navigator::new(self.source, self.options.timeout, start_page);
        let mut records = Vec::new();
        let mut pages_with_data = 0u32;
        let mut current = start_page;

        while current <= max_pages {
            let page_records = match self.scrape_page(&navigator, tab, current).await {
                Ok(page_records) => page_records,
                Err(err) => {
                    tracing::warn!(page = current, ?err, "page failed; stopping pagination");
                    break;
                }
            };
            if page_records.is_empty() {
                tracing::info!(page = current, "no records; stopping pagination");
                break;
            }

            tracing::info!(page = current, records = page_records.len(), "page extracted");
            records.extend(page_records);
            pages_with_data += 1;

            if current < max_pages && !self.options.delay.is_zero() {
                tracing::debug!(delay = ?self.options.delay, "waiting before next page");
                tokio::time::sleep(self.options.delay).await;
            }
            let Some(next) = current.checked_add(1) else {
                break;
            };
            current = next;
        }

        tracing::info!(
            pages = pages_with_data,
            records = records.len(),
            "pagination finished"
        );
        records
    }

    async fn scrape_page(
        &self,
        navigator: &Navigator<'_>,
        tab: &dyn Tab,
        page: u32,
    ) -> anyhow::Result<Vec<Record>> {
        navigator.goto(tab, page).await?;
        let mut records = self.read_page(navigator, tab, page).await?;

        let mut retries = 0;
        while records.is_empty() && retries < self.options.empty_page_retries {
            retries += 1;
            tracing::info!(page, attempt = retries, "empty page; reloading");
            navigator.reload(tab, page).await?;
            records = self.read_page(navigator, tab, page).await?;
        }
        Ok(records)
    }

    async fn read_page(
        &self,
        navigator: &Navigator<'_>,
        tab: &dyn Tab,
        page: u32,
    ) -> anyhow::Result<Vec<Record>> {
        let html = tab.content().await?;
        let page_url = navigator.location(tab, page).await?;
        let scraped_at = Utc::now();
        Ok(self
            .source
            .extract(&html, &page_url, page)
            .into_iter()
            .map(|raw| self.source.normalize(raw, scraped_at))
            .collect())
    }
}
