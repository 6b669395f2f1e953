use std::time::Duration;

use anyhow::Context as _;
use url::Url;

use crate::browser::Tab;
use crate::sources::Source;

/// Moves a tab to a listing page of one source and waits for it to render.
pub struct Navigator<'a> {
    source: &'a dyn Source,
    timeout: Duration,
    first_page: u32,
}

impl<'a> Navigator<'a> {
    /// `first_page` is loaded by URL; later pages try the source's "next"
    /// control first.
    pub fn new(source: &'a dyn Source, timeout: Duration, first_page: u32) -> Self {
        Self {
            source,
            timeout,
            first_page,
        }
    }

    pub async fn goto(&self, tab: &dyn Tab, page: u32) -> anyhow::Result<()> {
        if page == self.first_page || !self.follow_next(tab, page).await {
            let url = self.source.page_url(page)?;
            tracing::info!(page, %url, "navigating");
            tab.goto(&url, self.timeout).await?;
        }

        tab.wait_for(self.source.ready_selector(), self.timeout)
            .await
            .with_context(|| format!("listing of page {page} did not render"))?;
        tracing::info!(page, "page loaded");
        Ok(())
    }

    /// Reloads `page` by URL regardless of in-page controls.
    pub async fn reload(&self, tab: &dyn Tab, page: u32) -> anyhow::Result<()> {
        let url = self.source.page_url(page)?;
        tab.goto(&url, self.timeout).await?;
        tab.wait_for(self.source.ready_selector(), self.timeout)
            .await
            .with_context(|| format!("listing of page {page} did not render"))
    }

    /// Address to resolve relative links against.
    pub async fn location(&self, tab: &dyn Tab, page: u32) -> anyhow::Result<Url> {
        match tab.current_url().await {
            Ok(Some(url)) if matches!(url.scheme(), "http" | "https") => Ok(url),
            _ => self.source.page_url(page),
        }
    }

    async fn follow_next(&self, tab: &dyn Tab, page: u32) -> bool {
        let controls = self.source.next_controls();
        if controls.is_empty() {
            return false;
        }
        match tab.follow(controls, self.timeout).await {
            Ok(true) => {
                tracing::info!(page, "followed next-page control");
                true
            }
            Ok(false) => {
                tracing::warn!(page, "no next-page control; falling back to page url");
                false
            }
            Err(err) => {
                tracing::warn!(page, ?err, "next-page control failed; falling back to page url");
                false
            }
        }
    }
}
