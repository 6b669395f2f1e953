//! Headless browser seam.
//!
//! The scrape pipeline only talks to these traits; [`chromium`] implements
//! them over the Chrome DevTools Protocol, and tests implement them over
//! canned HTML.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

pub mod chromium;
pub mod launch;

pub use chromium::ChromiumLauncher;
pub use launch::LaunchConfig;

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, config: &LaunchConfig) -> anyhow::Result<Box<dyn BrowserSession>>;
}

/// A running browser process. Must be closed explicitly.
#[async_trait]
pub trait BrowserSession: Send {
    /// Opens a tab with non-essential sub-resources blocked.
    async fn new_tab(&mut self) -> anyhow::Result<Box<dyn Tab>>;

    async fn close(self: Box<Self>) -> anyhow::Result<()>;
}

#[async_trait]
pub trait Tab: Send + Sync {
    async fn goto(&self, url: &Url, timeout: Duration) -> anyhow::Result<()>;

    /// Resolves once `selector` matches, errors after `timeout`.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> anyhow::Result<()>;

    /// Clicks the first control in `selectors` that is present and waits for
    /// the navigation it triggers. `Ok(false)` when none is present.
    async fn follow(&self, selectors: &[&str], timeout: Duration) -> anyhow::Result<bool>;

    /// Serialised DOM of the current document.
    async fn content(&self) -> anyhow::Result<String>;

    async fn current_url(&self) -> anyhow::Result<Option<Url>>;
}
