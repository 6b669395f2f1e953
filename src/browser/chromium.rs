use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    EnableParams, EventRequestPaused, FailRequestParams, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use futures::StreamExt as _;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;

use crate::browser::{BrowserLauncher, BrowserSession, LaunchConfig, Tab};

const SELECTOR_POLL: Duration = Duration::from_millis(250);

fn blocked_resource_types() -> [ResourceType; 3] {
    [ResourceType::Image, ResourceType::Stylesheet, ResourceType::Font]
}

/// Launches a local Chrome/Chromium over the DevTools protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromiumLauncher;

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, config: &LaunchConfig) -> anyhow::Result<Box<dyn BrowserSession>> {
        config.validate().context("validate launch config")?;

        let (width, height) = config.window;
        let mut builder = BrowserConfig::builder()
            .window_size(width, height)
            .request_timeout(config.request_timeout)
            .args(config.args());
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &config.executable {
            builder = builder.chrome_executable(executable);
        }
        let browser_config = builder
            .build()
            .map_err(|err| anyhow::anyhow!("build browser config: {err}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("launch chromium")?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    tracing::debug!(%err, "browser handler error");
                }
            }
        });

        tracing::info!(headless = config.headless, "browser launched");
        Ok(Box::new(ChromiumSession {
            browser,
            handler_task,
        }))
    }
}

struct ChromiumSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn new_tab(&mut self) -> anyhow::Result<Box<dyn Tab>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("open browser tab")?;
        let interceptor = block_subresources(&page)
            .await
            .context("install request filter")?;
        Ok(Box::new(ChromiumTab { page, interceptor }))
    }

    async fn close(mut self: Box<Self>) -> anyhow::Result<()> {
        let closed = self.browser.close().await.context("close browser");
        if let Err(err) = self.browser.wait().await {
            tracing::debug!(%err, "wait for browser exit");
        }
        self.handler_task.abort();
        closed.map(|_| ())
    }
}

/// Fails image, stylesheet and font requests before they are sent. Only those
/// resource types are intercepted, so document and script requests never
/// pause.
async fn block_subresources(page: &Page) -> anyhow::Result<JoinHandle<()>> {
    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .context("listen for paused requests")?;

    let patterns = blocked_resource_types().into_iter().map(|resource_type| {
        RequestPattern::builder()
            .url_pattern("*")
            .resource_type(resource_type)
            .request_stage(RequestStage::Request)
            .build()
    });
    page.execute(EnableParams::builder().patterns(patterns).build())
        .await
        .context("enable fetch interception")?;

    let page = page.clone();
    Ok(tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let block =
                FailRequestParams::new(event.request_id.clone(), ErrorReason::BlockedByClient);
            if let Err(err) = page.execute(block).await {
                tracing::debug!(%err, url = %event.request.url, "failed to block request");
            }
        }
    }))
}

struct ChromiumTab {
    page: Page,
    interceptor: JoinHandle<()>,
}

impl Drop for ChromiumTab {
    fn drop(&mut self) {
        self.interceptor.abort();
    }
}

#[async_trait]
impl Tab for ChromiumTab {
    async fn goto(&self, url: &Url, timeout: Duration) -> anyhow::Result<()> {
        tokio::time::timeout(timeout, self.page.goto(url.as_str()))
            .await
            .map_err(|_| anyhow::anyhow!("navigation to {url} timed out after {timeout:?}"))?
            .with_context(|| format!("navigate to {url}"))?;
        Ok(())
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> anyhow::Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                anyhow::bail!("selector {selector:?} did not appear within {timeout:?}");
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }

    async fn follow(&self, selectors: &[&str], timeout: Duration) -> anyhow::Result<bool> {
        for selector in selectors {
            let Ok(control) = self.page.find_element(*selector).await else {
                continue;
            };
            control
                .click()
                .await
                .with_context(|| format!("click {selector:?}"))?;
            tokio::time::timeout(timeout, self.page.wait_for_navigation())
                .await
                .map_err(|_| anyhow::anyhow!("no navigation after clicking {selector:?}"))?
                .context("wait for navigation")?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn content(&self) -> anyhow::Result<String> {
        self.page.content().await.context("read page content")
    }

    async fn current_url(&self) -> anyhow::Result<Option<Url>> {
        let Some(url) = self.page.url().await.context("read page url")? else {
            return Ok(None);
        };
        Ok(Url::parse(&url).ok())
    }
}
