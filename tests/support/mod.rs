//! Scripted in-memory browser: serves canned HTML per URL.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use url::Url;

use tenderwatch::browser::{BrowserLauncher, BrowserSession, LaunchConfig, Tab};

pub const PORTAL: &str = "https://tenders.test/latest";
pub const BOARD: &str = "https://jobs.test/search";

#[derive(Debug, Clone)]
pub enum Visit {
    Html(String),
    Timeout,
}

/// How the tab answers a "next page" control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Controls {
    /// No control on any page.
    #[default]
    Absent,
    /// Controls follow the links registered with [`Script::next`].
    Linked,
    /// Every control click fails.
    Stale,
}

/// Responses per URL, served in order; the last one repeats.
#[derive(Debug, Default)]
pub struct Script {
    pages: Mutex<HashMap<String, VecDeque<Visit>>>,
    links: HashMap<String, String>,
    controls: Controls,
}

impl Script {
    pub fn page(self, url: &str, visit: Visit) -> Self {
        self.pages
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(visit);
        self
    }

    /// Clicking the next control on `from` lands on `to`.
    pub fn next(mut self, from: &str, to: &str) -> Self {
        self.links.insert(from.to_string(), to.to_string());
        self.controls = Controls::Linked;
        self
    }

    pub fn controls(mut self, controls: Controls) -> Self {
        self.controls = controls;
        self
    }

    fn visit(&self, url: &str) -> Option<Visit> {
        let mut pages = self.pages.lock().unwrap();
        let queue = pages.get_mut(url)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[derive(Debug, Default)]
pub struct Counters {
    pub launches: AtomicUsize,
    pub closes: AtomicUsize,
    pub navigations: Mutex<Vec<String>>,
    pub follows: Mutex<Vec<String>>,
}

impl Counters {
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    /// Pages reached by clicking a next control rather than by URL.
    pub fn follows(&self) -> Vec<String> {
        self.follows.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Failure {
    #[default]
    None,
    Launch,
    NewTab,
}

pub struct ScriptedLauncher {
    script: Arc<Script>,
    pub counters: Arc<Counters>,
    failure: Failure,
}

impl ScriptedLauncher {
    pub fn new(script: Script) -> Self {
        Self {
            script: Arc::new(script),
            counters: Arc::new(Counters::default()),
            failure: Failure::None,
        }
    }

    pub fn failing(mut self, failure: Failure) -> Self {
        self.failure = failure;
        self
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    async fn launch(&self, _config: &LaunchConfig) -> anyhow::Result<Box<dyn BrowserSession>> {
        if self.failure == Failure::Launch {
            anyhow::bail!("no browser binary");
        }
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            script: Arc::clone(&self.script),
            counters: Arc::clone(&self.counters),
            fail_tab: self.failure == Failure::NewTab,
        }))
    }
}

struct ScriptedSession {
    script: Arc<Script>,
    counters: Arc<Counters>,
    fail_tab: bool,
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn new_tab(&mut self) -> anyhow::Result<Box<dyn Tab>> {
        if self.fail_tab {
            anyhow::bail!("target crashed");
        }
        Ok(Box::new(ScriptedTab {
            script: Arc::clone(&self.script),
            counters: Arc::clone(&self.counters),
            current: Mutex::new(None),
        }))
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct ScriptedTab {
    script: Arc<Script>,
    counters: Arc<Counters>,
    current: Mutex<Option<(Url, String)>>,
}

impl ScriptedTab {
    fn load(&self, url: &Url, timeout: Duration) -> anyhow::Result<()> {
        match self.script.visit(url.as_str()) {
            Some(Visit::Html(html)) => {
                *self.current.lock().unwrap() = Some((url.clone(), html));
                Ok(())
            }
            Some(Visit::Timeout) => {
                anyhow::bail!("navigation to {url} timed out after {timeout:?}")
            }
            None => anyhow::bail!("net::ERR_NAME_NOT_RESOLVED at {url}"),
        }
    }
}

#[async_trait]
impl Tab for ScriptedTab {
    async fn goto(&self, url: &Url, timeout: Duration) -> anyhow::Result<()> {
        self.counters
            .navigations
            .lock()
            .unwrap()
            .push(url.to_string());
        self.load(url, timeout)
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> anyhow::Result<()> {
        let html = self.content().await?;
        let selector = Selector::parse(selector).map_err(|err| anyhow::anyhow!("{err}"))?;
        if Html::parse_document(&html).select(&selector).next().is_none() {
            anyhow::bail!("selector did not appear within {timeout:?}");
        }
        Ok(())
    }

    async fn follow(&self, _selectors: &[&str], timeout: Duration) -> anyhow::Result<bool> {
        match self.script.controls {
            Controls::Absent => Ok(false),
            Controls::Stale => anyhow::bail!("stale control"),
            Controls::Linked => {
                let Some(current) = self.current_url().await? else {
                    return Ok(false);
                };
                let Some(target) = self.script.links.get(current.as_str()) else {
                    return Ok(false);
                };
                let target = Url::parse(target)?;
                self.counters
                    .follows
                    .lock()
                    .unwrap()
                    .push(target.to_string());
                self.load(&target, timeout)?;
                Ok(true)
            }
        }
    }

    async fn content(&self) -> anyhow::Result<String> {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .map(|(_, html)| html.clone())
            .ok_or_else(|| anyhow::anyhow!("no document loaded"))
    }

    async fn current_url(&self) -> anyhow::Result<Option<Url>> {
        Ok(self.current.lock().unwrap().as_ref().map(|(url, _)| url.clone()))
    }
}

pub fn portal_page(page: u32) -> String {
    if page <= 1 {
        PORTAL.to_string()
    } else {
        format!("{PORTAL}?page={page}")
    }
}

/// Tender table with one row per title, all published on `date`.
pub fn tender_table(titles: &[String], date: &str) -> Visit {
    let rows = titles
        .iter()
        .enumerate()
        .map(|(i, title)| {
            format!(
                "<tr><td>{n}</td><td>{date}</td><td>30-Jul-2025 03:00 PM</td>\
                 <td>31-Jul-2025 03:30 PM</td><td><a href=\"/tender/{n}\">{title}</a></td>\
                 <td>Public Works</td><td></td></tr>",
                n = i + 1
            )
        })
        .collect::<String>();
    Visit::Html(format!(
        "<html><body><table id=\"table\"><tbody>{rows}</tbody></table></body></html>"
    ))
}

pub fn titles(prefix: &str, count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("{prefix} {i}")).collect()
}

/// Jobs board result list with one card per title.
pub fn job_results(titles: &[String]) -> Visit {
    let cards = titles
        .iter()
        .enumerate()
        .map(|(i, title)| {
            format!(
                "<div class=\"search-result\"><h3><a href=\"/details/{n}\">{title}</a></h3>\
                 <ul><li><strong>Acme Ltd</strong> - Leeds</li><li>£25,000</li></ul></div>",
                n = i + 1
            )
        })
        .collect::<String>();
    Visit::Html(format!("<html><body><main>{cards}</main></body></html>"))
}
