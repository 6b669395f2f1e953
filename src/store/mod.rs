use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::model::{Record, RecordKind};

pub mod sqlite;

pub use sqlite::SqliteRecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with the same dedup key is already stored.
    Duplicate,
}

/// Filters and paging for listing stored records.
///
/// `organisation` applies to tenders; `company` and `location` to jobs. The
/// date bounds are inclusive and apply to the canonical published timestamp
/// for tenders and the scrape time for jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
    pub organisation: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub sort_by: Option<String>,
    pub descending: bool,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            search: None,
            organisation: None,
            company: None,
            location: None,
            since: None,
            until: None,
            sort_by: None,
            descending: true,
        }
    }
}

impl ListQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPage {
    pub records: Vec<Record>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total: u64,
    pub today: u64,
    /// Largest organisations (tenders) or companies (jobs), most records first.
    pub top: Vec<GroupCount>,
}

/// Document store for scraped records.
///
/// Tenders are unique on `(title, published_date)` and jobs on
/// `(title, company, location)`; inserting a second record with the same key
/// reports [`InsertOutcome::Duplicate`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, record: &Record) -> anyhow::Result<InsertOutcome>;

    async fn list(&self, kind: RecordKind, query: &ListQuery) -> anyhow::Result<ListPage>;

    async fn get(&self, kind: RecordKind, id: i64) -> anyhow::Result<Option<Record>>;

    /// `today` counts records dated within that UTC calendar day.
    async fn stats(&self, kind: RecordKind, today: NaiveDate) -> anyhow::Result<Stats>;

    /// `(id, published_date)` of tenders without a canonical timestamp.
    async fn tenders_missing_published_at(&self) -> anyhow::Result<Vec<(i64, String)>>;

    async fn set_published_at(&self, id: i64, published_at: DateTime<Utc>) -> anyhow::Result<()>;

    async fn ping(&self) -> anyhow::Result<()>;
}
