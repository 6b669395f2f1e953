use chrono::{DateTime, Utc};
use url::Url;

use crate::model::{RawRecord, Record, RecordKind};

pub mod jobs;
pub mod tenders;

pub use jobs::JobsBoard;
pub use tenders::TenderPortal;

/// One listing site: where its pages live, how they look, and how rows become
/// records.
pub trait Source: Send + Sync {
    fn kind(&self) -> RecordKind;

    /// Address of listing page `page` (1-based).
    fn page_url(&self, page: u32) -> anyhow::Result<Url>;

    /// Present once the listing has rendered.
    fn ready_selector(&self) -> &str;

    /// In-page "next" controls, most specific first. Empty when the site only
    /// paginates by URL.
    fn next_controls(&self) -> &[&str] {
        &[]
    }

    fn default_max_pages(&self) -> u32 {
        10
    }

    /// Rows of one rendered page. Rows that cannot yield a record are dropped
    /// and logged; the rest are returned in page order.
    fn extract(&self, html: &str, page_url: &Url, page: u32) -> Vec<RawRecord>;

    fn normalize(&self, raw: RawRecord, scraped_at: DateTime<Utc>) -> Record;
}
