use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use url::Url;

use crate::extract::{element_text, resolve_href, select_rows};
use crate::model::{RawRecord, Record, RecordKind, TenderRecord};
use crate::sources::Source;

pub const DEFAULT_URL: &str = "https://eprocure.gov.in/cppp/latestactivetendersnew/cpppdata";

const ROW_SELECTORS: &[&str] = &["#table tbody tr"];
const MIN_COLUMNS: usize = 7;

const SERIAL: &str = "serial_number";
const PUBLISHED: &str = "published_date";
const CLOSING: &str = "bid_submission_closing_date";
const OPENING: &str = "tender_opening_date";
const TITLE: &str = "title";
const LINK: &str = "tender_link";
const ORGANISATION: &str = "organisation_name";
const CORRIGENDUM: &str = "corrigendum";

/// Column order of the tender table; the title cell also carries the link.
const COLUMNS: [&str; MIN_COLUMNS] = [
    SERIAL,
    PUBLISHED,
    CLOSING,
    OPENING,
    TITLE,
    ORGANISATION,
    CORRIGENDUM,
];

/// Latest-active-tenders table of the central public procurement portal.
#[derive(Debug, Clone)]
pub struct TenderPortal {
    base_url: Url,
}

impl TenderPortal {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|err| anyhow::anyhow!("parse tender portal url {base_url:?}: {err}"))?;
        Ok(Self { base_url })
    }
}

impl Source for TenderPortal {
    fn kind(&self) -> RecordKind {
        RecordKind::Tender
    }

    fn page_url(&self, page: u32) -> anyhow::Result<Url> {
        let mut url = self.base_url.clone();
        if page > 1 {
            url.query_pairs_mut().append_pair("page", &page.to_string());
        }
        Ok(url)
    }

    fn ready_selector(&self) -> &str {
        "#table"
    }

    fn extract(&self, html: &str, page_url: &Url, page: u32) -> Vec<RawRecord> {
        let document = Html::parse_document(html);
        let Ok(cell_selector) = Selector::parse("td") else {
            return Vec::new();
        };
        let Ok(anchor_selector) = Selector::parse("a[href]") else {
            return Vec::new();
        };

        let rows = select_rows(&document, ROW_SELECTORS);
        tracing::info!(page, rows = rows.len(), "found tender rows");

        let mut out = Vec::with_capacity(rows.len());
        for (index, row) in rows.into_iter().enumerate() {
            let row_number = index + 1;
            let cells = row.select(&cell_selector).collect::<Vec<_>>();
            if cells.len() < MIN_COLUMNS {
                tracing::warn!(
                    page,
                    row = row_number,
                    columns = cells.len(),
                    "insufficient columns; skipping row"
                );
                continue;
            }

            let mut raw = RawRecord::new(page, row_number);
            for (name, cell) in COLUMNS.into_iter().zip(&cells) {
                raw.set(name, element_text(*cell));
            }
            if raw.get(TITLE).is_empty() {
                tracing::warn!(page, row = row_number, "missing title; skipping row");
                continue;
            }

            let link = cells[4]
                .select(&anchor_selector)
                .find_map(|anchor| resolve_href(anchor, page_url))
                .unwrap_or_default();
            raw.set(LINK, link);
            if raw.get(SERIAL).is_empty() {
                raw.set(SERIAL, format!("Page{page}-Row{row_number}"));
            }
            out.push(raw);
        }
        out
    }

    fn normalize(&self, mut raw: RawRecord, scraped_at: DateTime<Utc>) -> Record {
        let published_date = raw.take(PUBLISHED);
        Record::Tender(TenderRecord {
            id: None,
            serial_number: raw.take(SERIAL),
            published_at: crate::dates::normalize(&published_date),
            published_date,
            bid_submission_closing_date: raw.take(CLOSING),
            tender_opening_date: raw.take(OPENING),
            title: raw.take(TITLE),
            tender_link: raw.take(LINK),
            organisation_name: raw.take(ORGANISATION),
            corrigendum: raw.take(CORRIGENDUM),
            scraped_at,
        })
    }
}
