use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html};
use url::Url;

use crate::extract::{FieldSpec, Strategy, element_text, extract_fields, select_rows};
use crate::model::{JobRecord, RawRecord, Record, RecordKind};
use crate::sources::Source;

pub const DEFAULT_URL: &str = "https://findajob.dwp.gov.uk/search";
pub const DEFAULT_LOCATION: &str = "86383";

/// Listing anchors, most specific first. Heading anchors are widened to their
/// enclosing block before field extraction.
const ROW_SELECTORS: &[&str] = &["div.search-result", ".job-listing", "article", "h3"];
const CONTAINER_TAGS: &[&str] = &["div", "article", "section", "li"];
const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4"];

const NEXT_CONTROLS: &[&str] = &[
    "a[rel=\"next\"]",
    ".pager-next a",
    ".pagination a:last-child",
    "a.next",
    ".next a",
];

const TITLE: &str = "title";

const KEYWORD_SCOPE: &str = "li, span, div";

const TITLE_SPEC: FieldSpec = FieldSpec {
    name: TITLE,
    strategies: &[
        Strategy::Text("h3"),
        Strategy::Text("h2"),
        Strategy::Text(".job-title"),
        Strategy::Text(".title"),
    ],
};

const DETAIL_SPECS: &[FieldSpec] = &[
    FieldSpec {
        name: "company",
        strategies: &[
            Strategy::Text(".company"),
            Strategy::Text(".employer"),
            Strategy::Text("strong"),
        ],
    },
    FieldSpec {
        name: "location",
        strategies: &[
            Strategy::Text(".location"),
            Strategy::Text(".job-location"),
            Strategy::Nth {
                selector: "li",
                index: 0,
            },
        ],
    },
    FieldSpec {
        name: "salary",
        strategies: &[
            Strategy::Text(".salary"),
            Strategy::Text(".job-salary"),
            Strategy::Nth {
                selector: "li",
                index: 1,
            },
        ],
    },
    FieldSpec {
        name: "job_type",
        strategies: &[
            Strategy::Text(".job-type"),
            Strategy::Keywords {
                selector: KEYWORD_SCOPE,
                vocabulary: &["Permanent", "Contract", "Temporary", "Apprenticeship"],
            },
        ],
    },
    FieldSpec {
        name: "work_type",
        strategies: &[
            Strategy::Text(".work-type"),
            Strategy::Keywords {
                selector: KEYWORD_SCOPE,
                vocabulary: &["Full time", "Part time"],
            },
        ],
    },
    FieldSpec {
        name: "remote_type",
        strategies: &[
            Strategy::Text(".remote-type"),
            Strategy::Keywords {
                selector: KEYWORD_SCOPE,
                vocabulary: &["On-site only", "Hybrid remote", "Fully remote"],
            },
        ],
    },
    FieldSpec {
        name: "posted_date",
        strategies: &[
            Strategy::Text(".posted-date"),
            Strategy::Text(".date"),
            Strategy::Text("time"),
            Strategy::Nth {
                selector: "li",
                index: 0,
            },
        ],
    },
    FieldSpec {
        name: "job_link",
        strategies: &[
            Strategy::Link("h3 a[href]"),
            Strategy::Link(".job-title a[href]"),
            Strategy::Link("a[href]"),
        ],
    },
    FieldSpec {
        name: "description",
        strategies: &[
            Strategy::Text(".description"),
            Strategy::Text(".job-description"),
            Strategy::Text("p"),
        ],
    },
    FieldSpec {
        name: "category",
        strategies: &[Strategy::Text(".category"), Strategy::Text(".job-category")],
    },
];

/// Search results of the public jobs board, filtered by a location code.
#[derive(Debug, Clone)]
pub struct JobsBoard {
    base_url: Url,
    location: String,
}

impl JobsBoard {
    pub fn new(base_url: &str, location: impl Into<String>) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|err| anyhow::anyhow!("parse jobs board url {base_url:?}: {err}"))?;
        let location = location.into();
        if location.trim().is_empty() {
            anyhow::bail!("jobs board location code is empty");
        }
        Ok(Self { base_url, location })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Same board, searched around another location code.
    pub fn with_location(&self, location: impl Into<String>) -> anyhow::Result<Self> {
        let location = location.into();
        if location.trim().is_empty() {
            anyhow::bail!("jobs board location code is empty");
        }
        Ok(Self {
            base_url: self.base_url.clone(),
            location,
        })
    }
}

impl Source for JobsBoard {
    fn kind(&self) -> RecordKind {
        RecordKind::Job
    }

    fn page_url(&self, page: u32) -> anyhow::Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("q", "");
            query.append_pair("loc", &self.location);
            if page > 1 {
                query.append_pair("page", &page.to_string());
            }
        }
        Ok(url)
    }

    fn ready_selector(&self) -> &str {
        "h3"
    }

    fn next_controls(&self) -> &[&str] {
        NEXT_CONTROLS
    }

    fn extract(&self, html: &str, page_url: &Url, page: u32) -> Vec<RawRecord> {
        let document = Html::parse_document(html);
        let anchors = select_rows(&document, ROW_SELECTORS);
        tracing::info!(page, listings = anchors.len(), "found job listings");

        let mut out = Vec::with_capacity(anchors.len());
        for (index, anchor) in anchors.into_iter().enumerate() {
            let row_number = index + 1;
            let (title, container) = if is_heading(anchor) {
                (element_text(anchor), enclosing_block(anchor))
            } else {
                (TITLE_SPEC.extract(anchor, page_url), anchor)
            };
            if title.is_empty() {
                tracing::warn!(page, row = row_number, "missing title; skipping listing");
                continue;
            }

            let mut raw = RawRecord::new(page, row_number);
            raw.set(TITLE, title);
            extract_fields(container, DETAIL_SPECS, page_url, &mut raw);
            out.push(raw);
        }
        out
    }

    fn normalize(&self, mut raw: RawRecord, scraped_at: DateTime<Utc>) -> Record {
        Record::Job(JobRecord {
            id: None,
            title: raw.take(TITLE),
            company: raw.take("company"),
            location: raw.take("location"),
            salary: raw.take("salary"),
            job_type: raw.take("job_type"),
            work_type: raw.take("work_type"),
            remote_type: raw.take("remote_type"),
            posted_date: raw.take("posted_date"),
            job_link: raw.take("job_link"),
            description: raw.take("description"),
            category: raw.take("category"),
            scraped_at,
        })
    }
}

fn is_heading(el: ElementRef<'_>) -> bool {
    HEADING_TAGS.contains(&el.value().name())
}

fn enclosing_block(el: ElementRef<'_>) -> ElementRef<'_> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| CONTAINER_TAGS.contains(&ancestor.value().name()))
        .unwrap_or(el)
}
