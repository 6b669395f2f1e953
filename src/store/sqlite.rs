use std::str::FromStr as _;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};

use crate::model::{JobRecord, Record, RecordKind, TenderRecord};
use crate::store::{GroupCount, InsertOutcome, ListPage, ListQuery, RecordStore, Stats};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tenders (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        serial_number TEXT NOT NULL DEFAULT '',
        published_date TEXT NOT NULL DEFAULT '',
        published_at TEXT,
        bid_submission_closing_date TEXT NOT NULL DEFAULT '',
        tender_opening_date TEXT NOT NULL DEFAULT '',
        title TEXT NOT NULL CHECK (length(trim(title)) > 0),
        tender_link TEXT NOT NULL DEFAULT '',
        organisation_name TEXT NOT NULL DEFAULT '',
        corrigendum TEXT NOT NULL DEFAULT '',
        scraped_at TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        UNIQUE (title, published_date)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL CHECK (length(trim(title)) > 0),
        company TEXT NOT NULL DEFAULT '',
        location TEXT NOT NULL DEFAULT '',
        salary TEXT NOT NULL DEFAULT '',
        job_type TEXT NOT NULL DEFAULT '',
        work_type TEXT NOT NULL DEFAULT '',
        remote_type TEXT NOT NULL DEFAULT '',
        posted_date TEXT NOT NULL DEFAULT '',
        job_link TEXT NOT NULL DEFAULT '',
        description TEXT NOT NULL DEFAULT '',
        category TEXT NOT NULL DEFAULT '',
        scraped_at TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        UNIQUE (title, company, location)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS tenders_published_at ON tenders (published_at)",
    "CREATE INDEX IF NOT EXISTS jobs_scraped_at ON jobs (scraped_at)",
];

const TENDER_COLUMNS: &str = "id, serial_number, published_date, published_at, \
    bid_submission_closing_date, tender_opening_date, title, tender_link, organisation_name, \
    corrigendum, scraped_at";
const JOB_COLUMNS: &str = "id, title, company, location, salary, job_type, work_type, \
    remote_type, posted_date, job_link, description, category, scraped_at";

const TOP_GROUPS: i64 = 10;

/// [`RecordStore`] over a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Opens (creating if needed) the database at `url` and applies the schema.
    /// In-memory URLs are pinned to a single connection so the data outlives
    /// individual queries.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("parse database url {url:?}"))?
            .create_if_missing(true);

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool_options = SqlitePoolOptions::new().acquire_timeout(Duration::from_secs(5));
        let pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("connect to {url}"))?;
        let store = Self { pool };
        store.migrate().await.context("apply schema")?;
        tracing::info!(url, "database connected");
        Ok(store)
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("database disconnected");
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn insert_tender(&self, tender: &TenderRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO tenders (
                serial_number, published_date, published_at, bid_submission_closing_date,
                tender_opening_date, title, tender_link, organisation_name, corrigendum, scraped_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tender.serial_number)
        .bind(&tender.published_date)
        .bind(tender.published_at.map(encode_ts))
        .bind(&tender.bid_submission_closing_date)
        .bind(&tender.tender_opening_date)
        .bind(&tender.title)
        .bind(&tender.tender_link)
        .bind(&tender.organisation_name)
        .bind(&tender.corrigendum)
        .bind(encode_ts(tender.scraped_at))
        .execute(&self.pool)
        .await
        .map(|_| ())
    }

    async fn insert_job(&self, job: &JobRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                title, company, location, salary, job_type, work_type, remote_type,
                posted_date, job_link, description, category, scraped_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.title)
        .bind(&job.company)
        .bind(&job.location)
        .bind(&job.salary)
        .bind(&job.job_type)
        .bind(&job.work_type)
        .bind(&job.remote_type)
        .bind(&job.posted_date)
        .bind(&job.job_link)
        .bind(&job.description)
        .bind(&job.category)
        .bind(encode_ts(job.scraped_at))
        .execute(&self.pool)
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, record: &Record) -> anyhow::Result<InsertOutcome> {
        let result = match record {
            Record::Tender(tender) => self.insert_tender(tender).await,
            Record::Job(job) => self.insert_job(job).await,
        };
        match result {
            Ok(()) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Ok(InsertOutcome::Duplicate)
            }
            Err(err) => {
                Err(err).with_context(|| format!("insert {}", record.kind().as_str()))
            }
        }
    }

    async fn list(&self, kind: RecordKind, query: &ListQuery) -> anyhow::Result<ListPage> {
        let table = table(kind);

        let mut count = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {table}"));
        push_filters(&mut count, kind, query);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .context("count records")?;

        let direction = if query.descending { "DESC" } else { "ASC" };
        let mut select = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM {table}",
            columns(kind)
        ));
        push_filters(&mut select, kind, query);
        select
            .push(format!(
                " ORDER BY {} {direction}, id {direction}",
                sort_column(kind, query.sort_by.as_deref())
            ))
            .push(" LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));

        let records = match kind {
            RecordKind::Tender => select
                .build_query_as::<TenderRow>()
                .fetch_all(&self.pool)
                .await
                .context("list tenders")?
                .into_iter()
                .map(|row| row.into_record())
                .collect::<anyhow::Result<Vec<_>>>()?,
            RecordKind::Job => select
                .build_query_as::<JobRow>()
                .fetch_all(&self.pool)
                .await
                .context("list jobs")?
                .into_iter()
                .map(|row| row.into_record())
                .collect::<anyhow::Result<Vec<_>>>()?,
        };

        Ok(ListPage {
            records,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn get(&self, kind: RecordKind, id: i64) -> anyhow::Result<Option<Record>> {
        let sql = format!("SELECT {} FROM {} WHERE id = ?", columns(kind), table(kind));
        match kind {
            RecordKind::Tender => sqlx::query_as::<_, TenderRow>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .context("get tender")?
                .map(TenderRow::into_record)
                .transpose(),
            RecordKind::Job => sqlx::query_as::<_, JobRow>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .context("get job")?
                .map(JobRow::into_record)
                .transpose(),
        }
    }

    async fn stats(&self, kind: RecordKind, today: NaiveDate) -> anyhow::Result<Stats> {
        let table = table(kind);
        let (date_column, group_column) = match kind {
            RecordKind::Tender => ("published_at", "organisation_name"),
            RecordKind::Job => ("scraped_at", "company"),
        };

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .context("count records")?;

        let midnight = today.and_time(NaiveTime::MIN).and_utc();
        let today_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {table} WHERE {date_column} >= ? AND {date_column} < ?"
        ))
        .bind(encode_ts(midnight))
        .bind(encode_ts(midnight + chrono::Days::new(1)))
        .fetch_one(&self.pool)
        .await
        .context("count today's records")?;

        let top = sqlx::query_as::<_, (String, i64)>(&format!(
            "SELECT {group_column}, COUNT(*) AS n FROM {table} \
             GROUP BY {group_column} ORDER BY n DESC, {group_column} ASC LIMIT ?"
        ))
        .bind(TOP_GROUPS)
        .fetch_all(&self.pool)
        .await
        .context("group records")?
        .into_iter()
        .map(|(name, count)| GroupCount {
            name,
            count: u64::try_from(count).unwrap_or_default(),
        })
        .collect();

        Ok(Stats {
            total: u64::try_from(total).unwrap_or_default(),
            today: u64::try_from(today_count).unwrap_or_default(),
            top,
        })
    }

    async fn tenders_missing_published_at(&self) -> anyhow::Result<Vec<(i64, String)>> {
        sqlx::query_as(
            "SELECT id, published_date FROM tenders WHERE published_at IS NULL ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .context("select tenders without published_at")
    }

    async fn set_published_at(&self, id: i64, published_at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query("UPDATE tenders SET published_at = ? WHERE id = ?")
            .bind(encode_ts(published_at))
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("update published_at of tender {id}"))?;
        Ok(())
    }

    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("ping database")?;
        Ok(())
    }
}

fn table(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Tender => "tenders",
        RecordKind::Job => "jobs",
    }
}

fn columns(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Tender => TENDER_COLUMNS,
        RecordKind::Job => JOB_COLUMNS,
    }
}

/// Maps an API sort field onto a column; unknown fields use the default.
fn sort_column(kind: RecordKind, sort_by: Option<&str>) -> &'static str {
    match (kind, sort_by.unwrap_or_default()) {
        (RecordKind::Tender, "title") | (RecordKind::Job, "title") => "title",
        (RecordKind::Tender, "organisationName") => "organisation_name",
        (RecordKind::Tender, "scrapedAt") => "scraped_at",
        (RecordKind::Tender, _) => "published_at",
        (RecordKind::Job, "company") => "company",
        (RecordKind::Job, "location") => "location",
        (RecordKind::Job, "postedDate") => "posted_date",
        (RecordKind::Job, _) => "scraped_at",
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, kind: RecordKind, query: &ListQuery) {
    qb.push(" WHERE 1 = 1");

    if let Some(search) = non_blank(query.search.as_deref()) {
        let searched: &[&str] = match kind {
            RecordKind::Tender => &["title", "organisation_name"],
            RecordKind::Job => &["title", "company", "description"],
        };
        let pattern = like_pattern(search);
        qb.push(" AND (");
        for (index, column) in searched.iter().enumerate() {
            if index > 0 {
                qb.push(" OR ");
            }
            qb.push(*column)
                .push(" LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\'");
        }
        qb.push(")");
    }

    let substring_filters: &[(&str, Option<&str>)] = match kind {
        RecordKind::Tender => &[("organisation_name", query.organisation.as_deref())],
        RecordKind::Job => &[
            ("company", query.company.as_deref()),
            ("location", query.location.as_deref()),
        ],
    };
    for (column, value) in substring_filters {
        if let Some(value) = non_blank(*value) {
            qb.push(" AND ")
                .push(*column)
                .push(" LIKE ")
                .push_bind(like_pattern(value))
                .push(" ESCAPE '\\'");
        }
    }

    let date_column = match kind {
        RecordKind::Tender => "published_at",
        RecordKind::Job => "scraped_at",
    };
    if let Some(since) = query.since {
        qb.push(format!(" AND {date_column} >= "))
            .push_bind(encode_ts(since));
    }
    if let Some(until) = query.until {
        qb.push(format!(" AND {date_column} <= "))
            .push_bind(encode_ts(until));
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Case-insensitive substring pattern with LIKE wildcards escaped.
fn like_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

/// Fixed-width UTC text, so lexical order is chronological order.
fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

fn decode_ts(text: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .with_context(|| format!("parse stored timestamp {text:?}"))
}

#[derive(Debug, sqlx::FromRow)]
struct TenderRow {
    id: i64,
    serial_number: String,
    published_date: String,
    published_at: Option<String>,
    bid_submission_closing_date: String,
    tender_opening_date: String,
    title: String,
    tender_link: String,
    organisation_name: String,
    corrigendum: String,
    scraped_at: String,
}

impl TenderRow {
    fn into_record(self) -> anyhow::Result<Record> {
        Ok(Record::Tender(TenderRecord {
            id: Some(self.id),
            serial_number: self.serial_number,
            published_date: self.published_date,
            published_at: self.published_at.as_deref().map(decode_ts).transpose()?,
            bid_submission_closing_date: self.bid_submission_closing_date,
            tender_opening_date: self.tender_opening_date,
            title: self.title,
            tender_link: self.tender_link,
            organisation_name: self.organisation_name,
            corrigendum: self.corrigendum,
            scraped_at: decode_ts(&self.scraped_at)?,
        }))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: i64,
    title: String,
    company: String,
    location: String,
    salary: String,
    job_type: String,
    work_type: String,
    remote_type: String,
    posted_date: String,
    job_link: String,
    description: String,
    category: String,
    scraped_at: String,
}

impl JobRow {
    fn into_record(self) -> anyhow::Result<Record> {
        Ok(Record::Job(JobRecord {
            id: Some(self.id),
            title: self.title,
            company: self.company,
            location: self.location,
            salary: self.salary,
            job_type: self.job_type,
            work_type: self.work_type,
            remote_type: self.remote_type,
            posted_date: self.posted_date,
            job_link: self.job_link,
            description: self.description,
            category: self.category,
            scraped_at: decode_ts(&self.scraped_at)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn tender(title: &str, published: &str, organisation: &str) -> Record {
        Record::Tender(TenderRecord {
            id: None,
            serial_number: "1".to_string(),
            published_date: published.to_string(),
            published_at: crate::dates::normalize(published),
            bid_submission_closing_date: String::new(),
            tender_opening_date: String::new(),
            title: title.to_string(),
            tender_link: String::new(),
            organisation_name: organisation.to_string(),
            corrigendum: String::new(),
            scraped_at: Utc.with_ymd_and_hms(2025, 7, 20, 9, 0, 0).unwrap(),
        })
    }

    fn job(title: &str, company: &str, location: &str) -> Record {
        Record::Job(JobRecord {
            id: None,
            title: title.to_string(),
            company: company.to_string(),
            location: location.to_string(),
            salary: String::new(),
            job_type: "Permanent".to_string(),
            work_type: String::new(),
            remote_type: String::new(),
            posted_date: String::new(),
            job_link: String::new(),
            description: "Night shifts".to_string(),
            category: String::new(),
            scraped_at: Utc.with_ymd_and_hms(2025, 7, 20, 9, 0, 0).unwrap(),
        })
    }

    async fn store() -> SqliteRecordStore {
        SqliteRecordStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn dedup_keys_are_enforced_per_kind() {
        let store = store().await;
        let a = tender("Bridge", "15-Jul-2025", "PWD");
        assert_eq!(store.insert(&a).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.insert(&a).await.unwrap(), InsertOutcome::Duplicate);
        let relisted = tender("Bridge", "16-Jul-2025", "PWD");
        assert_eq!(
            store.insert(&relisted).await.unwrap(),
            InsertOutcome::Inserted
        );

        let j = job("Chef", "Bistro", "Leeds");
        assert_eq!(store.insert(&j).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.insert(&j).await.unwrap(), InsertOutcome::Duplicate);
        let elsewhere = job("Chef", "Bistro", "York");
        assert_eq!(
            store.insert(&elsewhere).await.unwrap(),
            InsertOutcome::Inserted
        );
    }

    #[tokio::test]
    async fn blank_title_is_an_error_not_a_duplicate() {
        let store = store().await;
        assert!(store.insert(&tender("  ", "1/1/2025", "X")).await.is_err());
    }

    #[tokio::test]
    async fn round_trips_records_by_id() {
        let store = store().await;
        store
            .insert(&tender("Bridge", "15-Jul-2025 05:12 PM", "PWD"))
            .await
            .unwrap();
        let Some(Record::Tender(stored)) = store.get(RecordKind::Tender, 1).await.unwrap() else {
            panic!("tender 1 missing");
        };
        assert_eq!(stored.id, Some(1));
        assert_eq!(
            stored.published_at,
            Some(Utc.with_ymd_and_hms(2025, 7, 15, 17, 12, 0).unwrap())
        );
        assert!(store.get(RecordKind::Tender, 99).await.unwrap().is_none());
        assert!(store.get(RecordKind::Job, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_sorts_and_pages() {
        let store = store().await;
        for (title, date, org) in [
            ("Road works", "01-Jul-2025", "NHAI"),
            ("Bridge 50%", "03-Jul-2025", "PWD"),
            ("Canal", "02-Jul-2025", "Irrigation Dept"),
            ("Road lights", "04-Jul-2025", "Municipal"),
        ] {
            store.insert(&tender(title, date, org)).await.unwrap();
        }

        let all = store
            .list(RecordKind::Tender, &ListQuery::default())
            .await
            .unwrap();
        assert_eq!(all.total, 4);
        let titles = all.records.iter().map(Record::title).collect::<Vec<_>>();
        assert_eq!(titles, ["Road lights", "Bridge 50%", "Canal", "Road works"]);

        let road = ListQuery {
            search: Some("road".to_string()),
            descending: false,
            ..ListQuery::default()
        };
        let page = store.list(RecordKind::Tender, &road).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.records[0].title(), "Road works");

        let literal_percent = ListQuery {
            search: Some("50%".to_string()),
            ..ListQuery::default()
        };
        assert_eq!(
            store
                .list(RecordKind::Tender, &literal_percent)
                .await
                .unwrap()
                .total,
            1
        );

        let ranged = ListQuery {
            since: Some(Utc.with_ymd_and_hms(2025, 7, 2, 0, 0, 0).unwrap()),
            until: Some(Utc.with_ymd_and_hms(2025, 7, 3, 0, 0, 0).unwrap()),
            ..ListQuery::default()
        };
        assert_eq!(store.list(RecordKind::Tender, &ranged).await.unwrap().total, 2);

        let second_page = ListQuery {
            page: 2,
            limit: 3,
            ..ListQuery::default()
        };
        let page = store.list(RecordKind::Tender, &second_page).await.unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].title(), "Road works");
    }

    #[tokio::test]
    async fn job_filters_apply_to_company_and_location() {
        let store = store().await;
        store.insert(&job("Chef", "Bistro", "Leeds")).await.unwrap();
        store.insert(&job("Porter", "Bistro", "York")).await.unwrap();
        store.insert(&job("Nurse", "NHS Trust", "Leeds")).await.unwrap();

        let query = ListQuery {
            company: Some("bistro".to_string()),
            location: Some("leeds".to_string()),
            ..ListQuery::default()
        };
        let page = store.list(RecordKind::Job, &query).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.records[0].title(), "Chef");
    }

    #[tokio::test]
    async fn stats_count_today_and_rank_groups() {
        let store = store().await;
        store.insert(&tender("A", "20-Jul-2025", "PWD")).await.unwrap();
        store.insert(&tender("B", "19-Jul-2025", "PWD")).await.unwrap();
        store.insert(&tender("C", "21-Jul-2025 10:00 AM", "NHAI")).await.unwrap();
        store.insert(&tender("D", "20-Jul-2025 11:59 PM", "PWD")).await.unwrap();

        let today = NaiveDate::from_ymd_opt(2025, 7, 20).unwrap();
        let stats = store.stats(RecordKind::Tender, today).await.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.today, 2);
        assert_eq!(
            stats.top,
            [
                GroupCount {
                    name: "PWD".to_string(),
                    count: 3
                },
                GroupCount {
                    name: "NHAI".to_string(),
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn timestamps_encode_at_fixed_width() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(encode_ts(ts), "2025-01-02T03:04:05.000000Z");
        assert_eq!(decode_ts(&encode_ts(ts)).unwrap(), ts);
    }
}
