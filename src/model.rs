use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Field values pulled from one listing row, before normalisation.
///
/// Lives for a single scrape run only. `page` and `row` are provenance used in
/// logs and fallbacks; they never reach the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub page: u32,
    pub row: usize,
    fields: BTreeMap<&'static str, String>,
}

impl RawRecord {
    pub fn new(page: u32, row: usize) -> Self {
        Self {
            page,
            row,
            fields: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, name: &'static str, value: impl Into<String>) {
        self.fields.insert(name, value.into());
    }

    /// Missing fields read as the empty string.
    pub fn get(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn take(&mut self, name: &str) -> String {
        self.fields.remove(name).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Tender,
    Job,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tender => "tender",
            Self::Job => "job",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenderRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub serial_number: String,
    pub published_date: String,
    pub published_at: Option<DateTime<Utc>>,
    pub bid_submission_closing_date: String,
    pub tender_opening_date: String,
    pub title: String,
    pub tender_link: String,
    pub organisation_name: String,
    #[serde(default)]
    pub corrigendum: String,
    pub scraped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary: String,
    /// Permanent, Contract, Temporary or Apprenticeship, as printed.
    pub job_type: String,
    /// Full time or Part time.
    pub work_type: String,
    /// On-site only, Hybrid remote or Fully remote.
    pub remote_type: String,
    pub posted_date: String,
    pub job_link: String,
    pub description: String,
    pub category: String,
    pub scraped_at: DateTime<Utc>,
}

/// A normalised record ready for the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    Tender(TenderRecord),
    Job(JobRecord),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Tender(_) => RecordKind::Tender,
            Self::Job(_) => RecordKind::Job,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Tender(tender) => &tender.title,
            Self::Job(job) => &job.title,
        }
    }
}

/// Outcome counters of one scrape run.
///
/// Built once by the sink; there is no way to change the counts afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeResult {
    saved: usize,
    duplicates: usize,
    errors: usize,
}

impl ScrapeResult {
    pub fn new(saved: usize, duplicates: usize, errors: usize) -> Self {
        Self {
            saved,
            duplicates,
            errors,
        }
    }

    pub fn saved(&self) -> usize {
        self.saved
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn errors(&self) -> usize {
        self.errors
    }

    pub fn total(&self) -> usize {
        self.saved + self.duplicates + self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_record_reads_missing_fields_as_empty() {
        let mut raw = RawRecord::new(2, 4);
        raw.set("title", "Bridge repair");
        assert_eq!(raw.get("title"), "Bridge repair");
        assert_eq!(raw.get("salary"), "");
        assert_eq!(raw.take("title"), "Bridge repair");
        assert_eq!(raw.take("title"), "");
    }

    #[test]
    fn tender_serializes_with_camel_case_keys() {
        let tender = TenderRecord {
            id: None,
            serial_number: "1".to_string(),
            published_date: "15-Jul-2025 05:12 PM".to_string(),
            published_at: None,
            bid_submission_closing_date: String::new(),
            tender_opening_date: String::new(),
            title: "Supply of cement".to_string(),
            tender_link: String::new(),
            organisation_name: "CPWD".to_string(),
            corrigendum: String::new(),
            scraped_at: DateTime::<Utc>::UNIX_EPOCH,
        };
        let value = serde_json::to_value(Record::Tender(tender)).unwrap();
        assert_eq!(value["serialNumber"], "1");
        assert_eq!(value["organisationName"], "CPWD");
        assert!(value.get("id").is_none());
        assert!(value["publishedAt"].is_null());
    }
}
