use std::sync::Arc;

use crate::model::{Record, ScrapeResult};
use crate::store::{InsertOutcome, RecordStore};

/// Persists normalised records one at a time, classifying each outcome.
#[derive(Clone)]
pub struct Sink {
    store: Arc<dyn RecordStore>,
}

impl Sink {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Inserts every record in order. A failing record never stops the batch;
    /// the counts always add up to `records.len()`.
    pub async fn commit(&self, records: &[Record]) -> ScrapeResult {
        let mut saved = 0;
        let mut duplicates = 0;
        let mut errors = 0;

        for record in records {
            match self.store.insert(record).await {
                Ok(InsertOutcome::Inserted) => saved += 1,
                Ok(InsertOutcome::Duplicate) => {
                    duplicates += 1;
                    tracing::debug!(title = record.title(), "duplicate record skipped");
                }
                Err(err) => {
                    errors += 1;
                    tracing::error!(
                        title = record.title(),
                        error = %format!("{err:#}"),
                        "failed to save record"
                    );
                }
            }
        }

        let result = ScrapeResult::new(saved, duplicates, errors);
        tracing::info!(
            kind = records.first().map(|record| record.kind().as_str()),
            saved,
            duplicates,
            errors,
            "records committed"
        );
        result
    }
}
