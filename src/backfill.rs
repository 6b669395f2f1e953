use serde::Serialize;

use crate::dates;
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub updated: usize,
    /// Tenders whose stored date text still does not parse.
    pub skipped: usize,
}

/// Fills the canonical published timestamp of stored tenders that lack one.
pub async fn run(store: &dyn RecordStore) -> anyhow::Result<BackfillReport> {
    let pending = store.tenders_missing_published_at().await?;
    tracing::info!(pending = pending.len(), "backfilling published timestamps");

    let mut report = BackfillReport::default();
    for (id, published_date) in pending {
        match dates::normalize(&published_date) {
            Some(published_at) => {
                store.set_published_at(id, published_at).await?;
                report.updated += 1;
            }
            None => {
                tracing::debug!(id, published_date, "date still unparseable");
                report.skipped += 1;
            }
        }
    }

    tracing::info!(
        updated = report.updated,
        skipped = report.skipped,
        "backfill finished"
    );
    Ok(report)
}
