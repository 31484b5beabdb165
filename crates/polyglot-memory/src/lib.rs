//! # polyglot-memory
//!
//! Translation memory for Polyglot: the file-backed entry store, approximate
//! matching, online learning from usage logs, and correction feedback.

pub mod correction;
pub mod learning;
pub mod matcher;
pub mod similarity;
pub mod store;
pub mod usage_log;

pub use correction::CorrectionOutcome;
pub use learning::{LearnReport, Learner};
pub use matcher::MemoryHit;
pub use store::{Registration, Store};
pub use usage_log::UsageLog;

use polyglot_core::error::PolyglotError;
use tracing::{debug, info};

/// One learning cycle: take queued usage records, learn, then consume them.
///
/// Records stay queued when the store cannot be saved.
pub async fn learn_from_log(
    store: &Store,
    log: &UsageLog,
    learner: &Learner,
) -> Result<LearnReport, PolyglotError> {
    let Some(batch) = log.take_batch().await? else {
        debug!("learn: usage log empty");
        return Ok(LearnReport::default());
    };
    let report = store.learn(learner, &batch.records).await?;
    log.commit(batch).await?;
    info!(
        "learn: {} records, {} observations, {} new entries, {} reinforced",
        report.records,
        report.observations,
        report.created.len(),
        report.reinforced
    );
    Ok(report)
}
