//! Search feedback and retrieval-quality metrics (spec §4.9).

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single feedback submission against one search result (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchFeedback {
    pub memory_id: Uuid,
    pub query: String,
    pub helpful: bool,
    pub submitted_at: DateTime<Utc>,
}

/// Aggregate retrieval-quality numbers surfaced by `get_quality_metrics`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct QualityMetrics {
    pub total_feedback: u64,
    pub helpful_count: u64,
    pub helpfulness_rate: f32,
}

/// Backing contract for feedback persistence.
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Persist one feedback record.
    ///
    /// # Errors
    /// Returns `Error::Storage` if the write fails.
    async fn record_feedback(&self, feedback: SearchFeedback) -> Result<()>;

    /// All feedback recorded for `memory_id`, or every record if `None`.
    ///
    /// # Errors
    /// Returns `Error::Retrieval` if the read fails.
    async fn feedback_for(&self, memory_id: Option<Uuid>) -> Result<Vec<SearchFeedback>>;
}

/// Submit one piece of feedback (`submit_search_feedback` tool, §6.1).
///
/// # Errors
/// Propagates whatever the backing store returns.
pub async fn submit_search_feedback(
    store: &dyn FeedbackStore,
    memory_id: Uuid,
    query: &str,
    helpful: bool,
) -> Result<()> {
    store
        .record_feedback(SearchFeedback {
            memory_id,
            query: query.to_string(),
            helpful,
            submitted_at: Utc::now(),
        })
        .await
}

/// Compute aggregate metrics (`get_quality_metrics` tool, §6.1).
/// `helpfulness_rate` is `0.0` when no feedback has been recorded, never
/// `NaN` from a zero-over-zero division.
///
/// # Errors
/// Propagates whatever the backing store returns.
pub async fn get_quality_metrics(
    store: &dyn FeedbackStore,
    memory_id: Option<Uuid>,
) -> Result<QualityMetrics> {
    let records = store.feedback_for(memory_id).await?;
    let total_feedback = records.len() as u64;
    let helpful_count = records.iter().filter(|r| r.helpful).count() as u64;
    let helpfulness_rate = if total_feedback == 0 {
        0.0
    } else {
        helpful_count as f32 / total_feedback as f32
    };
    Ok(QualityMetrics {
        total_feedback,
        helpful_count,
        helpfulness_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct InMemoryFeedbackStore {
        records: Mutex<Vec<SearchFeedback>>,
    }

    #[async_trait]
    impl FeedbackStore for InMemoryFeedbackStore {
        async fn record_feedback(&self, feedback: SearchFeedback) -> Result<()> {
            self.records.lock().push(feedback);
            Ok(())
        }

        async fn feedback_for(&self, memory_id: Option<Uuid>) -> Result<Vec<SearchFeedback>> {
            let records = self.records.lock();
            Ok(match memory_id {
                Some(id) => records.iter().filter(|r| r.memory_id == id).cloned().collect(),
                None => records.clone(),
            })
        }
    }

    #[tokio::test]
    async fn metrics_are_zero_with_no_feedback() {
        let store = InMemoryFeedbackStore::default();
        let metrics = get_quality_metrics(&store, None).await.unwrap();
        assert_eq!(metrics.total_feedback, 0);
        assert_eq!(metrics.helpfulness_rate, 0.0);
    }

    #[tokio::test]
    async fn helpfulness_rate_reflects_mixed_feedback() {
        let store = InMemoryFeedbackStore::default();
        let id = Uuid::new_v4();
        submit_search_feedback(&store, id, "q1", true).await.unwrap();
        submit_search_feedback(&store, id, "q2", false).await.unwrap();
        submit_search_feedback(&store, id, "q3", true).await.unwrap();
        let metrics = get_quality_metrics(&store, Some(id)).await.unwrap();
        assert_eq!(metrics.total_feedback, 3);
        assert_eq!(metrics.helpful_count, 2);
        assert!((metrics.helpfulness_rate - 2.0 / 3.0).abs() < 1e-6);
    }
}
