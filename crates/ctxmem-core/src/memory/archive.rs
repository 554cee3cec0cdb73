//! Long-term archive of conversation summaries.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::error::{MemoryError, MemoryResult};
use super::message::Message;
use super::summarizer::Summarizer;
use super::{read_lock, write_lock};

/// Summaries scoring at or below this are not considered relevant.
pub const MIN_RELEVANCE: f64 = 0.1;

const TOPIC_WEIGHT: f64 = 0.3;
const CONTENT_WEIGHT: f64 = 0.4;
const KEY_POINT_WEIGHT: f64 = 0.2;
const RECENCY_SCALE_DAYS: f64 = 30.0;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// A condensed record of a contiguous batch of turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub key_points: Vec<String>,
    pub importance: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Aggregate figures over the archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveStats {
    pub summary_count: usize,
    pub max_summaries: usize,
    pub total_messages: usize,
    pub average_importance: f64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub span_days: f64,
}

/// Relevance of `summary` to `query` at time `now`.
///
/// Case-insensitive substring matching: each matching topic adds 0.3, a
/// content match adds 0.4, each matching key point adds 0.2. The sum is
/// scaled by `1 / (1 + age_days / 30)`. Summaries dated in the future
/// count as brand new.
pub fn relevance_score(summary: &Summary, query: &str, now: DateTime<Utc>) -> f64 {
    let query = query.to_lowercase();
    let matches = |text: &str| text.to_lowercase().contains(&query);

    let mut score = 0.0;
    for topic in &summary.topics {
        if matches(topic) {
            score += TOPIC_WEIGHT;
        }
    }
    if matches(&summary.content) {
        score += CONTENT_WEIGHT;
    }
    for point in &summary.key_points {
        if matches(point) {
            score += KEY_POINT_WEIGHT;
        }
    }

    let age_days =
        ((now - summary.created_at).num_milliseconds() as f64 / MILLIS_PER_DAY).max(0.0);
    score / (1.0 + age_days / RECENCY_SCALE_DAYS)
}

/// Capped, creation-ordered store of summaries.
pub struct LongTermArchive {
    max_summaries: usize,
    threshold: usize,
    summarizer: Arc<dyn Summarizer>,
    summaries: RwLock<Vec<Summary>>,
}

impl std::fmt::Debug for LongTermArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LongTermArchive")
            .field("max_summaries", &self.max_summaries)
            .field("threshold", &self.threshold)
            .field("summaries", &self.len())
            .finish()
    }
}

impl LongTermArchive {
    /// Archive holding at most `max_summaries`, summarizing batches of at
    /// least `threshold` turns.
    pub fn new(max_summaries: usize, threshold: usize, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            max_summaries,
            threshold,
            summarizer,
            summaries: RwLock::new(Vec::new()),
        }
    }

    /// Summarize a batch of turns and store the result.
    ///
    /// Returns `Ok(None)` without calling the summarizer when the batch is
    /// empty or shorter than the threshold. When the archive is full the
    /// oldest summaries are dropped.
    pub async fn ingest(&self, turns: &[Message]) -> MemoryResult<Option<Summary>> {
        if turns.is_empty() || turns.len() < self.threshold {
            return Ok(None);
        }

        let produced = self
            .summarizer
            .summarize(turns)
            .await
            .map_err(MemoryError::Summarization)?;

        let (start_time, end_time) = turns.iter().fold(
            (turns[0].timestamp, turns[0].timestamp),
            |(start, end), m| (start.min(m.timestamp), end.max(m.timestamp)),
        );
        let importance = if produced.importance.is_finite() {
            produced.importance.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let summary = Summary {
            id: format!("summary_{}", Uuid::new_v4().simple()),
            content: produced.content,
            topics: produced.topics,
            key_points: produced.key_points,
            importance,
            start_time,
            end_time,
            message_count: turns.len(),
            created_at: Utc::now(),
        };

        let mut summaries = write_lock(&self.summaries);
        summaries.push(summary.clone());
        let dropped = Self::enforce_cap(&mut summaries, self.max_summaries);
        if dropped > 0 {
            debug!(dropped, "archive full, dropped oldest summaries");
        }
        Ok(Some(summary))
    }

    /// Summaries scoring above [`MIN_RELEVANCE`], in archive order, keeping
    /// the last `limit` of them.
    pub fn relevant_summaries(&self, query: &str, limit: usize) -> Vec<Summary> {
        let now = Utc::now();
        let summaries = read_lock(&self.summaries);
        let relevant: Vec<&Summary> = summaries
            .iter()
            .filter(|s| relevance_score(s, query, now) > MIN_RELEVANCE)
            .collect();
        let skip = relevant.len().saturating_sub(limit);
        relevant.into_iter().skip(skip).cloned().collect()
    }

    /// Every summary, oldest first.
    pub fn all_summaries(&self) -> Vec<Summary> {
        read_lock(&self.summaries).clone()
    }

    /// Replace the contents wholesale, keeping the newest if over capacity.
    pub fn replace_all(&self, summaries: Vec<Summary>) {
        let mut current = write_lock(&self.summaries);
        *current = summaries;
        Self::enforce_cap(&mut current, self.max_summaries);
    }

    /// Drop every summary.
    pub fn clear(&self) {
        write_lock(&self.summaries).clear();
    }

    /// Number of stored summaries.
    pub fn len(&self) -> usize {
        read_lock(&self.summaries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Minimum batch size accepted by [`ingest`](Self::ingest).
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Capacity; older summaries are dropped beyond it.
    pub fn max_summaries(&self) -> usize {
        self.max_summaries
    }

    /// Counts, mean importance and time span over the stored summaries.
    pub fn memory_stats(&self) -> ArchiveStats {
        let summaries = read_lock(&self.summaries);
        let count = summaries.len();
        let total_messages = summaries.iter().map(|s| s.message_count).sum();
        let average_importance = if count == 0 {
            0.0
        } else {
            summaries.iter().map(|s| s.importance).sum::<f64>() / count as f64
        };
        let oldest = summaries.iter().map(|s| s.created_at).min();
        let newest = summaries.iter().map(|s| s.created_at).max();
        let span_days = match (oldest, newest) {
            (Some(oldest), Some(newest)) => {
                (newest - oldest).num_milliseconds() as f64 / MILLIS_PER_DAY
            }
            _ => 0.0,
        };

        ArchiveStats {
            summary_count: count,
            max_summaries: self.max_summaries,
            total_messages,
            average_importance,
            oldest,
            newest,
            span_days,
        }
    }

    fn enforce_cap(summaries: &mut Vec<Summary>, max: usize) -> usize {
        let excess = summaries.len().saturating_sub(max);
        summaries.drain(..excess);
        excess
    }
}
