//! Summarization capability used by the long-term archive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::message::Message;

/// What a summarizer produces for a batch of turns.
///
/// The archive turns this into a [`Summary`](super::archive::Summary),
/// assigning id, time range and message count itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub content: String,
    pub topics: Vec<String>,
    pub key_points: Vec<String>,
    /// Expected in `[0, 1]`; clamped by the archive.
    pub importance: f64,
}

/// Condenses a batch of turns into a [`ConversationSummary`].
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, turns: &[Message]) -> anyhow::Result<ConversationSummary>;
}

const SUMMARY_PREFIX: &str = "Conversation summary: ";
const SUMMARY_CHARS: usize = 200;
const KEY_POINT_CHARS: usize = 120;
const MAX_TOPICS: usize = 3;
const MAX_KEY_POINTS: usize = 3;
const MIN_TOPIC_LEN: usize = 4;
const DEFAULT_IMPORTANCE: f64 = 0.5;

const STOPWORDS: &[&str] = &[
    "about", "after", "again", "also", "because", "been", "before", "being", "could", "does",
    "doing", "from", "have", "having", "here", "into", "just", "like", "more", "most", "only",
    "other", "over", "really", "same", "should", "some", "such", "than", "that", "their", "them",
    "then", "there", "these", "they", "this", "those", "very", "want", "were", "what", "when",
    "where", "which", "while", "will", "with", "would", "your",
];

/// Offline summarizer: a prefix of the transcript, the most frequent
/// content words as topics, and each opening sentence as a key point.
#[derive(Debug, Clone, Default)]
pub struct ExtractiveSummarizer;

impl ExtractiveSummarizer {
    pub fn new() -> Self {
        Self
    }

    fn transcript(turns: &[Message]) -> String {
        turns
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn topics(turns: &[Message]) -> Vec<String> {
        // word -> (count, first position)
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        let words = turns
            .iter()
            .flat_map(|m| m.content.split(|c: char| !c.is_alphanumeric()))
            .map(str::to_lowercase)
            .filter(|w| w.chars().count() >= MIN_TOPIC_LEN && !STOPWORDS.contains(&w.as_str()));
        for (pos, word) in words.enumerate() {
            counts.entry(word).or_insert((0, pos)).0 += 1;
        }

        let mut ranked: Vec<_> = counts.into_iter().collect();
        ranked.sort_by(|(_, (ca, pa)), (_, (cb, pb))| cb.cmp(ca).then(pa.cmp(pb)));
        let topics: Vec<String> = ranked
            .into_iter()
            .take(MAX_TOPICS)
            .map(|(word, _)| word)
            .collect();

        if topics.is_empty() {
            vec!["general".to_string()]
        } else {
            topics
        }
    }

    fn key_points(turns: &[Message]) -> Vec<String> {
        turns
            .iter()
            .filter_map(|m| {
                let sentence = m
                    .content
                    .split(['.', '!', '?', '\n'])
                    .map(str::trim)
                    .find(|s| !s.is_empty())?;
                Some(sentence.chars().take(KEY_POINT_CHARS).collect())
            })
            .take(MAX_KEY_POINTS)
            .collect()
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(&self, turns: &[Message]) -> anyhow::Result<ConversationSummary> {
        anyhow::ensure!(!turns.is_empty(), "cannot summarize an empty batch");

        let excerpt: String = Self::transcript(turns).chars().take(SUMMARY_CHARS).collect();
        Ok(ConversationSummary {
            content: format!("{SUMMARY_PREFIX}{excerpt}"),
            topics: Self::topics(turns),
            key_points: Self::key_points(turns),
            importance: DEFAULT_IMPORTANCE,
        })
    }
}

/// Returns the same summary for every batch and counts invocations.
#[derive(Debug)]
pub struct StaticSummarizer {
    summary: ConversationSummary,
    calls: AtomicUsize,
}

impl StaticSummarizer {
    pub fn new(summary: ConversationSummary) -> Self {
        Self {
            summary,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Summarizer for StaticSummarizer {
    async fn summarize(&self, _turns: &[Message]) -> anyhow::Result<ConversationSummary> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.summary.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::message::Role;

    #[tokio::test]
    async fn extractive_summary_has_prefix_and_excerpt() {
        let turns = vec![
            Message::new(Role::user(), "How do I rotate database credentials?"),
            Message::new(Role::assistant(), "Rotate database credentials with the vault CLI."),
        ];
        let summary = ExtractiveSummarizer::new().summarize(&turns).await.unwrap();

        assert!(summary
            .content
            .starts_with("Conversation summary: user: How do I rotate"));
        assert_eq!(summary.importance, 0.5);
        assert_eq!(summary.topics[0], "rotate");
        assert!(summary.topics.contains(&"database".to_string()));
        assert_eq!(
            summary.key_points,
            vec![
                "How do I rotate database credentials",
                "Rotate database credentials with the vault CLI"
            ]
        );
    }

    #[tokio::test]
    async fn extractive_excerpt_is_bounded() {
        let turns = vec![Message::new(Role::user(), "é".repeat(500))];
        let summary = ExtractiveSummarizer::new().summarize(&turns).await.unwrap();
        let excerpt = summary.content.strip_prefix(SUMMARY_PREFIX).unwrap();
        assert_eq!(excerpt.chars().count(), SUMMARY_CHARS);
    }

    #[tokio::test]
    async fn extractive_falls_back_to_general_topic() {
        let turns = vec![Message::new(Role::user(), "ok so it is")];
        let summary = ExtractiveSummarizer::new().summarize(&turns).await.unwrap();
        assert_eq!(summary.topics, vec!["general"]);
    }

    #[tokio::test]
    async fn extractive_rejects_empty_batch() {
        assert!(ExtractiveSummarizer::new().summarize(&[]).await.is_err());
    }

    #[tokio::test]
    async fn static_summarizer_counts_calls() {
        let fixed = ConversationSummary {
            content: "fixed".into(),
            topics: vec!["testing".into()],
            key_points: vec![],
            importance: 0.9,
        };
        let summarizer = StaticSummarizer::new(fixed.clone());
        let turns = vec![Message::new("user", "hi")];
        assert_eq!(summarizer.summarize(&turns).await.unwrap(), fixed);
        summarizer.summarize(&turns).await.unwrap();
        assert_eq!(summarizer.calls(), 2);
    }
}
