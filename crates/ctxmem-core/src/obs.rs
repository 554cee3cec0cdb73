//! Structured lifecycle events for conversation memory.
//!
//! Every event carries an `event` field (`context.*`) and the
//! `conversation_id`, so a JSON subscriber can filter per conversation.

use tracing::{info, warn};

/// Span tagging everything inside it with the conversation id. Attach it to
/// work that runs detached from the caller, e.g. with
/// [`tracing::Instrument::instrument`].
pub fn conversation_span(conversation_id: &str) -> tracing::Span {
    tracing::info_span!("ctxmem.conversation", conversation_id = %conversation_id)
}

pub fn emit_message_added(conversation_id: &str, message_id: &str, role: &str, evicted: usize) {
    info!(
        event = "context.message_added",
        conversation_id = %conversation_id,
        message_id = %message_id,
        role = %role,
        evicted = evicted,
    );
}

/// A batch of turns was condensed into a summary.
pub fn emit_promotion(conversation_id: &str, summary_id: &str, message_count: usize) {
    info!(
        event = "context.promoted",
        conversation_id = %conversation_id,
        summary_id = %summary_id,
        message_count = message_count,
    );
}

pub fn emit_backup_written(conversation_id: &str, bytes: usize) {
    info!(event = "context.backup_written", conversation_id = %conversation_id, bytes = bytes);
}

/// Background backups are best-effort; failures only surface here.
pub fn emit_backup_failed(conversation_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "context.backup_failed", conversation_id = %conversation_id, error = %error);
}

pub fn emit_context_cleared(conversation_id: &str) {
    info!(event = "context.cleared", conversation_id = %conversation_id);
}

pub fn emit_context_restored(conversation_id: &str, messages: usize, summaries: usize) {
    info!(
        event = "context.restored",
        conversation_id = %conversation_id,
        messages = messages,
        summaries = summaries,
    );
}
