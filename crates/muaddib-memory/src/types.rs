use serde::{Deserialize, Serialize};

/// One persisted room message, stored per-arc with optional cost data.
///
/// Mirrors the `RoomMessage` the transports hand to the agent core, plus the
/// bookkeeping fields the chat-history store needs: which arc/thread it
/// belongs to, whether it has been folded into a chronicle chapter yet, and
/// (for assistant replies) which mode produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub arc: String,
    pub thread_id: Option<String>,
    pub thread_starter_id: Option<String>,
    pub role: String,
    pub nick: String,
    pub content: String,
    pub platform_id: Option<String>,
    /// Mode/trigger that produced this message, set for `role = "assistant"`.
    pub mode: Option<String>,
    pub chronicled: bool,
    pub created_at: String,
}

/// A single provider call's usage/cost record, independent of the message it
/// produced (a turn may call the model several times before settling).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCallRecord {
    pub id: i64,
    pub arc: String,
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cache_read: u64,
    pub cache_write: u64,
    pub cost_usd: f64,
    pub response: Option<String>,
    pub created_at: String,
}

/// One chronicle chapter for an arc. Chapters are numbered sequentially
/// within an arc; at most one is open (not yet rolled over) at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: i64,
    pub arc: String,
    pub chapter_number: i64,
    pub opened_at: String,
    pub closed_at: Option<String>,
}

/// A single paragraph appended to a chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paragraph {
    pub id: i64,
    pub chapter_id: i64,
    pub text: String,
    pub created_at: String,
}

/// Usage counters to log against an arc, as produced by the session runner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageRecord {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cache_read: u64,
    pub cache_write: u64,
    pub cost_usd: f64,
}

/// Maximum paragraphs a chapter may hold before `append_paragraph` rolls over
/// to a fresh chapter. The chronicler's full lifecycle (summarisation model,
/// configurable rollover policy) is a deferred feature gate; this is the
/// minimal rollover rule needed for `chronicle_append` to behave sensibly
/// without it.
pub const PARAGRAPHS_PER_CHAPTER: i64 = 40;
