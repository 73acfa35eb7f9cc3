use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("message not found: arc={arc} platform_id={platform_id}")]
    MessageNotFound { arc: String, platform_id: String },

    #[error("chapter not found: arc={arc} relative={relative}")]
    ChapterNotFound { arc: String, relative: i64 },
}

impl MemoryError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "memory.database",
            Self::MessageNotFound { .. } => "memory.message_not_found",
            Self::ChapterNotFound { .. } => "memory.chapter_not_found",
        }
    }
}
