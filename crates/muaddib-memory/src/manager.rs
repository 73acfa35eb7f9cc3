use std::sync::Mutex;

use tracing::debug;

use crate::error::MemoryError;
use crate::types::*;

/// Chat history and chronicle store for the agent core.
///
/// Wraps a single SQLite connection in a `Mutex`; all writes are serialised
/// by the store itself, readers tolerate concurrent writers, and
/// `mark_chronicled` is idempotent, matching the concurrency contract the
/// agent core assumes of its storage backends.
pub struct MemoryManager {
    db: Mutex<rusqlite::Connection>,
}

impl MemoryManager {
    pub fn new(conn: rusqlite::Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    // -- chat history ----------------------------------------------------

    /// Persist one message and return its row id.
    #[allow(clippy::too_many_arguments)]
    pub fn add_message(
        &self,
        arc: &str,
        thread_id: Option<&str>,
        thread_starter_id: Option<&str>,
        role: &str,
        nick: &str,
        content: &str,
        platform_id: Option<&str>,
        mode: Option<&str>,
    ) -> Result<i64, MemoryError> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO messages
             (arc, thread_id, thread_starter_id, role, nick, content, platform_id, mode, chronicled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)",
            rusqlite::params![arc, thread_id, thread_starter_id, role, nick, content, platform_id, mode, now],
        )?;
        let id = db.last_insert_rowid();
        db.execute(
            "INSERT INTO messages_fts(rowid, content) VALUES (?1, ?2)",
            rusqlite::params![id, content],
        )?;
        Ok(id)
    }

    /// Last `limit` messages for an arc (or a specific thread within it),
    /// oldest first, ready for direct injection as model context.
    pub fn get_context(
        &self,
        arc: &str,
        limit: usize,
        thread_id: Option<&str>,
        thread_starter_id: Option<&str>,
    ) -> Result<Vec<StoredMessage>, MemoryError> {
        let db = self.db.lock().unwrap();
        let rows = match (thread_id, thread_starter_id) {
            (Some(tid), _) => {
                let mut stmt = db.prepare(
                    "SELECT id, arc, thread_id, thread_starter_id, role, nick, content,
                            platform_id, mode, chronicled, created_at
                     FROM messages WHERE arc = ?1 AND thread_id = ?2
                     ORDER BY created_at DESC LIMIT ?3",
                )?;
                stmt.query_map(rusqlite::params![arc, tid, limit as i64], row_to_message)?
                    .filter_map(|r| r.ok())
                    .collect::<Vec<_>>()
            }
            (None, Some(starter)) => {
                let mut stmt = db.prepare(
                    "SELECT id, arc, thread_id, thread_starter_id, role, nick, content,
                            platform_id, mode, chronicled, created_at
                     FROM messages WHERE arc = ?1 AND thread_starter_id = ?2 AND thread_id IS NULL
                     ORDER BY created_at DESC LIMIT ?3",
                )?;
                stmt.query_map(rusqlite::params![arc, starter, limit as i64], row_to_message)?
                    .filter_map(|r| r.ok())
                    .collect::<Vec<_>>()
            }
            (None, None) => {
                let mut stmt = db.prepare(
                    "SELECT id, arc, thread_id, thread_starter_id, role, nick, content,
                            platform_id, mode, chronicled, created_at
                     FROM messages WHERE arc = ?1 AND thread_id IS NULL
                     ORDER BY created_at DESC LIMIT ?2",
                )?;
                stmt.query_map(rusqlite::params![arc, limit as i64], row_to_message)?
                    .filter_map(|r| r.ok())
                    .collect::<Vec<_>>()
            }
        };
        let mut msgs = rows;
        msgs.reverse();
        Ok(msgs)
    }

    /// The full, unwindowed history for an arc. Used by offline tooling and
    /// chronicle backfill, not by the live request path.
    pub fn get_full_history(&self, arc: &str) -> Result<Vec<StoredMessage>, MemoryError> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, arc, thread_id, thread_starter_id, role, nick, content,
                    platform_id, mode, chronicled, created_at
             FROM messages WHERE arc = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(rusqlite::params![arc], row_to_message)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn get_recent_messages_since(
        &self,
        arc: &str,
        since: &str,
    ) -> Result<Vec<StoredMessage>, MemoryError> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, arc, thread_id, thread_starter_id, role, nick, content,
                    platform_id, mode, chronicled, created_at
             FROM messages WHERE arc = ?1 AND created_at > ?2 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(rusqlite::params![arc, since], row_to_message)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Mark a set of message ids as folded into a chronicle paragraph.
    /// Idempotent — re-marking an already-chronicled message is a no-op.
    pub fn mark_chronicled(&self, ids: &[i64]) -> Result<(), MemoryError> {
        let db = self.db.lock().unwrap();
        for id in ids {
            db.execute("UPDATE messages SET chronicled = 1 WHERE id = ?1", [id])?;
        }
        Ok(())
    }

    pub fn count_recent_unchronicled(&self, arc: &str) -> Result<usize, MemoryError> {
        let db = self.db.lock().unwrap();
        let n: i64 = db.query_row(
            "SELECT COUNT(*) FROM messages WHERE arc = ?1 AND chronicled = 0",
            rusqlite::params![arc],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    pub fn count_messages_since(&self, arc: &str, since: &str) -> Result<usize, MemoryError> {
        let db = self.db.lock().unwrap();
        let n: i64 = db.query_row(
            "SELECT COUNT(*) FROM messages WHERE arc = ?1 AND created_at > ?2",
            rusqlite::params![arc, since],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    pub fn update_message_by_platform_id(
        &self,
        arc: &str,
        platform_id: &str,
        new_content: &str,
    ) -> Result<(), MemoryError> {
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "UPDATE messages SET content = ?1 WHERE arc = ?2 AND platform_id = ?3",
            rusqlite::params![new_content, arc, platform_id],
        )?;
        if rows == 0 {
            return Err(MemoryError::MessageNotFound {
                arc: arc.to_string(),
                platform_id: platform_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn get_message_id_by_platform_id(
        &self,
        arc: &str,
        platform_id: &str,
    ) -> Result<Option<i64>, MemoryError> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT id FROM messages WHERE arc = ?1 AND platform_id = ?2",
            rusqlite::params![arc, platform_id],
            |row| row.get(0),
        ) {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(MemoryError::Database(e)),
        }
    }

    // -- cost tracking -----------------------------------------------------

    /// Record a provider call before the response text is known (call id is
    /// returned so the caller can fill it in with `update_llm_call_response`
    /// once the stream settles).
    pub fn log_llm_call(&self, arc: &str, model: &str, usage: &UsageRecord) -> Result<i64, MemoryError> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO llm_calls (arc, model, tokens_in, tokens_out, cache_read, cache_write, cost_usd, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                arc, model, usage.tokens_in, usage.tokens_out, usage.cache_read,
                usage.cache_write, usage.cost_usd, now,
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    pub fn update_llm_call_response(&self, call_id: i64, response: &str) -> Result<(), MemoryError> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE llm_calls SET response = ?1 WHERE id = ?2",
            rusqlite::params![response, call_id],
        )?;
        Ok(())
    }

    /// Sum of `cost_usd` for an arc since the start of the current UTC day.
    pub fn get_arc_cost_today(&self, arc: &str) -> Result<f64, MemoryError> {
        let start_of_day = chrono::Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .to_rfc3339();
        let db = self.db.lock().unwrap();
        let cost: f64 = db.query_row(
            "SELECT COALESCE(SUM(cost_usd), 0.0) FROM llm_calls WHERE arc = ?1 AND created_at >= ?2",
            rusqlite::params![arc, start_of_day],
            |row| row.get(0),
        )?;
        Ok(cost)
    }

    // -- chronicle -----------------------------------------------------

    /// Return the currently open chapter for an arc, opening chapter 1 if
    /// none exists yet.
    pub fn get_or_open_current_chapter(&self, arc: &str) -> Result<Chapter, MemoryError> {
        let db = self.db.lock().unwrap();
        let existing: Option<Chapter> = db
            .query_row(
                "SELECT id, arc, chapter_number, opened_at, closed_at
                 FROM chapters WHERE arc = ?1 AND closed_at IS NULL
                 ORDER BY chapter_number DESC LIMIT 1",
                rusqlite::params![arc],
                row_to_chapter,
            )
            .ok();
        if let Some(chapter) = existing {
            return Ok(chapter);
        }

        let next_number: i64 = db
            .query_row(
                "SELECT COALESCE(MAX(chapter_number), 0) + 1 FROM chapters WHERE arc = ?1",
                rusqlite::params![arc],
                |row| row.get(0),
            )
            .unwrap_or(1);
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO chapters (arc, chapter_number, opened_at, closed_at) VALUES (?1, ?2, ?3, NULL)",
            rusqlite::params![arc, next_number, now],
        )?;
        let id = db.last_insert_rowid();
        Ok(Chapter {
            id,
            arc: arc.to_string(),
            chapter_number: next_number,
            opened_at: now,
            closed_at: None,
        })
    }

    /// Append a paragraph to the arc's current chapter, rolling over to a
    /// fresh chapter first if the current one is full.
    pub fn append_paragraph(&self, arc: &str, text: &str) -> Result<i64, MemoryError> {
        let chapter = self.get_or_open_current_chapter(arc)?;
        let chapter = {
            let db = self.db.lock().unwrap();
            let paragraph_count: i64 = db.query_row(
                "SELECT COUNT(*) FROM paragraphs WHERE chapter_id = ?1",
                rusqlite::params![chapter.id],
                |row| row.get(0),
            )?;
            if paragraph_count >= PARAGRAPHS_PER_CHAPTER {
                let now = chrono::Utc::now().to_rfc3339();
                db.execute(
                    "UPDATE chapters SET closed_at = ?1 WHERE id = ?2",
                    rusqlite::params![now, chapter.id],
                )?;
                debug!(arc, chapter = chapter.chapter_number, "chapter rolled over");
                drop(db);
                self.get_or_open_current_chapter(arc)?
            } else {
                chapter
            }
        };

        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO paragraphs (chapter_id, text, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![chapter.id, text, now],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// Render a chapter's paragraphs joined by blank lines.
    pub fn render_chapter(&self, chapter_id: i64) -> Result<String, MemoryError> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT text FROM paragraphs WHERE chapter_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(rusqlite::params![chapter_id], |row| row.get::<_, String>(0))?;
        let paragraphs: Vec<String> = rows.filter_map(|r| r.ok()).collect();
        Ok(paragraphs.join("\n\n"))
    }

    /// Render a chapter relative to the current one: `0` is the open
    /// chapter, `1` the previous one, and so on.
    pub fn render_chapter_relative(&self, arc: &str, relative: i64) -> Result<String, MemoryError> {
        let db = self.db.lock().unwrap();
        let chapter_id: i64 = db
            .query_row(
                "SELECT id FROM chapters WHERE arc = ?1 ORDER BY chapter_number DESC LIMIT 1 OFFSET ?2",
                rusqlite::params![arc, relative],
                |row| row.get(0),
            )
            .map_err(|_| MemoryError::ChapterNotFound {
                arc: arc.to_string(),
                relative,
            })?;
        drop(db);
        self.render_chapter(chapter_id)
    }

    /// Paragraphs of the arc's current chapter, each wrapped as a standalone
    /// context message for injection ahead of recent history.
    pub fn get_chapter_context_messages(&self, arc: &str) -> Result<Vec<String>, MemoryError> {
        let chapter = self.get_or_open_current_chapter(arc)?;
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT text FROM paragraphs WHERE chapter_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(rusqlite::params![chapter.id], |row| row.get::<_, String>(0))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    Ok(StoredMessage {
        id: row.get(0)?,
        arc: row.get(1)?,
        thread_id: row.get(2)?,
        thread_starter_id: row.get(3)?,
        role: row.get(4)?,
        nick: row.get(5)?,
        content: row.get(6)?,
        platform_id: row.get(7)?,
        mode: row.get(8)?,
        chronicled: row.get::<_, i64>(9)? != 0,
        created_at: row.get(10)?,
    })
}

fn row_to_chapter(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chapter> {
    Ok(Chapter {
        id: row.get(0)?,
        arc: row.get(1)?,
        chapter_number: row.get(2)?,
        opened_at: row.get(3)?,
        closed_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> MemoryManager {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        MemoryManager::new(conn)
    }

    #[test]
    fn context_window_is_oldest_first_and_excludes_threads() {
        let mgr = manager();
        for i in 0..5 {
            mgr.add_message("irc#test", None, None, "user", "alice", &format!("msg{i}"), None, None)
                .unwrap();
        }
        let ctx = mgr.get_context("irc#test", 3, None, None).unwrap();
        assert_eq!(ctx.len(), 3);
        assert_eq!(ctx[0].content, "msg2");
        assert_eq!(ctx[2].content, "msg4");
    }

    #[test]
    fn chapter_rollover_after_budget() {
        let mgr = manager();
        for i in 0..PARAGRAPHS_PER_CHAPTER {
            mgr.append_paragraph("irc#test", &format!("p{i}")).unwrap();
        }
        let first = mgr.get_or_open_current_chapter("irc#test").unwrap();
        assert_eq!(first.chapter_number, 1);
        mgr.append_paragraph("irc#test", "overflow").unwrap();
        let second = mgr.get_or_open_current_chapter("irc#test").unwrap();
        assert_eq!(second.chapter_number, 2);
    }

    #[test]
    fn arc_cost_accumulates() {
        let mgr = manager();
        mgr.log_llm_call("irc#test", "anthropic:claude", &UsageRecord {
            tokens_in: 100, tokens_out: 50, cache_read: 0, cache_write: 0, cost_usd: 0.01,
        }).unwrap();
        mgr.log_llm_call("irc#test", "anthropic:claude", &UsageRecord {
            tokens_in: 10, tokens_out: 5, cache_read: 0, cache_write: 0, cost_usd: 0.002,
        }).unwrap();
        let total = mgr.get_arc_cost_today("irc#test").unwrap();
        assert!((total - 0.012).abs() < 1e-9);
    }

    #[test]
    fn mark_chronicled_is_idempotent() {
        let mgr = manager();
        let id = mgr.add_message("irc#test", None, None, "user", "alice", "hi", None, None).unwrap();
        mgr.mark_chronicled(&[id]).unwrap();
        mgr.mark_chronicled(&[id]).unwrap();
        assert_eq!(mgr.count_recent_unchronicled("irc#test").unwrap(), 0);
    }
}
