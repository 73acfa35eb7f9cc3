use rusqlite::{Connection, Result};

/// Initialise chat-history and chronicle tables. Safe to call on every
/// startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_messages_table(conn)?;
    create_messages_fts(conn)?;
    create_llm_calls_table(conn)?;
    create_chronicle_tables(conn)?;
    Ok(())
}

fn create_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            arc                 TEXT NOT NULL,
            thread_id           TEXT,
            thread_starter_id   TEXT,
            role                TEXT NOT NULL,
            nick                TEXT NOT NULL,
            content             TEXT NOT NULL,
            platform_id         TEXT,
            mode                TEXT,
            chronicled          INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_arc
            ON messages(arc, created_at);
        CREATE INDEX IF NOT EXISTS idx_messages_arc_thread
            ON messages(arc, thread_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_messages_platform_id
            ON messages(arc, platform_id);",
    )
}

/// FTS5 index over message content, used by chronicle summarisation and the
/// `oracle` tool's context lookups. content='' means it is an external-content
/// table — synced manually alongside writes to `messages`.
fn create_messages_fts(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts
            USING fts5(content, content='messages', content_rowid='id');",
    )
}

fn create_llm_calls_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS llm_calls (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            arc         TEXT NOT NULL,
            model       TEXT NOT NULL,
            tokens_in   INTEGER NOT NULL DEFAULT 0,
            tokens_out  INTEGER NOT NULL DEFAULT 0,
            cache_read  INTEGER NOT NULL DEFAULT 0,
            cache_write INTEGER NOT NULL DEFAULT 0,
            cost_usd    REAL NOT NULL DEFAULT 0,
            response    TEXT,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_llm_calls_arc
            ON llm_calls(arc, created_at);",
    )
}

fn create_chronicle_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chapters (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            arc             TEXT NOT NULL,
            chapter_number  INTEGER NOT NULL,
            opened_at       TEXT NOT NULL,
            closed_at       TEXT,
            UNIQUE(arc, chapter_number)
        );
        CREATE INDEX IF NOT EXISTS idx_chapters_arc
            ON chapters(arc, chapter_number DESC);

        CREATE TABLE IF NOT EXISTS paragraphs (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            chapter_id  INTEGER NOT NULL REFERENCES chapters(id),
            text        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_paragraphs_chapter
            ON paragraphs(chapter_id, created_at);",
    )
}
