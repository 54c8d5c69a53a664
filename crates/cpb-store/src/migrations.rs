use rusqlite::Connection;
use tracing::info;

use cpb_core::Result;

use crate::db;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS drafts (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            author_id     INTEGER NOT NULL DEFAULT 0,
            content_type  TEXT NOT NULL DEFAULT 'text',
            text          TEXT,
            media         TEXT,
            album_json    TEXT NOT NULL DEFAULT '[]',
            buttons_json  TEXT NOT NULL DEFAULT '[]',
            source_url    TEXT,
            media_url     TEXT,
            dedup_hash    TEXT,
            status        TEXT NOT NULL DEFAULT 'draft',
            created_at    TEXT NOT NULL,
            published_at  TEXT
        );

        -- Dedup across every draft that carries a fingerprint, published
        -- and deleted ones included.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_drafts_hash
            ON drafts(dedup_hash) WHERE dedup_hash IS NOT NULL;

        CREATE INDEX IF NOT EXISTS idx_drafts_status
            ON drafts(status, id);

        CREATE TABLE IF NOT EXISTS schedules (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            draft_id  INTEGER NOT NULL REFERENCES drafts(id),
            run_at    TEXT NOT NULL,
            status    TEXT NOT NULL DEFAULT 'pending'
        );

        CREATE INDEX IF NOT EXISTS idx_schedules_due
            ON schedules(status, run_at, id);

        CREATE TABLE IF NOT EXISTS feeds (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            url            TEXT NOT NULL UNIQUE,
            title          TEXT,
            active         INTEGER NOT NULL DEFAULT 1,
            etag           TEXT,
            last_modified  TEXT
        );

        CREATE TABLE IF NOT EXISTS settings (
            key    TEXT PRIMARY KEY,
            value  TEXT NOT NULL
        );
        ",
    )
    .map_err(db)?;

    info!("database migrations complete");
    Ok(())
}
