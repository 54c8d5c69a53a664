use chrono::NaiveDateTime;
use rusqlite::{params, OptionalExtension, Row};

use cpb_core::domain::{DraftId, FeedId, SlotId};
use cpb_core::messaging::types::{AlbumItem, LinkButton, MediaRef};
use cpb_core::store::{
    ContentType, Draft, DraftStatus, Feed, NewDraft, ScheduleSlot, SlotStatus, Store,
};
use cpb_core::{Error, Result};

use crate::{db, Database};

const DT_FMT: &str = "%Y-%m-%d %H:%M:%S";

const DRAFT_COLS: &str = "id, author_id, content_type, text, media, album_json, buttons_json, \
     source_url, media_url, dedup_hash, status, created_at, published_at";

fn fmt_dt(dt: NaiveDateTime) -> String {
    dt.format(DT_FMT).to_string()
}

fn parse_dt(s: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DT_FMT).map_err(|e| conv(0, e))
}

fn conv<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn bad(idx: usize, what: &str, value: &str) -> rusqlite::Error {
    conv(idx, Error::Store(format!("bad {what}: {value}")))
}

fn draft_from_row(row: &Row<'_>) -> rusqlite::Result<Draft> {
    let content_type: String = row.get(2)?;
    let album_json: String = row.get(5)?;
    let buttons_json: String = row.get(6)?;
    let status: String = row.get(10)?;
    let created_at: String = row.get(11)?;
    let published_at: Option<String> = row.get(12)?;

    let album: Vec<AlbumItem> = serde_json::from_str(&album_json).map_err(|e| conv(5, e))?;
    let buttons: Vec<LinkButton> = serde_json::from_str(&buttons_json).map_err(|e| conv(6, e))?;

    Ok(Draft {
        id: DraftId(row.get(0)?),
        author_id: row.get(1)?,
        content_type: ContentType::parse(&content_type)
            .ok_or_else(|| bad(2, "content_type", &content_type))?,
        text: row.get(3)?,
        media: row.get::<_, Option<String>>(4)?.map(MediaRef),
        album,
        buttons,
        source_url: row.get(7)?,
        media_url: row.get(8)?,
        dedup_hash: row.get(9)?,
        status: DraftStatus::parse(&status).ok_or_else(|| bad(10, "status", &status))?,
        created_at: parse_dt(&created_at)?,
        published_at: published_at.as_deref().map(parse_dt).transpose()?,
    })
}

fn slot_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduleSlot> {
    let run_at: String = row.get(2)?;
    let status: String = row.get(3)?;
    Ok(ScheduleSlot {
        id: SlotId(row.get(0)?),
        draft_id: DraftId(row.get(1)?),
        run_at: parse_dt(&run_at)?,
        status: SlotStatus::parse(&status).ok_or_else(|| bad(3, "slot status", &status))?,
    })
}

fn feed_from_row(row: &Row<'_>) -> rusqlite::Result<Feed> {
    Ok(Feed {
        id: FeedId(row.get(0)?),
        url: row.get(1)?,
        title: row.get(2)?,
        active: row.get::<_, i64>(3)? != 0,
        etag: row.get(4)?,
        last_modified: row.get(5)?,
    })
}

impl Store for Database {
    fn insert_draft(&self, draft: NewDraft) -> Result<Option<DraftId>> {
        let album = serde_json::to_string(&draft.album)?;
        let buttons = serde_json::to_string(&draft.buttons)?;
        let now = fmt_dt(chrono::Local::now().naive_local());

        let conn = self.lock()?;
        // The partial unique index on dedup_hash turns a repeated
        // fingerprint into a zero-row insert.
        let rows = conn
            .execute(
                "INSERT OR IGNORE INTO drafts \
                 (author_id, content_type, text, media, album_json, buttons_json, \
                  source_url, media_url, dedup_hash, status, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'draft', ?10)",
                params![
                    draft.author_id,
                    draft.content_type.as_str(),
                    draft.text,
                    draft.media.as_ref().map(|m| m.0.as_str()),
                    album,
                    buttons,
                    draft.source_url,
                    draft.media_url,
                    draft.dedup_hash,
                    now,
                ],
            )
            .map_err(db)?;
        if rows == 0 {
            return Ok(None);
        }
        Ok(Some(DraftId(conn.last_insert_rowid())))
    }

    fn draft(&self, id: DraftId) -> Result<Option<Draft>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {DRAFT_COLS} FROM drafts WHERE id = ?1"),
            [id.0],
            draft_from_row,
        )
        .optional()
        .map_err(db)
    }

    fn drafts_by_status(&self, status: DraftStatus, limit: u32) -> Result<Vec<Draft>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {DRAFT_COLS} FROM drafts WHERE status = ?1 \
                 ORDER BY id DESC LIMIT ?2"
            ))
            .map_err(db)?;
        let rows = stmt
            .query_map(params![status.as_str(), limit], draft_from_row)
            .map_err(db)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db)?;
        Ok(rows)
    }

    fn set_draft_text(&self, id: DraftId, text: Option<&str>) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn
            .execute("UPDATE drafts SET text = ?1 WHERE id = ?2", params![text, id.0])
            .map_err(db)?;
        Ok(rows == 1)
    }

    fn set_draft_media(
        &self,
        id: DraftId,
        content_type: ContentType,
        media: MediaRef,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn
            .execute(
                "UPDATE drafts SET content_type = ?1, media = ?2 WHERE id = ?3",
                params![content_type.as_str(), media.0, id.0],
            )
            .map_err(db)?;
        Ok(rows == 1)
    }

    fn set_draft_buttons(&self, id: DraftId, buttons: &[LinkButton]) -> Result<bool> {
        let json = serde_json::to_string(buttons)?;
        let conn = self.lock()?;
        let rows = conn
            .execute(
                "UPDATE drafts SET buttons_json = ?1 WHERE id = ?2",
                params![json, id.0],
            )
            .map_err(db)?;
        Ok(rows == 1)
    }

    fn mark_published(&self, id: DraftId) -> Result<bool> {
        let now = fmt_dt(chrono::Local::now().naive_local());
        let conn = self.lock()?;
        // Conditional so a concurrent delete is never overwritten.
        let rows = conn
            .execute(
                "UPDATE drafts SET status = 'published', published_at = ?1
                 WHERE id = ?2 AND status IN ('draft', 'queued')",
                params![now, id.0],
            )
            .map_err(db)?;
        Ok(rows == 1)
    }

    fn delete_draft(&self, id: DraftId) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(db)?;
        tx.execute("UPDATE drafts SET status = 'deleted' WHERE id = ?1", [id.0])
            .map_err(db)?;
        tx.execute(
            "UPDATE schedules SET status = 'canceled' \
             WHERE draft_id = ?1 AND status IN ('pending', 'running')",
            [id.0],
        )
        .map_err(db)?;
        tx.commit().map_err(db)
    }

    fn schedule_draft(&self, id: DraftId, run_at: NaiveDateTime) -> Result<SlotId> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(db)?;

        let exists: Option<i64> = tx
            .query_row("SELECT id FROM drafts WHERE id = ?1", [id.0], |r| r.get(0))
            .optional()
            .map_err(db)?;
        if exists.is_none() {
            return Err(Error::Store(format!("draft {id} not found")));
        }

        tx.execute(
            "INSERT INTO schedules (draft_id, run_at, status) VALUES (?1, ?2, 'pending')",
            params![id.0, fmt_dt(run_at)],
        )
        .map_err(db)?;
        let slot_id = SlotId(tx.last_insert_rowid());

        tx.execute(
            "UPDATE drafts SET status = 'queued' WHERE id = ?1 AND status IN ('draft', 'queued')",
            [id.0],
        )
        .map_err(db)?;

        tx.commit().map_err(db)?;
        Ok(slot_id)
    }

    fn slot(&self, id: SlotId) -> Result<Option<ScheduleSlot>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, draft_id, run_at, status FROM schedules WHERE id = ?1",
            [id.0],
            slot_from_row,
        )
        .optional()
        .map_err(db)
    }

    fn due_slots(&self, now: NaiveDateTime, limit: u32) -> Result<Vec<ScheduleSlot>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, draft_id, run_at, status FROM schedules \
                 WHERE status = 'pending' AND run_at <= ?1 \
                 ORDER BY run_at ASC, id ASC LIMIT ?2",
            )
            .map_err(db)?;
        let rows = stmt
            .query_map(params![fmt_dt(now), limit], slot_from_row)
            .map_err(db)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db)?;
        Ok(rows)
    }

    fn claim_slot(&self, id: SlotId) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn
            .execute(
                "UPDATE schedules SET status = 'running' \
                 WHERE id = ?1 AND status = 'pending'",
                [id.0],
            )
            .map_err(db)?;
        Ok(rows == 1)
    }

    fn finish_slot(&self, id: SlotId, status: SlotStatus) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE schedules SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id.0],
        )
        .map_err(db)?;
        Ok(())
    }

    fn cancel_slot(&self, id: SlotId) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn
            .execute(
                "UPDATE schedules SET status = 'canceled' \
                 WHERE id = ?1 AND status != 'done'",
                [id.0],
            )
            .map_err(db)?;
        Ok(rows == 1)
    }

    fn pending_slots(&self, limit: u32) -> Result<Vec<ScheduleSlot>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, draft_id, run_at, status FROM schedules \
                 WHERE status = 'pending' ORDER BY run_at ASC, id ASC LIMIT ?1",
            )
            .map_err(db)?;
        let rows = stmt
            .query_map([limit], slot_from_row)
            .map_err(db)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db)?;
        Ok(rows)
    }

    fn add_feed(&self, url: &str, title: Option<&str>) -> Result<FeedId> {
        let conn = self.lock()?;
        let rows = conn
            .execute(
                "INSERT OR IGNORE INTO feeds (url, title) VALUES (?1, ?2)",
                params![url, title],
            )
            .map_err(db)?;
        if rows == 1 {
            return Ok(FeedId(conn.last_insert_rowid()));
        }
        // Re-adding a known URL yields its existing id.
        conn.query_row("SELECT id FROM feeds WHERE url = ?1", [url], |r| {
            r.get(0).map(FeedId)
        })
        .map_err(db)
    }

    fn feeds(&self) -> Result<Vec<Feed>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, url, title, active, etag, last_modified FROM feeds ORDER BY id ASC",
            )
            .map_err(db)?;
        let rows = stmt
            .query_map([], feed_from_row)
            .map_err(db)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db)?;
        Ok(rows)
    }

    fn active_feeds(&self) -> Result<Vec<Feed>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, url, title, active, etag, last_modified FROM feeds \
                 WHERE active = 1 ORDER BY id ASC",
            )
            .map_err(db)?;
        let rows = stmt
            .query_map([], feed_from_row)
            .map_err(db)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db)?;
        Ok(rows)
    }

    fn set_feed_active(&self, id: FeedId, active: bool) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn
            .execute(
                "UPDATE feeds SET active = ?1 WHERE id = ?2",
                params![active as i64, id.0],
            )
            .map_err(db)?;
        Ok(rows == 1)
    }

    fn bind_channel(&self, chat_id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO settings (key, value) VALUES ('target_channel_id', ?1) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [chat_id.to_string()],
        )
        .map_err(db)?;
        Ok(())
    }

    fn bound_channel(&self) -> Result<Option<i64>> {
        let conn = self.lock()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM settings WHERE key = 'target_channel_id'",
                [],
                |r| r.get(0),
            )
            .optional()
            .map_err(db)?;
        Ok(value.and_then(|v| v.parse::<i64>().ok()))
    }
}
