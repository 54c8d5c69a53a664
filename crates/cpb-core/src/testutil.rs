//! In-memory fakes for core tests: a `Store` backed by vectors and a
//! `PostSender` that records every send.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};

use crate::domain::{ChatId, DraftId, FeedId, SlotId};
use crate::messaging::port::PostSender;
use crate::messaging::types::{AlbumItem, Keyboard, LinkButton, MediaKind, MediaRef};
use crate::store::{
    ContentType, Draft, DraftStatus, Feed, NewDraft, ScheduleSlot, SlotStatus, Store,
};
use crate::{Error, Result};

#[derive(Default)]
struct MemoryInner {
    drafts: Vec<Draft>,
    slots: Vec<ScheduleSlot>,
    feeds: Vec<Feed>,
    bound_channel: Option<i64>,
    next_draft: i64,
    next_slot: i64,
    next_feed: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().expect("memory store lock")
    }

    pub fn slot_status(&self, id: SlotId) -> Option<SlotStatus> {
        self.lock().slots.iter().find(|s| s.id == id).map(|s| s.status)
    }

    pub fn draft_status(&self, id: DraftId) -> Option<DraftStatus> {
        self.lock().drafts.iter().find(|d| d.id == id).map(|d| d.status)
    }
}

impl Store for MemoryStore {
    fn insert_draft(&self, draft: NewDraft) -> Result<Option<DraftId>> {
        let mut inner = self.lock();
        if let Some(hash) = &draft.dedup_hash {
            if inner
                .drafts
                .iter()
                .any(|d| d.dedup_hash.as_deref() == Some(hash.as_str()))
            {
                return Ok(None);
            }
        }
        inner.next_draft += 1;
        let id = DraftId(inner.next_draft);
        inner.drafts.push(Draft {
            id,
            author_id: draft.author_id,
            content_type: draft.content_type,
            text: draft.text,
            media: draft.media,
            album: draft.album,
            buttons: draft.buttons,
            source_url: draft.source_url,
            media_url: draft.media_url,
            dedup_hash: draft.dedup_hash,
            status: DraftStatus::Draft,
            created_at: Local::now().naive_local(),
            published_at: None,
        });
        Ok(Some(id))
    }

    fn draft(&self, id: DraftId) -> Result<Option<Draft>> {
        Ok(self.lock().drafts.iter().find(|d| d.id == id).cloned())
    }

    fn drafts_by_status(&self, status: DraftStatus, limit: u32) -> Result<Vec<Draft>> {
        let inner = self.lock();
        let mut out: Vec<Draft> = inner
            .drafts
            .iter()
            .filter(|d| d.status == status)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.id.cmp(&a.id));
        out.truncate(limit as usize);
        Ok(out)
    }

    fn set_draft_text(&self, id: DraftId, text: Option<&str>) -> Result<bool> {
        let mut inner = self.lock();
        let Some(d) = inner.drafts.iter_mut().find(|d| d.id == id) else {
            return Ok(false);
        };
        d.text = text.map(|s| s.to_string());
        Ok(true)
    }

    fn set_draft_media(
        &self,
        id: DraftId,
        content_type: ContentType,
        media: MediaRef,
    ) -> Result<bool> {
        let mut inner = self.lock();
        let Some(d) = inner.drafts.iter_mut().find(|d| d.id == id) else {
            return Ok(false);
        };
        d.content_type = content_type;
        d.media = Some(media);
        Ok(true)
    }

    fn set_draft_buttons(&self, id: DraftId, buttons: &[LinkButton]) -> Result<bool> {
        let mut inner = self.lock();
        let Some(d) = inner.drafts.iter_mut().find(|d| d.id == id) else {
            return Ok(false);
        };
        d.buttons = buttons.to_vec();
        Ok(true)
    }

    fn mark_published(&self, id: DraftId) -> Result<bool> {
        let mut inner = self.lock();
        let Some(d) = inner.drafts.iter_mut().find(|d| d.id == id) else {
            return Ok(false);
        };
        if !matches!(d.status, DraftStatus::Draft | DraftStatus::Queued) {
            return Ok(false);
        }
        d.status = DraftStatus::Published;
        d.published_at = Some(Local::now().naive_local());
        Ok(true)
    }

    fn delete_draft(&self, id: DraftId) -> Result<()> {
        let mut inner = self.lock();
        if let Some(d) = inner.drafts.iter_mut().find(|d| d.id == id) {
            d.status = DraftStatus::Deleted;
        }
        for s in inner
            .slots
            .iter_mut()
            .filter(|s| s.draft_id == id)
        {
            if matches!(s.status, SlotStatus::Pending | SlotStatus::Running) {
                s.status = SlotStatus::Canceled;
            }
        }
        Ok(())
    }

    fn schedule_draft(&self, id: DraftId, run_at: NaiveDateTime) -> Result<SlotId> {
        let mut inner = self.lock();
        if !inner.drafts.iter().any(|d| d.id == id) {
            return Err(Error::Store(format!("draft {id} not found")));
        }
        inner.next_slot += 1;
        let sid = SlotId(inner.next_slot);
        inner.slots.push(ScheduleSlot {
            id: sid,
            draft_id: id,
            run_at,
            status: SlotStatus::Pending,
        });
        if let Some(d) = inner.drafts.iter_mut().find(|d| d.id == id) {
            d.status = DraftStatus::Queued;
        }
        Ok(sid)
    }

    fn slot(&self, id: SlotId) -> Result<Option<ScheduleSlot>> {
        Ok(self.lock().slots.iter().find(|s| s.id == id).cloned())
    }

    fn due_slots(&self, now: NaiveDateTime, limit: u32) -> Result<Vec<ScheduleSlot>> {
        let inner = self.lock();
        let mut due: Vec<ScheduleSlot> = inner
            .slots
            .iter()
            .filter(|s| s.status == SlotStatus::Pending && s.run_at <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.run_at.cmp(&b.run_at).then(a.id.cmp(&b.id)));
        due.truncate(limit as usize);
        Ok(due)
    }

    fn claim_slot(&self, id: SlotId) -> Result<bool> {
        let mut inner = self.lock();
        let Some(s) = inner.slots.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        if s.status != SlotStatus::Pending {
            return Ok(false);
        }
        s.status = SlotStatus::Running;
        Ok(true)
    }

    fn finish_slot(&self, id: SlotId, status: SlotStatus) -> Result<()> {
        let mut inner = self.lock();
        if let Some(s) = inner.slots.iter_mut().find(|s| s.id == id) {
            s.status = status;
        }
        Ok(())
    }

    fn cancel_slot(&self, id: SlotId) -> Result<bool> {
        let mut inner = self.lock();
        let Some(s) = inner.slots.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        if s.status == SlotStatus::Done {
            return Ok(false);
        }
        s.status = SlotStatus::Canceled;
        Ok(true)
    }

    fn pending_slots(&self, limit: u32) -> Result<Vec<ScheduleSlot>> {
        let inner = self.lock();
        let mut out: Vec<ScheduleSlot> = inner
            .slots
            .iter()
            .filter(|s| s.status == SlotStatus::Pending)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.run_at.cmp(&b.run_at).then(a.id.cmp(&b.id)));
        out.truncate(limit as usize);
        Ok(out)
    }

    fn add_feed(&self, url: &str, title: Option<&str>) -> Result<FeedId> {
        let mut inner = self.lock();
        inner.next_feed += 1;
        let id = FeedId(inner.next_feed);
        inner.feeds.push(Feed {
            id,
            url: url.to_string(),
            title: title.map(|s| s.to_string()),
            active: true,
            etag: None,
            last_modified: None,
        });
        Ok(id)
    }

    fn feeds(&self) -> Result<Vec<Feed>> {
        Ok(self.lock().feeds.clone())
    }

    fn active_feeds(&self) -> Result<Vec<Feed>> {
        Ok(self
            .lock()
            .feeds
            .iter()
            .filter(|f| f.active)
            .cloned()
            .collect())
    }

    fn set_feed_active(&self, id: FeedId, active: bool) -> Result<bool> {
        let mut inner = self.lock();
        let Some(f) = inner.feeds.iter_mut().find(|f| f.id == id) else {
            return Ok(false);
        };
        f.active = active;
        Ok(true)
    }

    fn bind_channel(&self, chat_id: i64) -> Result<()> {
        self.lock().bound_channel = Some(chat_id);
        Ok(())
    }

    fn bound_channel(&self) -> Result<Option<i64>> {
        Ok(self.lock().bound_channel)
    }
}

/// Everything a [`RecordingSender`] saw go out, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sent {
    Text {
        chat_id: ChatId,
        html: String,
        keyboard: Option<Keyboard>,
    },
    Media {
        chat_id: ChatId,
        kind: MediaKind,
        media: MediaRef,
        caption: Option<String>,
    },
    MediaGroup {
        chat_id: ChatId,
        items: Vec<AlbumItem>,
        caption_first: Option<String>,
    },
}

/// `PostSender` fake: records sends; calls with index >= `fail_from` fail.
pub struct RecordingSender {
    pub sent: Mutex<Vec<Sent>>,
    calls: AtomicUsize,
    fail_from: usize,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::failing_from(usize::MAX)
    }

    pub fn failing_from(fail_from: usize) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            fail_from,
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().expect("sent lock").clone()
    }

    fn check(&self) -> Result<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n >= self.fail_from {
            return Err(Error::External("simulated send failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PostSender for RecordingSender {
    async fn send_text(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<()> {
        self.check()?;
        self.sent.lock().expect("sent lock").push(Sent::Text {
            chat_id,
            html: html.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn send_media(
        &self,
        chat_id: ChatId,
        kind: MediaKind,
        media: &MediaRef,
        caption: Option<&str>,
        _keyboard: Option<&Keyboard>,
    ) -> Result<()> {
        self.check()?;
        self.sent.lock().expect("sent lock").push(Sent::Media {
            chat_id,
            kind,
            media: media.clone(),
            caption: caption.map(|s| s.to_string()),
        });
        Ok(())
    }

    async fn send_media_group(
        &self,
        chat_id: ChatId,
        items: &[AlbumItem],
        caption_first: Option<&str>,
    ) -> Result<()> {
        self.check()?;
        self.sent.lock().expect("sent lock").push(Sent::MediaGroup {
            chat_id,
            items: items.to_vec(),
            caption_first: caption_first.map(|s| s.to_string()),
        });
        Ok(())
    }
}
