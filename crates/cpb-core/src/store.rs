//! Persistence port: drafts, schedule slots, feeds, settings.
//!
//! The core only sees this trait; the SQLite adapter lives in `cpb-store`.
//! Every status transition is expressed as a conditional update ("set Y
//! where status = X") so concurrent actors cannot double-claim a slot.

use chrono::NaiveDateTime;

use crate::domain::{DraftId, FeedId, SlotId};
use crate::messaging::types::{AlbumItem, LinkButton, MediaRef};
use crate::Result;

/// Content kind of a draft.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContentType {
    #[default]
    Text,
    Photo,
    Video,
    Document,
    Album,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Photo => "photo",
            ContentType::Video => "video",
            ContentType::Document => "document",
            ContentType::Album => "album",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(ContentType::Text),
            "photo" => Some(ContentType::Photo),
            "video" => Some(ContentType::Video),
            "document" => Some(ContentType::Document),
            "album" => Some(ContentType::Album),
            _ => None,
        }
    }
}

/// Draft lifecycle: draft → queued → published, with draft|queued → deleted.
/// `published` and `deleted` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DraftStatus {
    Draft,
    Queued,
    Published,
    Deleted,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::Draft => "draft",
            DraftStatus::Queued => "queued",
            DraftStatus::Published => "published",
            DraftStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(DraftStatus::Draft),
            "queued" => Some(DraftStatus::Queued),
            "published" => Some(DraftStatus::Published),
            "deleted" => Some(DraftStatus::Deleted),
            _ => None,
        }
    }
}

/// Schedule slot lifecycle: pending → running → done|canceled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotStatus {
    Pending,
    Running,
    Done,
    Canceled,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Pending => "pending",
            SlotStatus::Running => "running",
            SlotStatus::Done => "done",
            SlotStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SlotStatus::Pending),
            "running" => Some(SlotStatus::Running),
            "done" => Some(SlotStatus::Done),
            "canceled" => Some(SlotStatus::Canceled),
            _ => None,
        }
    }
}

/// A unit of content staged for review and publication.
#[derive(Clone, Debug)]
pub struct Draft {
    pub id: DraftId,
    /// 0 for feed-ingested drafts, else the creating operator.
    pub author_id: i64,
    pub content_type: ContentType,
    /// Unescaped body/caption source.
    pub text: Option<String>,
    /// Single media asset; empty for text and album drafts.
    pub media: Option<MediaRef>,
    /// Ordered album items; only for album drafts.
    pub album: Vec<AlbumItem>,
    pub buttons: Vec<LinkButton>,
    /// Provenance for ingested items.
    pub source_url: Option<String>,
    pub media_url: Option<String>,
    /// Content fingerprint; unique across drafts when present.
    pub dedup_hash: Option<String>,
    pub status: DraftStatus,
    pub created_at: NaiveDateTime,
    pub published_at: Option<NaiveDateTime>,
}

/// Fields for creating a draft (entry state is always `draft`).
#[derive(Clone, Debug, Default)]
pub struct NewDraft {
    pub author_id: i64,
    pub content_type: ContentType,
    pub text: Option<String>,
    pub media: Option<MediaRef>,
    pub album: Vec<AlbumItem>,
    pub buttons: Vec<LinkButton>,
    pub source_url: Option<String>,
    pub media_url: Option<String>,
    pub dedup_hash: Option<String>,
}

/// One planned publish attempt for exactly one draft.
#[derive(Clone, Debug)]
pub struct ScheduleSlot {
    pub id: SlotId,
    pub draft_id: DraftId,
    /// Local wall-clock time, minute precision.
    pub run_at: NaiveDateTime,
    pub status: SlotStatus,
}

/// A subscribed feed source.
#[derive(Clone, Debug)]
pub struct Feed {
    pub id: FeedId,
    pub url: String,
    pub title: Option<String>,
    pub active: bool,
    /// Cursor state for future conditional fetch; unused for correctness.
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// Persistence port. Implementations must make each method atomic.
pub trait Store: Send + Sync {
    // --- drafts ---

    /// Insert a draft. Returns `None` when `dedup_hash` is set and a draft
    /// with the same hash already exists ("already seen", not an error).
    fn insert_draft(&self, draft: NewDraft) -> Result<Option<DraftId>>;

    fn draft(&self, id: DraftId) -> Result<Option<Draft>>;

    /// Drafts with the given status, most recent first.
    fn drafts_by_status(&self, status: DraftStatus, limit: u32) -> Result<Vec<Draft>>;

    fn set_draft_text(&self, id: DraftId, text: Option<&str>) -> Result<bool>;

    fn set_draft_media(&self, id: DraftId, content_type: ContentType, media: MediaRef)
        -> Result<bool>;

    fn set_draft_buttons(&self, id: DraftId, buttons: &[LinkButton]) -> Result<bool>;

    /// Terminal transition to `published`; sets `published_at`. Fires only
    /// from {draft, queued}; `false` means the draft is missing or was
    /// deleted (or already published) in the meantime.
    fn mark_published(&self, id: DraftId) -> Result<bool>;

    /// Terminal transition to `deleted`; cancels all of the draft's slots
    /// still in {pending, running} in the same transaction.
    fn delete_draft(&self, id: DraftId) -> Result<()>;

    // --- schedule slots ---

    /// Create a pending slot and move the draft to `queued`.
    fn schedule_draft(&self, id: DraftId, run_at: NaiveDateTime) -> Result<SlotId>;

    fn slot(&self, id: SlotId) -> Result<Option<ScheduleSlot>>;

    /// Pending slots with `run_at <= now`, ordered by run_at then id.
    fn due_slots(&self, now: NaiveDateTime, limit: u32) -> Result<Vec<ScheduleSlot>>;

    /// CAS pending → running. False when the slot was already claimed,
    /// finished or canceled by another actor.
    fn claim_slot(&self, id: SlotId) -> Result<bool>;

    /// Record the outcome of a claimed slot (done or canceled).
    fn finish_slot(&self, id: SlotId, status: SlotStatus) -> Result<()>;

    /// Cancel a slot unless it is already done. False when nothing changed.
    fn cancel_slot(&self, id: SlotId) -> Result<bool>;

    /// Pending slots ordered by run_at then id (FIFO tie-break).
    fn pending_slots(&self, limit: u32) -> Result<Vec<ScheduleSlot>>;

    // --- feeds ---

    fn add_feed(&self, url: &str, title: Option<&str>) -> Result<FeedId>;

    fn feeds(&self) -> Result<Vec<Feed>>;

    fn active_feeds(&self) -> Result<Vec<Feed>>;

    fn set_feed_active(&self, id: FeedId, active: bool) -> Result<bool>;

    // --- settings ---

    /// Bind the publish target channel, overriding the configured default.
    fn bind_channel(&self, chat_id: i64) -> Result<()>;

    fn bound_channel(&self) -> Result<Option<i64>>;
}
