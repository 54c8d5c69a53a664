use async_trait::async_trait;

use crate::{
    domain::ChatId,
    messaging::types::{AlbumItem, Keyboard, MediaKind, MediaRef},
    Result,
};

/// Outbound-channel port.
///
/// Telegram is the first implementation. None of these operations are
/// idempotent; callers guard against double-publish at the schedule-slot
/// level, not here.
#[async_trait]
pub trait PostSender: Send + Sync {
    /// Send a standalone HTML text message, optionally with a URL keyboard.
    async fn send_text(&self, chat_id: ChatId, html: &str, keyboard: Option<&Keyboard>)
        -> Result<()>;

    /// Send a single media message with an optional HTML caption.
    async fn send_media(
        &self,
        chat_id: ChatId,
        kind: MediaKind,
        media: &MediaRef,
        caption: Option<&str>,
        keyboard: Option<&Keyboard>,
    ) -> Result<()>;

    /// Send a multi-item album. Only the first item may carry a caption;
    /// media groups cannot carry inline keyboards at all.
    async fn send_media_group(
        &self,
        chat_id: ChatId,
        items: &[AlbumItem],
        caption_first: Option<&str>,
    ) -> Result<()>;
}
