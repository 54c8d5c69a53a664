//! Publisher: one publish operation, used by manual "publish now" and the
//! schedule engine alike.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::domain::{ChatId, DraftId};
use crate::messaging::port::PostSender;
use crate::render::{self, Outbound};
use crate::store::{DraftStatus, Store};
use crate::Result;

pub struct Publisher {
    cfg: Arc<Config>,
    store: Arc<dyn Store>,
    sender: Arc<dyn PostSender>,
}

impl Publisher {
    pub fn new(cfg: Arc<Config>, store: Arc<dyn Store>, sender: Arc<dyn PostSender>) -> Self {
        Self { cfg, store, sender }
    }

    /// The bound channel wins over the configured default.
    pub fn target_channel(&self) -> Result<Option<ChatId>> {
        let bound = self.store.bound_channel()?;
        Ok(bound.or(self.cfg.target_channel_id).map(ChatId))
    }

    /// Publish one draft to the target channel.
    ///
    /// `Ok(false)` covers every non-exceptional failure: draft missing or
    /// deleted, no channel bound, any send error. A partially-sent plan is
    /// still a failure and the draft stays unpublished. Re-publishing an
    /// already-published draft is a success no-op so a stale schedule slot
    /// cannot double-post.
    pub async fn publish(&self, id: DraftId) -> Result<bool> {
        let Some(draft) = self.store.draft(id)? else {
            warn!("publish: draft {id} not found");
            return Ok(false);
        };

        match draft.status {
            DraftStatus::Published => {
                info!("publish: draft {id} already published, skipping");
                return Ok(true);
            }
            DraftStatus::Deleted => {
                warn!("publish: draft {id} is deleted");
                return Ok(false);
            }
            DraftStatus::Draft | DraftStatus::Queued => {}
        }

        let Some(chat_id) = self.target_channel()? else {
            warn!("publish: no target channel bound");
            return Ok(false);
        };

        let plan = render::plan(&draft, self.cfg.trailing_link.as_ref());
        if let Err(e) = send_plan(self.sender.as_ref(), chat_id, &plan).await {
            warn!("publish: draft {id} failed: {e}");
            return Ok(false);
        }

        if !self.store.mark_published(id)? {
            // Deleted out from under us while the sends were in flight.
            warn!("publish: draft {id} changed state mid-send, left unpublished");
            return Ok(false);
        }
        info!("published draft {id}");
        Ok(true)
    }
}

/// Send a rendered plan in order. Also used for operator previews.
pub async fn send_plan(sender: &dyn PostSender, chat_id: ChatId, plan: &[Outbound]) -> Result<()> {
    for msg in plan {
        match msg {
            Outbound::Text { html, keyboard } => {
                sender.send_text(chat_id, html, keyboard.as_ref()).await?;
            }
            Outbound::Media {
                kind,
                media,
                caption,
                keyboard,
            } => {
                sender
                    .send_media(chat_id, *kind, media, caption.as_deref(), keyboard.as_ref())
                    .await?;
            }
            Outbound::MediaGroup {
                items,
                caption_first,
            } => {
                sender
                    .send_media_group(chat_id, items, caption_first.as_deref())
                    .await?;
            }
        }
    }
    Ok(())
}
