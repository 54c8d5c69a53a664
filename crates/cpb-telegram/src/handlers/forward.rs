//! Draft intake: any non-command message from an operator becomes a draft.
//!
//! Single messages stage immediately; album parts go through the debounce
//! buffer and stage once the whole group has arrived.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, Message},
};
use tracing::warn;

use cpb_core::{
    domain::{ChatId, DraftId},
    messaging::types::{AlbumItem, MediaKind, MediaRef},
    publish::send_plan,
    render,
    store::{ContentType, NewDraft},
};

use crate::router::{AlbumPart, AppState};

use super::commands::media_content_type;

pub async fn handle_content(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let author_id = msg.from().map(|u| u.id.0 as i64).unwrap_or(0);
    let chat_id = msg.chat.id;

    if let Some(group_id) = msg.media_group_id() {
        let Some(part) = album_part(&msg) else {
            return Ok(());
        };
        let group_id = group_id.to_string();
        let state = state.clone();
        let bot = bot.clone();
        // The dispatcher serializes same-chat updates; waiting out the
        // debounce window inline would starve the rest of the album.
        tokio::spawn(async move {
            let parts = state.albums.add_and_collect(&group_id, part).await;
            if parts.is_empty() {
                return;
            }
            let caption = parts.iter().find_map(|p| p.caption.clone());
            let album: Vec<AlbumItem> = parts
                .into_iter()
                .map(|p| AlbumItem {
                    kind: p.kind,
                    media: p.media,
                })
                .collect();
            let draft = NewDraft {
                author_id,
                content_type: ContentType::Album,
                text: caption,
                album,
                ..Default::default()
            };
            if let Err(e) = create_and_preview(&bot, chat_id, &state, draft).await {
                warn!("album intake failed: {e}");
            }
        });
        return Ok(());
    }

    let Some(draft) = single_draft(&msg, author_id) else {
        bot.send_message(
            chat_id,
            "Send a text, photo, video, document or album to stage a draft.",
        )
        .await?;
        return Ok(());
    };
    if let Err(e) = create_and_preview(&bot, chat_id, &state, draft).await {
        warn!("draft intake failed: {e}");
        bot.send_message(chat_id, "Could not stage that draft.").await?;
    }
    Ok(())
}

/// Consume the media message following `/setmedia`.
pub async fn handle_media_replacement(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
    draft_id: DraftId,
) -> ResponseResult<()> {
    if msg.media_group_id().is_some() {
        bot.send_message(msg.chat.id, "Send a single media item, not an album.")
            .await?;
        return Ok(());
    }
    let Some((kind, media)) = media_ref(&msg) else {
        bot.send_message(
            msg.chat.id,
            "Send a photo, video or document to replace the media.",
        )
        .await?;
        return Ok(());
    };

    match state
        .store
        .set_draft_media(draft_id, media_content_type(kind), media)
    {
        Ok(true) => {
            bot.send_message(msg.chat.id, format!("Draft #{draft_id} media replaced."))
                .await?;
        }
        Ok(false) => {
            bot.send_message(msg.chat.id, format!("No draft #{draft_id}."))
                .await?;
        }
        Err(e) => {
            warn!("setmedia {draft_id} failed: {e}");
            bot.send_message(msg.chat.id, "Storage error.").await?;
        }
    }
    Ok(())
}

async fn create_and_preview(
    bot: &Bot,
    chat: teloxide::types::ChatId,
    state: &AppState,
    draft: NewDraft,
) -> anyhow::Result<()> {
    let Some(id) = state.store.insert_draft(draft)? else {
        // Manual drafts carry no fingerprint; this only fires for dupes.
        return Ok(());
    };
    let Some(stored) = state.store.draft(id)? else {
        return Ok(());
    };

    // Preview in the operator chat, rendered exactly like the real post.
    let plan = render::plan(&stored, state.cfg.trailing_link.as_ref());
    if let Err(e) = send_plan(state.sender.as_ref(), ChatId(chat.0), &plan).await {
        warn!("preview for draft {id} failed: {e}");
    }

    let kb = InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("Publish".to_string(), format!("pub:{id}")),
        InlineKeyboardButton::callback("Schedule".to_string(), format!("sched:{id}")),
        InlineKeyboardButton::callback("Delete".to_string(), format!("del:{id}")),
    ]]);
    bot.send_message(chat, format!("Draft #{id} staged."))
        .reply_markup(kb)
        .await?;
    Ok(())
}

fn single_draft(msg: &Message, author_id: i64) -> Option<NewDraft> {
    if let Some(text) = msg.text() {
        let t = text.trim();
        if t.is_empty() {
            return None;
        }
        return Some(NewDraft {
            author_id,
            content_type: ContentType::Text,
            text: Some(t.to_string()),
            ..Default::default()
        });
    }

    let (kind, media) = media_ref(msg)?;
    Some(NewDraft {
        author_id,
        content_type: media_content_type(kind),
        text: msg.caption().map(|c| c.to_string()),
        media: Some(media),
        ..Default::default()
    })
}

fn media_ref(msg: &Message) -> Option<(MediaKind, MediaRef)> {
    if let Some(sizes) = msg.photo() {
        // Largest rendition last.
        let best = sizes.last()?;
        return Some((MediaKind::Photo, MediaRef(best.file.id.clone())));
    }
    if let Some(v) = msg.video() {
        return Some((MediaKind::Video, MediaRef(v.file.id.clone())));
    }
    if let Some(d) = msg.document() {
        return Some((MediaKind::Document, MediaRef(d.file.id.clone())));
    }
    None
}

fn album_part(msg: &Message) -> Option<AlbumPart> {
    let (kind, media) = media_ref(msg)?;
    Some(AlbumPart {
        kind,
        media,
        caption: msg.caption().map(|c| c.to_string()),
    })
}
