//! Telegram update handlers.
//!
//! Every update is gated on the operator allow-list first; messages from
//! anyone else are dropped without a reply.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use crate::router::{AppState, Pending};

mod callback;
mod commands;
mod forward;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;
    if !state.cfg.is_admin(user_id) {
        return Ok(());
    }

    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            return commands::handle_command(bot, msg, state).await;
        }
    }

    // A pending prompt consumes the operator's next message.
    let pending = state.pending.lock().await.remove(&user_id);
    match pending {
        Some(Pending::ScheduleTime(draft_id)) if msg.text().is_some() => {
            commands::handle_schedule_reply(bot, msg, state, draft_id).await
        }
        Some(Pending::ReplaceMedia(draft_id)) => {
            forward::handle_media_replacement(bot, msg, state, draft_id).await
        }
        _ => forward::handle_content(bot, msg, state).await,
    }
}
