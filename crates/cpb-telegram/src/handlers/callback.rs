//! Inline-button actions on drafts and queue slots.
//!
//! Data formats: `pub:<draft>`, `del:<draft>`, `sched:<draft>`,
//! `qpub:<slot>`, `qdel:<slot>`. Actions on slots that already left the
//! pending state answer "already inactive" and change nothing.

use std::sync::Arc;

use teloxide::prelude::*;
use tracing::warn;

use cpb_core::{
    domain::{DraftId, SlotId},
    store::SlotStatus,
};

use crate::router::{AppState, Pending};

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let user_id = q.from.id.0 as i64;
    let data = q.data.clone().unwrap_or_default();

    if !state.cfg.is_admin(user_id) {
        bot.answer_callback_query(cb_id).await?;
        return Ok(());
    }

    let Some((action, raw_id)) = data.split_once(':') else {
        bot.answer_callback_query(cb_id).await?;
        return Ok(());
    };
    let Ok(id) = raw_id.parse::<i64>() else {
        bot.answer_callback_query(cb_id).await?;
        return Ok(());
    };

    let answer = match action {
        "pub" => publish_draft(&state, DraftId(id)).await,
        "del" => delete_draft(&state, DraftId(id)),
        "sched" => {
            state
                .pending
                .lock()
                .await
                .insert(user_id, Pending::ScheduleTime(DraftId(id)));
            if let Some(m) = q.message.as_ref() {
                bot.send_message(m.chat.id, "When? HH:MM, DD.MM.YYYY HH:MM or YYYY-MM-DD HH:MM")
                    .await?;
            }
            format!("Scheduling draft #{id}")
        }
        "qpub" => run_slot_now(&state, SlotId(id)).await,
        "qdel" => cancel_slot(&state, SlotId(id)),
        _ => "Unknown action".to_string(),
    };

    bot.answer_callback_query(cb_id).text(answer).await?;
    Ok(())
}

async fn publish_draft(state: &AppState, id: DraftId) -> String {
    match state.publisher.publish(id).await {
        Ok(true) => format!("Draft #{id} published"),
        Ok(false) => format!("Draft #{id} not published"),
        Err(e) => {
            warn!("callback publish {id} failed: {e}");
            "Publish failed".to_string()
        }
    }
}

fn delete_draft(state: &AppState, id: DraftId) -> String {
    match state.store.delete_draft(id) {
        Ok(()) => format!("Draft #{id} deleted"),
        Err(e) => {
            warn!("callback delete {id} failed: {e}");
            "Storage error".to_string()
        }
    }
}

/// "Post now" for a queued slot: same claim/publish/finish sequence the
/// engine runs, so the engine can never double-post it later.
async fn run_slot_now(state: &AppState, id: SlotId) -> String {
    match state.store.claim_slot(id) {
        Ok(true) => {}
        Ok(false) => return "Slot already inactive".to_string(),
        Err(e) => {
            warn!("callback claim {id} failed: {e}");
            return "Storage error".to_string();
        }
    }

    let slot = match state.store.slot(id) {
        Ok(Some(s)) => s,
        Ok(None) => return "Slot already inactive".to_string(),
        Err(e) => {
            warn!("callback slot {id} failed: {e}");
            return "Storage error".to_string();
        }
    };

    let ok = match state.publisher.publish(slot.draft_id).await {
        Ok(v) => v,
        Err(e) => {
            warn!("callback slot publish {id} failed: {e}");
            false
        }
    };
    let status = if ok { SlotStatus::Done } else { SlotStatus::Canceled };
    if let Err(e) = state.store.finish_slot(id, status) {
        warn!("callback finish {id} failed: {e}");
    }
    if ok {
        format!("Draft #{} published", slot.draft_id)
    } else {
        "Publish failed; slot canceled".to_string()
    }
}

fn cancel_slot(state: &AppState, id: SlotId) -> String {
    match state.store.cancel_slot(id) {
        Ok(true) => "Slot canceled".to_string(),
        Ok(false) => "Slot already inactive".to_string(),
        Err(e) => {
            warn!("callback cancel {id} failed: {e}");
            "Storage error".to_string()
        }
    }
}
