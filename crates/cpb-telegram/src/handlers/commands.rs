use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode},
};
use tracing::warn;

use cpb_core::{
    domain::{DraftId, FeedId},
    render::escape_html,
    store::{ContentType, DraftStatus},
    utils::{parse_buttons_spec, parse_user_dt},
};

use crate::router::{AppState, Pending};

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

fn parse_id(s: &str) -> Option<i64> {
    s.trim().trim_start_matches('#').parse::<i64>().ok()
}

async fn reply(bot: &Bot, msg: &Message, text: &str) -> ResponseResult<()> {
    bot.send_message(msg.chat.id, text.to_string()).await?;
    Ok(())
}

async fn reply_html(bot: &Bot, msg: &Message, html: &str) -> ResponseResult<()> {
    bot.send_message(msg.chat.id, html.to_string())
        .parse_mode(ParseMode::Html)
        .disable_web_page_preview(true)
        .await?;
    Ok(())
}

const HELP: &str = "Channel post bot.\n\n\
Send a text, photo, video, document or album to stage a draft.\n\n\
/drafts — recent drafts\n\
/published — recently published drafts\n\
/queue — scheduled posts\n\
/publish <id> — post a draft now\n\
/schedule <id> <time> — queue a draft (HH:MM, DD.MM.YYYY HH:MM, YYYY-MM-DD HH:MM)\n\
/delete <id> — discard a draft\n\
/settext <id> <text> — replace a draft's text\n\
/setmedia <id> — replace a draft's media (send the new media next)\n\
/setbuttons <id> + `label | url` lines — replace link buttons\n\
/feeds, /addfeed <url>, /feedon <id>, /feedoff <id> — feed sources\n\
/bind <chat_id> — set the target channel";

pub async fn handle_command(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let (cmd, args) = parse_command(msg.text().unwrap_or(""));

    match cmd.as_str() {
        "start" | "help" => reply(&bot, &msg, HELP).await,
        "drafts" => cmd_drafts(&bot, &msg, &state).await,
        "published" => cmd_published(&bot, &msg, &state).await,
        "queue" => cmd_queue(&bot, &msg, &state).await,
        "publish" => cmd_publish(&bot, &msg, &state, &args).await,
        "schedule" => cmd_schedule(&bot, &msg, &state, &args).await,
        "delete" => cmd_delete(&bot, &msg, &state, &args).await,
        "settext" => cmd_settext(&bot, &msg, &state, &args).await,
        "setmedia" => cmd_setmedia(&bot, &msg, &state, &args).await,
        "setbuttons" => cmd_setbuttons(&bot, &msg, &state, &args).await,
        "feeds" => cmd_feeds(&bot, &msg, &state).await,
        "addfeed" => cmd_addfeed(&bot, &msg, &state, &args).await,
        "feedon" => cmd_feed_toggle(&bot, &msg, &state, &args, true).await,
        "feedoff" => cmd_feed_toggle(&bot, &msg, &state, &args, false).await,
        "bind" => cmd_bind(&bot, &msg, &state, &args).await,
        _ => reply(&bot, &msg, "Unknown command. /help").await,
    }
}

async fn cmd_drafts(bot: &Bot, msg: &Message, state: &AppState) -> ResponseResult<()> {
    let drafts = match state.store.drafts_by_status(DraftStatus::Draft, 10) {
        Ok(d) => d,
        Err(e) => {
            warn!("/drafts failed: {e}");
            return reply(bot, msg, "Storage error.").await;
        }
    };
    if drafts.is_empty() {
        return reply(bot, msg, "No drafts.").await;
    }

    let mut lines = Vec::new();
    let mut rows = Vec::new();
    for d in &drafts {
        let excerpt: String = d
            .text
            .as_deref()
            .unwrap_or("(no text)")
            .chars()
            .take(60)
            .collect();
        lines.push(format!(
            "<b>#{}</b> [{}] {}",
            d.id,
            d.content_type.as_str(),
            escape_html(&excerpt)
        ));
        rows.push(vec![
            InlineKeyboardButton::callback(format!("Publish #{}", d.id), format!("pub:{}", d.id)),
            InlineKeyboardButton::callback("Schedule".to_string(), format!("sched:{}", d.id)),
            InlineKeyboardButton::callback("Delete".to_string(), format!("del:{}", d.id)),
        ]);
    }

    bot.send_message(msg.chat.id, lines.join("\n"))
        .parse_mode(ParseMode::Html)
        .reply_markup(InlineKeyboardMarkup::new(rows))
        .await?;
    Ok(())
}

async fn cmd_published(bot: &Bot, msg: &Message, state: &AppState) -> ResponseResult<()> {
    let drafts = match state.store.drafts_by_status(DraftStatus::Published, 10) {
        Ok(d) => d,
        Err(e) => {
            warn!("/published failed: {e}");
            return reply(bot, msg, "Storage error.").await;
        }
    };
    if drafts.is_empty() {
        return reply(bot, msg, "Nothing published yet.").await;
    }

    let lines: Vec<String> = drafts
        .iter()
        .map(|d| {
            let excerpt: String = d
                .text
                .as_deref()
                .unwrap_or("(no text)")
                .chars()
                .take(60)
                .collect();
            let when = d
                .published_at
                .map(|t| t.format("%d.%m.%Y %H:%M").to_string())
                .unwrap_or_default();
            format!(
                "<b>#{}</b> [{}] {when} {}",
                d.id,
                d.content_type.as_str(),
                escape_html(&excerpt)
            )
        })
        .collect();
    reply_html(bot, msg, &lines.join("\n")).await
}

async fn cmd_queue(bot: &Bot, msg: &Message, state: &AppState) -> ResponseResult<()> {
    let slots = match state.store.pending_slots(25) {
        Ok(s) => s,
        Err(e) => {
            warn!("/queue failed: {e}");
            return reply(bot, msg, "Storage error.").await;
        }
    };
    if slots.is_empty() {
        return reply(bot, msg, "Queue is empty.").await;
    }

    let mut lines = Vec::new();
    let mut rows = Vec::new();
    for s in &slots {
        lines.push(format!(
            "draft #{} at {}",
            s.draft_id,
            s.run_at.format("%d.%m.%Y %H:%M")
        ));
        rows.push(vec![
            InlineKeyboardButton::callback(
                format!("Post #{} now", s.draft_id),
                format!("qpub:{}", s.id),
            ),
            InlineKeyboardButton::callback("Cancel".to_string(), format!("qdel:{}", s.id)),
        ]);
    }

    bot.send_message(msg.chat.id, lines.join("\n"))
        .reply_markup(InlineKeyboardMarkup::new(rows))
        .await?;
    Ok(())
}

async fn cmd_publish(bot: &Bot, msg: &Message, state: &AppState, args: &str) -> ResponseResult<()> {
    let Some(id) = parse_id(args) else {
        return reply(bot, msg, "Usage: /publish <draft id>").await;
    };
    match state.publisher.publish(DraftId(id)).await {
        Ok(true) => reply(bot, msg, &format!("Draft #{id} published.")).await,
        Ok(false) => reply(bot, msg, &format!("Draft #{id} could not be published.")).await,
        Err(e) => {
            warn!("/publish {id} failed: {e}");
            reply(bot, msg, "Publish failed.").await
        }
    }
}

async fn cmd_schedule(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    args: &str,
) -> ResponseResult<()> {
    let mut parts = args.splitn(2, char::is_whitespace);
    let Some(id) = parts.next().and_then(parse_id) else {
        return reply(bot, msg, "Usage: /schedule <draft id> <time>").await;
    };
    let draft_id = DraftId(id);

    match parts.next() {
        Some(when) => schedule_at(bot, msg, state, draft_id, when).await,
        None => {
            // Ask for the time as a follow-up message.
            if let Some(user) = msg.from() {
                state
                    .pending
                    .lock()
                    .await
                    .insert(user.id.0 as i64, Pending::ScheduleTime(draft_id));
            }
            reply(
                bot,
                msg,
                "When? HH:MM, DD.MM.YYYY HH:MM or YYYY-MM-DD HH:MM",
            )
            .await
        }
    }
}

pub async fn handle_schedule_reply(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
    draft_id: DraftId,
) -> ResponseResult<()> {
    let when = msg.text().unwrap_or("");
    schedule_at(&bot, &msg, &state, draft_id, when).await
}

async fn schedule_at(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    draft_id: DraftId,
    when: &str,
) -> ResponseResult<()> {
    let run_at = match parse_user_dt(when) {
        Ok(dt) => dt,
        Err(_) => {
            return reply(
                bot,
                msg,
                "Could not parse that time. Try HH:MM or DD.MM.YYYY HH:MM.",
            )
            .await;
        }
    };
    match state.store.schedule_draft(draft_id, run_at) {
        Ok(_) => {
            reply(
                bot,
                msg,
                &format!("Draft #{draft_id} queued for {}.", run_at.format("%d.%m.%Y %H:%M")),
            )
            .await
        }
        Err(e) => {
            warn!("schedule {draft_id} failed: {e}");
            reply(bot, msg, "Could not schedule that draft.").await
        }
    }
}

async fn cmd_delete(bot: &Bot, msg: &Message, state: &AppState, args: &str) -> ResponseResult<()> {
    let Some(id) = parse_id(args) else {
        return reply(bot, msg, "Usage: /delete <draft id>").await;
    };
    match state.store.delete_draft(DraftId(id)) {
        Ok(()) => reply(bot, msg, &format!("Draft #{id} deleted.")).await,
        Err(e) => {
            warn!("/delete {id} failed: {e}");
            reply(bot, msg, "Storage error.").await
        }
    }
}

async fn cmd_settext(bot: &Bot, msg: &Message, state: &AppState, args: &str) -> ResponseResult<()> {
    let mut parts = args.splitn(2, char::is_whitespace);
    let Some(id) = parts.next().and_then(parse_id) else {
        return reply(bot, msg, "Usage: /settext <draft id> <new text>").await;
    };
    let text = parts.next().map(str::trim).filter(|t| !t.is_empty());
    match state.store.set_draft_text(DraftId(id), text) {
        Ok(true) => reply(bot, msg, &format!("Draft #{id} text updated.")).await,
        Ok(false) => reply(bot, msg, &format!("No draft #{id}.")).await,
        Err(e) => {
            warn!("/settext {id} failed: {e}");
            reply(bot, msg, "Storage error.").await
        }
    }
}

async fn cmd_setmedia(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    args: &str,
) -> ResponseResult<()> {
    let Some(id) = parse_id(args) else {
        return reply(bot, msg, "Usage: /setmedia <draft id>").await;
    };
    match state.store.draft(DraftId(id)) {
        Ok(Some(_)) => {
            // Ask for the replacement media as a follow-up message.
            if let Some(user) = msg.from() {
                state
                    .pending
                    .lock()
                    .await
                    .insert(user.id.0 as i64, Pending::ReplaceMedia(DraftId(id)));
            }
            reply(bot, msg, "Send the new photo, video or document.").await
        }
        Ok(None) => reply(bot, msg, &format!("No draft #{id}.")).await,
        Err(e) => {
            warn!("/setmedia {id} failed: {e}");
            reply(bot, msg, "Storage error.").await
        }
    }
}

async fn cmd_setbuttons(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    args: &str,
) -> ResponseResult<()> {
    let mut lines = args.lines();
    let Some(id) = lines.next().and_then(parse_id) else {
        return reply(
            bot,
            msg,
            "Usage: /setbuttons <draft id>, then one `label | url` per line.",
        )
        .await;
    };
    let spec: String = lines.collect::<Vec<_>>().join("\n");
    let buttons = parse_buttons_spec(&spec);
    match state.store.set_draft_buttons(DraftId(id), &buttons) {
        Ok(true) => {
            reply(
                bot,
                msg,
                &format!("Draft #{id}: {} button(s) set.", buttons.len()),
            )
            .await
        }
        Ok(false) => reply(bot, msg, &format!("No draft #{id}.")).await,
        Err(e) => {
            warn!("/setbuttons {id} failed: {e}");
            reply(bot, msg, "Storage error.").await
        }
    }
}

async fn cmd_feeds(bot: &Bot, msg: &Message, state: &AppState) -> ResponseResult<()> {
    let feeds = match state.store.feeds() {
        Ok(f) => f,
        Err(e) => {
            warn!("/feeds failed: {e}");
            return reply(bot, msg, "Storage error.").await;
        }
    };
    if feeds.is_empty() {
        return reply(bot, msg, "No feeds. Add one with /addfeed <url>.").await;
    }
    let lines: Vec<String> = feeds
        .iter()
        .map(|f| {
            let mark = if f.active { "on " } else { "off" };
            format!(
                "<b>#{}</b> [{mark}] {}",
                f.id,
                escape_html(f.title.as_deref().unwrap_or(&f.url))
            )
        })
        .collect();
    reply_html(bot, msg, &lines.join("\n")).await
}

async fn cmd_addfeed(bot: &Bot, msg: &Message, state: &AppState, args: &str) -> ResponseResult<()> {
    let url = args.trim();
    if url.is_empty() || url::Url::parse(url).is_err() {
        return reply(bot, msg, "Usage: /addfeed <feed url>").await;
    }
    match state.store.add_feed(url, None) {
        Ok(id) => reply(bot, msg, &format!("Feed #{id} added.")).await,
        Err(e) => {
            warn!("/addfeed failed: {e}");
            reply(bot, msg, "Storage error.").await
        }
    }
}

async fn cmd_feed_toggle(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    args: &str,
    active: bool,
) -> ResponseResult<()> {
    let Some(id) = parse_id(args) else {
        let verb = if active { "feedon" } else { "feedoff" };
        return reply(bot, msg, &format!("Usage: /{verb} <feed id>")).await;
    };
    match state.store.set_feed_active(FeedId(id), active) {
        Ok(true) => {
            let what = if active { "enabled" } else { "disabled" };
            reply(bot, msg, &format!("Feed #{id} {what}.")).await
        }
        Ok(false) => reply(bot, msg, &format!("No feed #{id}.")).await,
        Err(e) => {
            warn!("feed toggle {id} failed: {e}");
            reply(bot, msg, "Storage error.").await
        }
    }
}

async fn cmd_bind(bot: &Bot, msg: &Message, state: &AppState, args: &str) -> ResponseResult<()> {
    let Ok(chat_id) = args.trim().parse::<i64>() else {
        return reply(bot, msg, "Usage: /bind <channel chat id>").await;
    };
    match state.store.bind_channel(chat_id) {
        Ok(()) => reply(bot, msg, &format!("Posting to {chat_id}.")).await,
        Err(e) => {
            warn!("/bind failed: {e}");
            reply(bot, msg, "Storage error.").await
        }
    }
}

// Used by the intake handler when staging media drafts.
pub(super) fn media_content_type(kind: cpb_core::messaging::types::MediaKind) -> ContentType {
    match kind {
        cpb_core::messaging::types::MediaKind::Photo => ContentType::Photo,
        cpb_core::messaging::types::MediaKind::Video => ContentType::Video,
        cpb_core::messaging::types::MediaKind::Document => ContentType::Document,
    }
}
