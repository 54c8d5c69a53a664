//! Telegram adapter (teloxide).
//!
//! Implements the `cpb-core` PostSender port over the Telegram Bot API and
//! hosts the operator-facing bot (commands, callbacks, draft intake).

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{
        InlineKeyboardButton, InlineKeyboardMarkup, InputFile, InputMedia, InputMediaDocument,
        InputMediaPhoto, InputMediaVideo, ParseMode,
    },
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use cpb_core::{
    config::Config,
    domain::ChatId,
    errors::Error,
    messaging::{
        port::PostSender,
        types::{AlbumItem, Keyboard, MediaKind, MediaRef},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramSender {
    bot: Bot,
    silent: bool,
    disable_preview: bool,
}

impl TelegramSender {
    pub fn new(bot: Bot, cfg: &Config) -> Self {
        Self {
            bot,
            silent: cfg.default_silent,
            disable_preview: cfg.disable_link_preview,
        }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

/// An http(s) reference is fetched by Telegram; anything else is treated
/// as a file_id obtained from a previous upload.
fn input_file(media: &MediaRef) -> InputFile {
    if media.is_url() {
        if let Ok(url) = url::Url::parse(&media.0) {
            return InputFile::url(url);
        }
    }
    InputFile::file_id(media.0.clone())
}

/// Inline keyboard of URL buttons, two per row. Buttons whose URL fails
/// to parse are skipped; an all-invalid keyboard collapses to none.
fn keyboard_markup(keyboard: &Keyboard) -> Option<InlineKeyboardMarkup> {
    let buttons: Vec<InlineKeyboardButton> = keyboard
        .buttons
        .iter()
        .filter_map(|b| {
            let url = url::Url::parse(&b.url).ok()?;
            Some(InlineKeyboardButton::url(b.label.clone(), url))
        })
        .collect();
    if buttons.is_empty() {
        return None;
    }
    let rows: Vec<Vec<InlineKeyboardButton>> =
        buttons.chunks(2).map(|pair| pair.to_vec()).collect();
    Some(InlineKeyboardMarkup::new(rows))
}

fn album_media(items: &[AlbumItem], caption_first: Option<&str>) -> Vec<InputMedia> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let file = input_file(&item.media);
            let caption = if i == 0 { caption_first } else { None };
            match item.kind {
                MediaKind::Photo => {
                    let mut m = InputMediaPhoto::new(file);
                    if let Some(c) = caption {
                        m = m.caption(c.to_string()).parse_mode(ParseMode::Html);
                    }
                    InputMedia::Photo(m)
                }
                MediaKind::Video => {
                    let mut m = InputMediaVideo::new(file);
                    if let Some(c) = caption {
                        m = m.caption(c.to_string()).parse_mode(ParseMode::Html);
                    }
                    InputMedia::Video(m)
                }
                MediaKind::Document => {
                    let mut m = InputMediaDocument::new(file);
                    if let Some(c) = caption {
                        m = m.caption(c.to_string()).parse_mode(ParseMode::Html);
                    }
                    InputMedia::Document(m)
                }
            }
        })
        .collect()
}

#[async_trait]
impl PostSender for TelegramSender {
    async fn send_text(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<()> {
        let markup = keyboard.and_then(keyboard_markup);
        self.with_retry(|| {
            let mut req = self
                .bot
                .send_message(Self::tg_chat(chat_id), html.to_string())
                .parse_mode(ParseMode::Html)
                .disable_web_page_preview(self.disable_preview)
                .disable_notification(self.silent);
            if let Some(kb) = &markup {
                req = req.reply_markup(kb.clone());
            }
            req
        })
        .await?;
        Ok(())
    }

    async fn send_media(
        &self,
        chat_id: ChatId,
        kind: MediaKind,
        media: &MediaRef,
        caption: Option<&str>,
        keyboard: Option<&Keyboard>,
    ) -> Result<()> {
        let chat = Self::tg_chat(chat_id);
        let markup = keyboard.and_then(keyboard_markup);
        match kind {
            MediaKind::Photo => {
                self.with_retry(|| {
                    let mut req = self
                        .bot
                        .send_photo(chat, input_file(media))
                        .disable_notification(self.silent);
                    if let Some(c) = caption {
                        req = req.caption(c.to_string()).parse_mode(ParseMode::Html);
                    }
                    if let Some(kb) = &markup {
                        req = req.reply_markup(kb.clone());
                    }
                    req
                })
                .await?;
            }
            MediaKind::Video => {
                self.with_retry(|| {
                    let mut req = self
                        .bot
                        .send_video(chat, input_file(media))
                        .disable_notification(self.silent);
                    if let Some(c) = caption {
                        req = req.caption(c.to_string()).parse_mode(ParseMode::Html);
                    }
                    if let Some(kb) = &markup {
                        req = req.reply_markup(kb.clone());
                    }
                    req
                })
                .await?;
            }
            MediaKind::Document => {
                self.with_retry(|| {
                    let mut req = self
                        .bot
                        .send_document(chat, input_file(media))
                        .disable_notification(self.silent);
                    if let Some(c) = caption {
                        req = req.caption(c.to_string()).parse_mode(ParseMode::Html);
                    }
                    if let Some(kb) = &markup {
                        req = req.reply_markup(kb.clone());
                    }
                    req
                })
                .await?;
            }
        }
        Ok(())
    }

    async fn send_media_group(
        &self,
        chat_id: ChatId,
        items: &[AlbumItem],
        caption_first: Option<&str>,
    ) -> Result<()> {
        let media = album_media(items, caption_first);
        self.with_retry(|| {
            self.bot
                .send_media_group(Self::tg_chat(chat_id), media.clone())
                .disable_notification(self.silent)
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpb_core::messaging::types::LinkButton;

    fn kb(specs: &[(&str, &str)]) -> Keyboard {
        Keyboard {
            buttons: specs
                .iter()
                .map(|(l, u)| LinkButton {
                    label: l.to_string(),
                    url: u.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn keyboard_packs_two_buttons_per_row() {
        let markup = keyboard_markup(&kb(&[
            ("A", "https://e/a"),
            ("B", "https://e/b"),
            ("C", "https://e/c"),
        ]))
        .unwrap();
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
        assert_eq!(markup.inline_keyboard[1].len(), 1);
    }

    #[test]
    fn keyboard_drops_unparseable_urls() {
        let markup = keyboard_markup(&kb(&[("bad", "not a url"), ("ok", "https://e/x")])).unwrap();
        assert_eq!(markup.inline_keyboard.len(), 1);
        assert_eq!(markup.inline_keyboard[0].len(), 1);

        assert!(keyboard_markup(&kb(&[("bad", "::nope::")])).is_none());
    }

    #[test]
    fn album_caption_rides_on_first_item_only() {
        let items = vec![
            AlbumItem {
                kind: MediaKind::Photo,
                media: MediaRef("f1".to_string()),
            },
            AlbumItem {
                kind: MediaKind::Video,
                media: MediaRef("f2".to_string()),
            },
        ];
        let media = album_media(&items, Some("cap"));
        assert_eq!(media.len(), 2);
        match &media[0] {
            InputMedia::Photo(p) => assert_eq!(p.caption.as_deref(), Some("cap")),
            other => panic!("unexpected media: {other:?}"),
        }
        match &media[1] {
            InputMedia::Video(v) => assert!(v.caption.is_none()),
            other => panic!("unexpected media: {other:?}"),
        }
    }
}
