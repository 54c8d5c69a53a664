use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio::sync::Mutex;
use tracing::info;

use cpb_core::{
    config::Config,
    domain::DraftId,
    media_group::MediaGroupBuffer,
    messaging::types::{MediaKind, MediaRef},
    publish::Publisher,
    store::Store,
};

use crate::handlers;
use crate::TelegramSender;

/// One buffered album element with its caption, if it carried one.
#[derive(Clone, Debug)]
pub struct AlbumPart {
    pub kind: MediaKind,
    pub media: MediaRef,
    pub caption: Option<String>,
}

/// Follow-up input the bot is waiting for from an operator.
#[derive(Clone, Copy, Debug)]
pub enum Pending {
    ScheduleTime(DraftId),
    ReplaceMedia(DraftId),
}

pub struct AppState {
    pub cfg: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub publisher: Arc<Publisher>,
    pub sender: Arc<TelegramSender>,
    pub albums: Arc<MediaGroupBuffer<AlbumPart>>,
    /// Keyed by operator user id.
    pub pending: Mutex<HashMap<i64, Pending>>,
}

impl AppState {
    pub fn new(
        cfg: Arc<Config>,
        store: Arc<dyn Store>,
        publisher: Arc<Publisher>,
        sender: Arc<TelegramSender>,
    ) -> Self {
        let albums = Arc::new(MediaGroupBuffer::new(cfg.media_group_window));
        Self {
            cfg,
            store,
            publisher,
            sender,
            albums,
            pending: Mutex::new(HashMap::new()),
        }
    }
}

pub async fn run_polling(bot: Bot, state: Arc<AppState>) -> anyhow::Result<()> {
    if let Ok(me) = bot.get_me().await {
        info!("bot started: @{}", me.username());
    }

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
