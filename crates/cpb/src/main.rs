use std::sync::Arc;

use teloxide::Bot;
use tokio_util::sync::CancellationToken;

use cpb_core::{
    config::Config, ingest::FeedWorker, publish::Publisher, schedule::ScheduleEngine, store::Store,
};
use cpb_store::Database;
use cpb_telegram::{
    router::{run_polling, AppState},
    TelegramSender,
};

#[tokio::main]
async fn main() -> Result<(), cpb_core::Error> {
    cpb_core::logging::init("cpb");

    let cfg = Arc::new(Config::load()?);
    let store: Arc<dyn Store> = Arc::new(Database::open(&cfg.data_dir.join("bot.db"))?);

    let bot = Bot::new(cfg.bot_token.clone());
    let sender = Arc::new(TelegramSender::new(bot.clone(), &cfg));
    let publisher = Arc::new(Publisher::new(cfg.clone(), store.clone(), sender.clone()));

    let cancel = CancellationToken::new();
    let feeds = Arc::new(FeedWorker::new(cfg.clone(), store.clone(), sender.clone())?);
    let feeds_task = feeds.spawn(cancel.child_token());
    let engine = Arc::new(ScheduleEngine::new(
        store.clone(),
        publisher.clone(),
        cfg.schedule_tick,
        cfg.schedule_batch,
    ));
    let engine_task = engine.spawn(cancel.child_token());

    let state = Arc::new(AppState::new(cfg, store, publisher, sender));
    run_polling(bot, state)
        .await
        .map_err(|e| cpb_core::Error::External(format!("telegram bot failed: {e}")))?;

    cancel.cancel();
    let _ = feeds_task.await;
    let _ = engine_task.await;
    Ok(())
}
