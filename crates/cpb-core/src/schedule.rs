//! Schedule engine: polls for due slots and drives the publisher.
//!
//! Polling (instead of per-slot timers) tolerates process restarts at the
//! cost of bounded latency. Each slot is claimed with a conditional update
//! so a concurrent manual publish can never double-post.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::publish::Publisher;
use crate::store::{SlotStatus, Store};
use crate::Result;

pub struct ScheduleEngine {
    store: Arc<dyn Store>,
    publisher: Arc<Publisher>,
    tick: Duration,
    batch: u32,
}

impl ScheduleEngine {
    pub fn new(
        store: Arc<dyn Store>,
        publisher: Arc<Publisher>,
        tick: Duration,
        batch: u32,
    ) -> Self {
        Self {
            store,
            publisher,
            tick,
            batch,
        }
    }

    /// Spawn the periodic loop. Ticks never overlap, and a failed tick is
    /// logged and swallowed so the interval is never broken.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.tick);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("schedule engine started (tick {:?})", self.tick);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        if let Err(e) = self.tick_once().await {
                            warn!("schedule tick failed: {e}");
                        }
                    }
                }
            }
        })
    }

    /// Process one batch of due slots.
    pub async fn tick_once(&self) -> Result<()> {
        let now = Local::now().naive_local();
        let due = self.store.due_slots(now, self.batch)?;
        if due.is_empty() {
            return Ok(());
        }
        debug!("{} due slot(s)", due.len());

        for slot in due {
            // Lost the claim: another actor got there first.
            if !self.store.claim_slot(slot.id)? {
                continue;
            }

            let ok = match self.publisher.publish(slot.draft_id).await {
                Ok(v) => v,
                Err(e) => {
                    warn!("slot {}: publish error: {e}", slot.id);
                    false
                }
            };

            // Failed slots are canceled, never retried; operators
            // re-schedule by hand.
            let status = if ok { SlotStatus::Done } else { SlotStatus::Canceled };
            self.store.finish_slot(slot.id, status)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use crate::store::{ContentType, NewDraft};
    use crate::testutil::{MemoryStore, RecordingSender};
    use chrono::Duration as ChronoDuration;

    fn engine(
        store: Arc<MemoryStore>,
        sender: Arc<RecordingSender>,
    ) -> ScheduleEngine {
        let cfg = Arc::new(test_config());
        let publisher = Arc::new(Publisher::new(cfg, store.clone(), sender));
        ScheduleEngine::new(store, publisher, Duration::from_secs(10), 50)
    }

    fn draft(store: &MemoryStore, text: &str) -> crate::domain::DraftId {
        store
            .insert_draft(NewDraft {
                author_id: 10,
                content_type: ContentType::Text,
                text: Some(text.to_string()),
                ..Default::default()
            })
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn due_slot_is_published_and_marked_done() {
        let store = Arc::new(MemoryStore::new());
        let sender = Arc::new(RecordingSender::new());
        let eng = engine(store.clone(), sender.clone());

        let id = draft(&store, "post");
        let past = Local::now().naive_local() - ChronoDuration::minutes(1);
        let sid = store.schedule_draft(id, past).unwrap();

        eng.tick_once().await.unwrap();

        assert_eq!(store.slot_status(sid), Some(SlotStatus::Done));
        assert_eq!(
            store.draft_status(id),
            Some(crate::store::DraftStatus::Published)
        );
        assert_eq!(sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn future_slot_is_left_alone() {
        let store = Arc::new(MemoryStore::new());
        let sender = Arc::new(RecordingSender::new());
        let eng = engine(store.clone(), sender.clone());

        let id = draft(&store, "later");
        let future = Local::now().naive_local() + ChronoDuration::hours(1);
        let sid = store.schedule_draft(id, future).unwrap();

        eng.tick_once().await.unwrap();

        assert_eq!(store.slot_status(sid), Some(SlotStatus::Pending));
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn failed_publish_cancels_slot_without_retry() {
        let store = Arc::new(MemoryStore::new());
        let sender = Arc::new(RecordingSender::failing_from(0));
        let eng = engine(store.clone(), sender.clone());

        let id = draft(&store, "doomed");
        let past = Local::now().naive_local() - ChronoDuration::minutes(1);
        let sid = store.schedule_draft(id, past).unwrap();

        eng.tick_once().await.unwrap();
        assert_eq!(store.slot_status(sid), Some(SlotStatus::Canceled));

        // A second tick finds nothing to do.
        eng.tick_once().await.unwrap();
        assert_eq!(store.slot_status(sid), Some(SlotStatus::Canceled));
    }

    #[tokio::test]
    async fn manual_publish_before_tick_leaves_a_noop_slot() {
        let store = Arc::new(MemoryStore::new());
        let sender = Arc::new(RecordingSender::new());
        let cfg = Arc::new(test_config());
        let publisher = Arc::new(Publisher::new(cfg, store.clone(), sender.clone()));
        let eng = ScheduleEngine::new(
            store.clone(),
            publisher.clone(),
            Duration::from_secs(10),
            50,
        );

        let id = draft(&store, "race");
        let past = Local::now().naive_local() - ChronoDuration::minutes(1);
        let sid = store.schedule_draft(id, past).unwrap();

        // Operator hits "publish now" before the engine tick fires.
        assert!(publisher.publish(id).await.unwrap());
        assert_eq!(sender.sent().len(), 1);

        // The stale slot fires later: claimed, found already published,
        // finished as done, and nothing is sent twice.
        eng.tick_once().await.unwrap();
        assert_eq!(store.slot_status(sid), Some(SlotStatus::Done));
        assert_eq!(sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn slot_leaves_pending_at_most_once_under_concurrent_claims() {
        let store = Arc::new(MemoryStore::new());
        let id = draft(&store, "claimed");
        let past = Local::now().naive_local() - ChronoDuration::minutes(1);
        let sid = store.schedule_draft(id, past).unwrap();

        let mut claims = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            claims.push(tokio::spawn(async move { store.claim_slot(sid).unwrap() }));
        }
        let mut won = 0;
        for c in claims {
            if c.await.unwrap() {
                won += 1;
            }
        }
        assert_eq!(won, 1);
    }

    #[tokio::test]
    async fn batch_preserves_run_at_then_id_order() {
        let store = Arc::new(MemoryStore::new());
        let sender = Arc::new(RecordingSender::new());
        let eng = engine(store.clone(), sender.clone());

        let now = Local::now().naive_local();
        let d1 = draft(&store, "one");
        let d2 = draft(&store, "two");
        let d3 = draft(&store, "three");
        store.schedule_draft(d2, now - ChronoDuration::minutes(5)).unwrap();
        store.schedule_draft(d3, now - ChronoDuration::minutes(5)).unwrap();
        store.schedule_draft(d1, now - ChronoDuration::minutes(10)).unwrap();

        eng.tick_once().await.unwrap();

        let texts: Vec<String> = sender
            .sent()
            .iter()
            .map(|s| match s {
                crate::testutil::Sent::Text { html, .. } => html.clone(),
                other => panic!("unexpected send: {other:?}"),
            })
            .collect();
        assert!(texts[0].starts_with("one"));
        assert!(texts[1].starts_with("two"));
        assert!(texts[2].starts_with("three"));
    }
}
