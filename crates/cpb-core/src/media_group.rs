//! Album assembly: collapses a burst of co-arriving media messages sharing
//! a group id into one ordered batch, emitted exactly once.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::sleep;

/// Debounce buffer for multi-message media groups.
///
/// Only the *first* message of a group starts the debounce wait and, once
/// the window elapses, receives the whole accumulated batch in arrival
/// order. Every later call for the same open group appends its item and
/// returns empty immediately. After a flush the group id is brand-new
/// again; sources do not reuse group ids within one logical album.
pub struct MediaGroupBuffer<T> {
    window: Duration,
    state: Mutex<BufferState<T>>,
}

struct BufferState<T> {
    storage: HashMap<String, Vec<T>>,
    pending: HashSet<String>,
}

impl<T: Send> MediaGroupBuffer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new(BufferState {
                storage: HashMap::new(),
                pending: HashSet::new(),
            }),
        }
    }

    /// Add one item; the first caller per window gets the full batch back.
    ///
    /// The state lock is held only around map mutation, never across the
    /// debounce sleep, so unrelated groups proceed in parallel.
    pub async fn add_and_collect(&self, group_id: &str, item: T) -> Vec<T> {
        let is_first = {
            let mut st = self.state.lock().await;
            st.storage.entry(group_id.to_string()).or_default().push(item);
            st.pending.insert(group_id.to_string())
        };

        if !is_first {
            return Vec::new();
        }

        sleep(self.window).await;

        let mut st = self.state.lock().await;
        st.pending.remove(group_id);
        st.storage.remove(group_id).unwrap_or_default()
    }
}
