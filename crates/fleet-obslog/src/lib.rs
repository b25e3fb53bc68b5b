use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// A structured log sink that records to `tracing`, broadcasts to live
/// subscribers (admin-socket consumers), and optionally retains a bounded
/// in-memory history for late subscribers and REST backfill.
pub struct EventLog<T: Clone + Send + 'static> {
    tx: broadcast::Sender<T>,
    map_fn: Arc<dyn Fn(String) -> T + Send + Sync>,
    history: Option<Arc<RwLock<VecDeque<String>>>>,
    max_entries: usize,
}

impl<T: Clone + Send> EventLog<T> {
    /// Create a broadcast-only log (no retained history).
    pub fn new(
        tx: broadcast::Sender<T>,
        map_fn: impl Fn(String) -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            tx,
            map_fn: Arc::new(map_fn),
            history: None,
            max_entries: 0,
        }
    }

    /// Create a log that also retains the last `max_entries` entries.
    pub fn with_history(
        tx: broadcast::Sender<T>,
        map_fn: impl Fn(String) -> T + Send + Sync + 'static,
        max_entries: usize,
    ) -> Self {
        Self {
            tx,
            map_fn: Arc::new(map_fn),
            history: Some(Arc::new(RwLock::new(VecDeque::with_capacity(max_entries)))),
            max_entries,
        }
    }

    /// Format a timestamped entry, emit it via `tracing`, broadcast it, and
    /// append it to history if retained.
    pub fn record(&self, msg: impl Display) {
        let entry = format!("{} {}", chrono::Utc::now().format("%H:%M:%S%.3f"), msg);
        tracing::info!("{}", entry);
        if let Some(ref history) = self.history {
            if let Ok(mut entries) = history.write() {
                entries.push_back(entry.clone());
                while entries.len() > self.max_entries {
                    entries.pop_front();
                }
            }
        }
        // A lagging or absent subscriber is not an error — the bus has no
        // guaranteed-delivery contract, only best-effort fan-out.
        let _ = self.tx.send((self.map_fn)(entry));
    }

    /// Snapshot of retained history, oldest first. Empty if history isn't retained.
    pub fn history(&self) -> Vec<String> {
        match &self.history {
            Some(history) => history
                .read()
                .map(|h| h.iter().cloned().collect())
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.tx.subscribe()
    }
}
