use chrono::{DateTime, Utc};
use sociwave_core::{CycleStats, StatsSink};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// In-memory monitoring counters, published to watchers on every change and
/// mirrored to an optional persistent sink.
pub struct StatsRecorder {
    sink: Option<Arc<dyn StatsSink>>,
    sender: watch::Sender<CycleStats>,
}

impl StatsRecorder {
    pub fn new(sink: Option<Arc<dyn StatsSink>>) -> Self {
        let (sender, _receiver) = watch::channel(CycleStats::default());
        Self { sink, sender }
    }

    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// Seeds the snapshot from the sink, if it holds earlier counters.
    pub async fn restore(&self) {
        let Some(sink) = &self.sink else {
            return;
        };
        match sink.load_stats().await {
            Ok(Some(stats)) => {
                debug!(
                    "Restored stats: {} checks, {} replies",
                    stats.total_checks, stats.total_replies
                );
                self.sender.send_replace(stats);
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to restore monitoring stats: {}", e),
        }
    }

    /// Counts one finished cycle. `error` is `(code, message)` of the
    /// failure to surface, or `None` to clear the last error.
    pub async fn record_cycle(&self, at: DateTime<Utc>, error: Option<(&str, &str)>) {
        self.sender.send_modify(|stats| {
            stats.total_checks += 1;
            stats.last_check_time = Some(at);
            stats.last_error_code = error.map(|(code, _)| code.to_string());
            stats.last_error = error.map(|(_, message)| message.to_string());
        });

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.record_check(at, error).await {
                warn!("Failed to persist cycle stats: {}", e);
            }
        }
    }

    pub async fn record_reply(&self) {
        self.sender.send_modify(|stats| stats.total_replies += 1);

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.record_reply().await {
                warn!("Failed to persist reply count: {}", e);
            }
        }
    }

    pub async fn record_private_reply(&self) {
        self.sender.send_modify(|stats| stats.total_private_replies += 1);

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.record_private_reply().await {
                warn!("Failed to persist private reply count: {}", e);
            }
        }
    }

    pub fn snapshot(&self) -> CycleStats {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CycleStats> {
        self.sender.subscribe()
    }
}

impl std::fmt::Debug for StatsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsRecorder")
            .field("persistent", &self.sink.is_some())
            .field("stats", &*self.sender.borrow())
            .finish()
    }
}
