use crate::cycle::{CycleResult, MonitoringCycle};
use serde::Serialize;
use sociwave_core::{CoreError, CycleStats, DEFAULT_INTERVAL_SECS, MIN_INTERVAL_SECS};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Stopped,
    Running,
}

struct RunningLoop {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct SchedulerInner {
    interval: Duration,
    running: Option<RunningLoop>,
}

/// Clears the in-flight flag even if the cycle future is dropped midway.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Shared trigger path for ticks, the start-up cycle and manual runs.
struct CycleRunner {
    cycle: Arc<MonitoringCycle>,
    in_flight: AtomicBool,
    skipped: AtomicU64,
}

impl CycleRunner {
    async fn run(&self) -> Option<CycleResult> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let skipped = self.skipped.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(
                "Cycle already in flight, skipping trigger ({} skipped so far)",
                skipped
            );
            return None;
        }

        let _guard = InFlightGuard(&self.in_flight);
        Some(self.cycle.run().await)
    }
}

/// Periodic driver for one page's monitoring cycle.
pub struct Scheduler {
    runner: Arc<CycleRunner>,
    inner: Mutex<SchedulerInner>,
}

fn check_interval(interval: Duration) -> Result<(), CoreError> {
    if interval < Duration::from_secs(MIN_INTERVAL_SECS) {
        return Err(CoreError::InvalidInterval {
            requested_secs: interval.as_secs(),
            minimum_secs: MIN_INTERVAL_SECS,
        });
    }
    Ok(())
}

impl Scheduler {
    pub fn new(cycle: Arc<MonitoringCycle>) -> Self {
        Self {
            runner: Arc::new(CycleRunner {
                cycle,
                in_flight: AtomicBool::new(false),
                skipped: AtomicU64::new(0),
            }),
            inner: Mutex::new(SchedulerInner {
                interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
                running: None,
            }),
        }
    }

    /// Validates the interval and the stored config, runs one cycle right
    /// away, then keeps running one every `interval`.
    ///
    /// The loop is armed before the first cycle and the lock is released, so
    /// `state` and `stop` answer while that cycle runs. A tick landing during
    /// it is skipped like any other overlap.
    pub async fn start(&self, interval: Duration) -> Result<(), CoreError> {
        check_interval(interval)?;

        {
            let mut inner = self.inner.lock().await;
            if inner.running.is_some() {
                debug!("Scheduler already running");
                return Ok(());
            }

            self.runner.cycle.load_config().await?;
            inner.interval = interval;
            inner.running = Some(self.spawn_loop(interval));
        }

        info!("Starting monitoring every {}s", interval.as_secs());
        self.runner.run().await;
        Ok(())
    }

    /// Stops the periodic loop. A cycle already in progress finishes first.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        match inner.running.take() {
            Some(running) => {
                Self::halt(running).await;
                info!("Monitoring stopped");
            }
            None => warn!("Stop requested but the scheduler is not running"),
        }
    }

    pub async fn set_interval(&self, interval: Duration) -> Result<(), CoreError> {
        check_interval(interval)?;

        let mut inner = self.inner.lock().await;
        inner.interval = interval;
        if let Some(running) = inner.running.take() {
            Self::halt(running).await;
            inner.running = Some(self.spawn_loop(interval));
            info!("Monitoring interval changed to {}s", interval.as_secs());
        } else {
            debug!(
                "Monitoring interval set to {}s for the next start",
                interval.as_secs()
            );
        }
        Ok(())
    }

    /// Runs a cycle now unless one is already in flight.
    pub async fn run_now(&self) -> Option<CycleResult> {
        self.runner.run().await
    }

    pub async fn state(&self) -> SchedulerState {
        if self.inner.lock().await.running.is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    pub async fn interval(&self) -> Duration {
        self.inner.lock().await.interval
    }

    pub fn stats(&self) -> CycleStats {
        self.runner.cycle.stats().snapshot()
    }

    pub fn subscribe_stats(&self) -> watch::Receiver<CycleStats> {
        self.runner.cycle.stats().subscribe()
    }

    /// Triggers dropped because a cycle was already running.
    pub fn skipped_triggers(&self) -> u64 {
        self.runner.skipped.load(Ordering::Relaxed)
    }

    async fn halt(running: RunningLoop) {
        let _ = running.stop.send(true);
        if let Err(e) = running.handle.await {
            warn!("Monitoring loop ended abnormally: {}", e);
        }
    }

    fn spawn_loop(&self, interval: Duration) -> RunningLoop {
        let (stop, mut stop_rx) = watch::channel(false);
        let runner = Arc::clone(&self.runner);
        let first_tick = Instant::now() + interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(first_tick, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        runner.run().await;
                    }
                }
            }
            debug!("Monitoring loop exited");
        });

        RunningLoop { stop, handle }
    }
}
