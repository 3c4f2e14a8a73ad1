use serde::{Deserialize, Serialize};
use sociwave_core::{CoreError, GraphSettings};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub time_window: Duration,
    pub burst_allowance: u32,
    pub max_in_flight: usize,
}

impl RateLimitConfig {
    pub fn graph_page() -> Self {
        Self::from_settings(&GraphSettings::default())
    }

    pub fn from_settings(settings: &GraphSettings) -> Self {
        Self {
            max_requests: settings.max_requests.max(1),
            time_window: Duration::from_secs(settings.window_secs.max(1)),
            burst_allowance: settings.burst_allowance.max(1),
            max_in_flight: 4,
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_rate: f64, // tokens per second
}

impl TokenBucket {
    pub fn new(config: &RateLimitConfig) -> Self {
        let capacity = config.burst_allowance as f64;
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_rate: config.max_requests as f64 / config.time_window.as_secs_f64(),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;
    }

    /// Takes `tokens_needed` tokens, or returns how long to wait for them.
    pub async fn try_acquire(&self, tokens_needed: f64) -> Result<(), Duration> {
        let mut state = self.state.lock().await;
        self.refill(&mut state);

        if state.tokens >= tokens_needed {
            state.tokens -= tokens_needed;
            Ok(())
        } else {
            let missing = tokens_needed - state.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_rate))
        }
    }

    pub async fn available_tokens(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.tokens
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowStats {
    pub window_start: SystemTime,
    pub request_count: u32,
    pub rate_limited_responses: u32,
}

impl WindowStats {
    fn fresh() -> Self {
        Self {
            window_start: SystemTime::now(),
            request_count: 0,
            rate_limited_responses: 0,
        }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    bucket: TokenBucket,
    in_flight: Arc<Semaphore>,
    config: RateLimitConfig,
    window: Mutex<WindowStats>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            bucket: TokenBucket::new(&config),
            in_flight: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            window: Mutex::new(WindowStats::fresh()),
            config,
        }
    }

    /// Waits until both a concurrency slot and a bucket token are available.
    pub async fn acquire_permit(&self) -> Result<RateLimitPermit, CoreError> {
        let start_time = Instant::now();
        let permit = self
            .in_flight
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CoreError::Internal {
                message: "rate limiter closed".to_string(),
            })?;

        while let Err(wait_time) = self.bucket.try_acquire(1.0).await {
            tracing::debug!("Graph API budget exhausted, waiting {:?}", wait_time);
            sleep(wait_time).await;
        }

        {
            let mut window = self.window.lock().await;
            self.roll_window(&mut window);
            window.request_count += 1;
        }

        Ok(RateLimitPermit {
            _permit: permit,
            queue_wait_time: start_time.elapsed(),
        })
    }

    pub async fn record_rate_limited(&self) {
        let mut window = self.window.lock().await;
        self.roll_window(&mut window);
        window.rate_limited_responses += 1;
    }

    fn roll_window(&self, window: &mut WindowStats) {
        let age = SystemTime::now()
            .duration_since(window.window_start)
            .unwrap_or_default();
        if age >= self.config.time_window {
            *window = WindowStats::fresh();
        }
    }

    pub async fn status(&self) -> RateLimitStatus {
        let available_tokens = self.bucket.available_tokens().await;
        let mut window = self.window.lock().await;
        self.roll_window(&mut window);

        RateLimitStatus {
            available_tokens: available_tokens as u32,
            max_tokens: self.config.burst_allowance,
            requests_per_window: self.config.max_requests,
            window: window.clone(),
        }
    }
}

#[derive(Debug)]
pub struct RateLimitPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
    pub queue_wait_time: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub available_tokens: u32,
    pub max_tokens: u32,
    pub requests_per_window: u32,
    pub window: WindowStats,
}

impl RateLimitStatus {
    pub fn utilization_percentage(&self) -> f64 {
        let used = self.max_tokens.saturating_sub(self.available_tokens);
        used as f64 / self.max_tokens.max(1) as f64 * 100.0
    }

    pub fn is_near_limit(&self) -> bool {
        self.utilization_percentage() > 80.0
    }

    pub fn requests_remaining_in_window(&self) -> u32 {
        self.requests_per_window
            .saturating_sub(self.window.request_count)
    }
}
