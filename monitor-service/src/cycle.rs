use crate::dedup::DedupTracker;
use crate::matcher::matches;
use crate::stats::StatsRecorder;
use chrono::Utc;
use serde::Serialize;
use sociwave_core::{
    AppConfig, Comment, ConfigError, ConfigStore, CoreError, ErrorClass, ErrorExt, ErrorReporter,
    GraphGateway, PageScope, Rule, RuleStore, DEFAULT_DEDUP_CAPACITY,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed,
    NoEnabledRules,
    Failed,
}

/// A failure that ended the whole cycle early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleError {
    pub code: String,
    pub message: String,
}

/// A per-reel or per-comment failure; the cycle carried on past it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingError {
    pub reel_id: String,
    pub comment_id: Option<String>,
    pub code: String,
    pub message: String,
}

impl CycleError {
    fn from_error(error: &CoreError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.user_friendly_message(),
        }
    }
}

impl ProcessingError {
    fn new(reel_id: &str, comment_id: Option<&str>, error: &CoreError) -> Self {
        Self {
            reel_id: reel_id.to_string(),
            comment_id: comment_id.map(str::to_string),
            code: error.error_code().to_string(),
            message: error.user_friendly_message(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleResult {
    pub outcome: CycleOutcome,
    pub reels_fetched: usize,
    pub reels_processed: usize,
    pub comments_scanned: usize,
    pub comments_matched: usize,
    pub replies_sent: usize,
    pub private_replies_sent: usize,
    pub private_replies_rejected: usize,
    pub api_calls: usize,
    pub duration: Duration,
    pub errors: Vec<ProcessingError>,
    pub cycle_error: Option<CycleError>,
}

impl CycleResult {
    fn new() -> Self {
        Self {
            outcome: CycleOutcome::Completed,
            reels_fetched: 0,
            reels_processed: 0,
            comments_scanned: 0,
            comments_matched: 0,
            replies_sent: 0,
            private_replies_sent: 0,
            private_replies_rejected: 0,
            api_calls: 0,
            duration: Duration::ZERO,
            errors: Vec::new(),
            cycle_error: None,
        }
    }

    /// `(code, message)` of the error that should become `last_error`.
    pub fn last_error(&self) -> Option<(&str, &str)> {
        if let Some(error) = &self.cycle_error {
            return Some((error.code.as_str(), error.message.as_str()));
        }
        self.errors
            .last()
            .map(|error| (error.code.as_str(), error.message.as_str()))
    }

    pub fn is_clean(&self) -> bool {
        self.cycle_error.is_none() && self.errors.is_empty()
    }
}

/// One pass over every reel that has an active rule.
pub struct MonitoringCycle {
    config_store: Arc<dyn ConfigStore>,
    rule_store: Arc<dyn RuleStore>,
    gateway: Arc<dyn GraphGateway>,
    stats: Arc<StatsRecorder>,
    dedup: Mutex<DedupTracker>,
    reporter: ErrorReporter,
}

impl MonitoringCycle {
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        rule_store: Arc<dyn RuleStore>,
        gateway: Arc<dyn GraphGateway>,
        stats: Arc<StatsRecorder>,
    ) -> Self {
        Self {
            config_store,
            rule_store,
            gateway,
            stats,
            dedup: Mutex::new(DedupTracker::new(DEFAULT_DEDUP_CAPACITY)),
            reporter: ErrorReporter::new(),
        }
    }

    pub fn with_dedup_capacity(self, capacity: usize) -> Self {
        Self {
            dedup: Mutex::new(DedupTracker::new(capacity)),
            ..self
        }
    }

    pub fn stats(&self) -> &Arc<StatsRecorder> {
        &self.stats
    }

    /// Loads the stored config and checks that it is usable.
    pub async fn load_config(&self) -> Result<AppConfig, CoreError> {
        let config = self
            .config_store
            .load_config()
            .await?
            .ok_or(ConfigError::NotConfigured)?;
        config.validate()?;
        Ok(config)
    }

    /// Runs one cycle. Failures are recorded in the result and the stats,
    /// never returned.
    pub async fn run(&self) -> CycleResult {
        let started = Instant::now();
        let mut result = CycleResult::new();

        match self.execute(&mut result).await {
            Ok(outcome) => result.outcome = outcome,
            Err(error) => {
                self.reporter.report(&error);
                result.outcome = CycleOutcome::Failed;
                result.cycle_error = Some(CycleError::from_error(&error));
            }
        }
        result.duration = started.elapsed();

        self.stats.record_cycle(Utc::now(), result.last_error()).await;

        info!(
            outcome = ?result.outcome,
            reels_fetched = result.reels_fetched,
            reels_processed = result.reels_processed,
            comments = result.comments_scanned,
            replies = result.replies_sent,
            inbox = result.private_replies_sent,
            errors = result.errors.len(),
            api_calls = result.api_calls,
            duration_ms = result.duration.as_millis() as u64,
            "Monitoring cycle finished"
        );
        result
    }

    async fn execute(&self, result: &mut CycleResult) -> Result<CycleOutcome, CoreError> {
        let config = self.load_config().await?;
        let scope = config.scope()?;

        let rules: HashMap<String, Rule> = self
            .rule_store
            .load_rules()
            .await?
            .into_iter()
            .filter(|(_, rule)| rule.is_active())
            .collect();
        if rules.is_empty() {
            info!("No enabled rules, skipping Graph API calls");
            return Ok(CycleOutcome::NoEnabledRules);
        }

        result.api_calls += 1;
        let reels = self.gateway.get_reels(&scope, config.reels_limit).await?;
        result.reels_fetched = reels.len();

        for reel in &reels {
            let Some(rule) = rules.get(&reel.id) else {
                debug!("No rule for reel {}", reel.id);
                continue;
            };
            result.reels_processed += 1;

            result.api_calls += 1;
            let comments = match self
                .gateway
                .get_comments(
                    &scope,
                    &reel.id,
                    config.comments_limit,
                    config.replies_limit,
                )
                .await
            {
                Ok(comments) => comments,
                Err(error) => {
                    self.reporter.report(&error);
                    result
                        .errors
                        .push(ProcessingError::new(&reel.id, None, &error));
                    continue;
                }
            };

            for comment in &comments {
                result.comments_scanned += 1;
                if let Err(error) = self.process_comment(&scope, rule, comment, result).await {
                    self.reporter.report(&error);
                    result.errors.push(ProcessingError::new(
                        &reel.id,
                        Some(&comment.id),
                        &error,
                    ));
                }
            }
        }

        Ok(CycleOutcome::Completed)
    }

    async fn process_comment(
        &self,
        scope: &PageScope,
        rule: &Rule,
        comment: &Comment,
        result: &mut CycleResult,
    ) -> Result<(), CoreError> {
        if comment.is_authored_by(&scope.page_id) {
            debug!("Skipping comment {}: written by the page", comment.id);
            return Ok(());
        }
        if DedupTracker::has_page_replied(comment, &scope.page_id) {
            debug!("Skipping comment {}: page already replied", comment.id);
            return Ok(());
        }
        if comment.replies_truncated() {
            result.api_calls += 1;
            match self.gateway.has_page_replied(scope, &comment.id).await {
                Ok(true) => {
                    debug!(
                        "Skipping comment {}: page reply found in full thread",
                        comment.id
                    );
                    return Ok(());
                }
                Ok(false) => {}
                Err(error) => debug!(
                    "Thread check for comment {} failed, treating as not replied: {}",
                    comment.id, error
                ),
            }
        }
        if self.already_tracked(&comment.id) {
            debug!("Skipping comment {}: replied earlier by this process", comment.id);
            return Ok(());
        }
        if !matches(rule, &comment.message) {
            debug!("Skipping comment {}: no keyword match", comment.id);
            return Ok(());
        }
        result.comments_matched += 1;

        result.api_calls += 1;
        self.gateway
            .post_reply(scope, &comment.id, &rule.reply_message)
            .await?;
        result.replies_sent += 1;
        self.track(&comment.id);
        self.stats.record_reply().await;
        info!("Replied to comment {} on {}", comment.id, rule.object_id);

        if let Some(message) = rule.private_message() {
            result.api_calls += 1;
            match self
                .gateway
                .post_private_reply(scope, &comment.id, message)
                .await
            {
                Ok(()) => {
                    result.private_replies_sent += 1;
                    self.stats.record_private_reply().await;
                }
                Err(error) if error.classify() == ErrorClass::PrivateReplyRejected => {
                    warn!(
                        "Private reply for comment {} rejected: {}",
                        comment.id, error
                    );
                    result.private_replies_rejected += 1;
                }
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    fn already_tracked(&self, comment_id: &str) -> bool {
        self.dedup
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .has_replied(comment_id)
    }

    fn track(&self, comment_id: &str) {
        self.dedup
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .mark_replied(comment_id);
    }
}
