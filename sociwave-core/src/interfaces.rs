//! Collaborator contracts consumed by the monitoring core.
//!
//! Storage and the Graph API are reached only through these traits so the
//! cycle can run against SQLite and the live API in production and against
//! in-memory doubles in tests.

use crate::{AppConfig, Comment, CoreError, CycleStats, PageInfo, PageScope, Reel, Rule};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load_config(&self) -> Result<Option<AppConfig>, CoreError>;

    async fn save_config(&self, config: &AppConfig) -> Result<(), CoreError>;
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// All rules keyed by object id, enabled or not.
    async fn load_rules(&self) -> Result<HashMap<String, Rule>, CoreError>;

    async fn save_rule(&self, rule: &Rule) -> Result<(), CoreError>;

    async fn delete_rule(&self, object_id: &str) -> Result<(), CoreError>;
}

#[async_trait]
pub trait StatsSink: Send + Sync {
    async fn record_check(
        &self,
        at: DateTime<Utc>,
        error: Option<(&str, &str)>,
    ) -> Result<(), CoreError>;

    async fn record_reply(&self) -> Result<(), CoreError>;

    async fn record_private_reply(&self) -> Result<(), CoreError>;

    async fn load_stats(&self) -> Result<Option<CycleStats>, CoreError>;

    async fn load_last_check(&self) -> Result<Option<DateTime<Utc>>, CoreError> {
        Ok(self
            .load_stats()
            .await?
            .and_then(|stats| stats.last_check_time))
    }
}

/// Facebook Graph API operations used by the monitoring cycle.
///
/// The page scope travels with every call; implementations must not keep a
/// "current page".
#[async_trait]
pub trait GraphGateway: Send + Sync {
    async fn get_reels(&self, scope: &PageScope, limit: u32) -> Result<Vec<Reel>, CoreError>;

    /// Comments on `object_id`, each carrying up to `replies_limit` nested
    /// replies for reply detection.
    async fn get_comments(
        &self,
        scope: &PageScope,
        object_id: &str,
        limit: u32,
        replies_limit: u32,
    ) -> Result<Vec<Comment>, CoreError>;

    /// Thread-level check used when the nested replies were truncated.
    async fn has_page_replied(&self, scope: &PageScope, comment_id: &str)
        -> Result<bool, CoreError>;

    async fn post_reply(
        &self,
        scope: &PageScope,
        comment_id: &str,
        message: &str,
    ) -> Result<(), CoreError>;

    /// Private reply addressed by comment id rather than by user id.
    async fn post_private_reply(
        &self,
        scope: &PageScope,
        comment_id: &str,
        message: &str,
    ) -> Result<(), CoreError>;

    async fn get_page_info(&self, scope: &PageScope) -> Result<PageInfo, CoreError>;
}
