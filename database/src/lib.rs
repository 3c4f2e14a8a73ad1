mod migrations;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sociwave_core::{
    AppConfig, ConfigStore, CoreError, CycleStats, DatabaseError, Rule, RuleStore, StatsSink,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};

const KEY_ACCESS_TOKEN: &str = "accessToken";
const KEY_PAGE_ID: &str = "pageId";
const KEY_VERSION: &str = "version";
const KEY_USE_MOCK_DATA: &str = "useMockData";
const KEY_REELS_LIMIT: &str = "reelsLimit";
const KEY_COMMENTS_LIMIT: &str = "commentsLimit";
const KEY_REPLIES_LIMIT: &str = "repliesLimit";

#[derive(Debug, sqlx::FromRow)]
struct RuleRow {
    object_id: String,
    match_words: String,
    reply_message: String,
    inbox_message: Option<String>,
    enabled: bool,
}

impl TryFrom<RuleRow> for Rule {
    type Error = CoreError;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        let match_words: Vec<String> = serde_json::from_str(&row.match_words).map_err(|e| {
            CoreError::Database(DatabaseError::CorruptRecord {
                table: "rules".to_string(),
                details: format!("match_words for {}: {}", row.object_id, e),
            })
        })?;

        Ok(Rule {
            object_id: row.object_id,
            match_words,
            reply_message: row.reply_message,
            inbox_message: row.inbox_message,
            enabled: row.enabled,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StatsRow {
    total_checks: i64,
    total_replies: i64,
    total_private_replies: i64,
    last_check_time: Option<i64>,
    last_error: Option<String>,
    last_error_code: Option<String>,
}

impl From<StatsRow> for CycleStats {
    fn from(row: StatsRow) -> Self {
        Self {
            total_checks: row.total_checks.max(0) as u64,
            total_replies: row.total_replies.max(0) as u64,
            total_private_replies: row.total_private_replies.max(0) as u64,
            last_check_time: row.last_check_time.and_then(from_millis),
            last_error: row.last_error,
            last_error_code: row.last_error_code,
        }
    }
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

fn corrupt_config(key: &str, value: &str) -> CoreError {
    CoreError::Database(DatabaseError::CorruptRecord {
        table: "config".to_string(),
        details: format!("{} = '{}'", key, value),
    })
}

fn parse_limit(values: &HashMap<String, String>, key: &str, default: u32) -> Result<u32, CoreError> {
    match values.get(key) {
        Some(raw) => raw.trim().parse().map_err(|_| corrupt_config(key, raw)),
        None => Ok(default),
    }
}

fn parse_flag(values: &HashMap<String, String>, key: &str) -> Result<bool, CoreError> {
    match values.get(key).map(|raw| raw.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(raw) => match raw.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" | "" => Ok(false),
            _ => Err(corrupt_config(key, &raw)),
        },
    }
}

/// SQLite-backed config, rule and stats storage.
pub struct Database {
    connection_string: String,
    pool: Option<SqlitePool>,
}

impl Database {
    pub fn new(connection_string: String) -> Self {
        Self {
            connection_string,
            pool: None,
        }
    }

    pub async fn connect(&mut self) -> Result<(), CoreError> {
        let options = SqliteConnectOptions::from_str(&self.connection_string)
            .map_err(|e| {
                CoreError::Database(DatabaseError::ConnectionFailed {
                    reason: format!("invalid database url '{}': {}", self.connection_string, e),
                })
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                CoreError::Database(DatabaseError::ConnectionFailed {
                    reason: e.to_string(),
                })
            })?;

        info!("Connected to database {}", self.connection_string);
        self.pool = Some(pool);
        Ok(())
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        migrations::run(self.pool()?).await
    }

    /// Connects and migrates in one step.
    pub async fn open(connection_string: impl Into<String>) -> Result<Self, CoreError> {
        let mut database = Self::new(connection_string.into());
        database.connect().await?;
        database.run_migrations().await?;
        Ok(database)
    }

    fn pool(&self) -> Result<&SqlitePool, CoreError> {
        self.pool.as_ref().ok_or_else(|| {
            CoreError::Database(DatabaseError::ConnectionFailed {
                reason: "database is not connected".to_string(),
            })
        })
    }

    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }

    pub async fn save_setting(&self, key: &str, value: &str) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO config (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().timestamp_millis())
        .execute(self.pool()?)
        .await?;
        Ok(())
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, CoreError> {
        let row = sqlx::query("SELECT value FROM config WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool()?)
            .await?;
        Ok(row.map(|row| row.try_get::<String, _>("value")).transpose()?)
    }

    async fn load_settings(&self) -> Result<HashMap<String, String>, CoreError> {
        let rows = sqlx::query("SELECT key, value FROM config")
            .fetch_all(self.pool()?)
            .await?;
        let mut values = HashMap::with_capacity(rows.len());
        for row in rows {
            values.insert(row.try_get("key")?, row.try_get("value")?);
        }
        Ok(values)
    }
}

#[async_trait]
impl ConfigStore for Database {
    async fn load_config(&self) -> Result<Option<AppConfig>, CoreError> {
        let values = self.load_settings().await?;
        if !values.contains_key(KEY_ACCESS_TOKEN) && !values.contains_key(KEY_PAGE_ID) {
            return Ok(None);
        }

        let defaults = AppConfig::default();
        let text = |key: &str, default: &str| {
            values
                .get(key)
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Some(AppConfig {
            access_token: text(KEY_ACCESS_TOKEN, ""),
            api_version: text(KEY_VERSION, &defaults.api_version),
            page_id: text(KEY_PAGE_ID, ""),
            use_mock_data: parse_flag(&values, KEY_USE_MOCK_DATA)?,
            reels_limit: parse_limit(&values, KEY_REELS_LIMIT, defaults.reels_limit)?,
            comments_limit: parse_limit(&values, KEY_COMMENTS_LIMIT, defaults.comments_limit)?,
            replies_limit: parse_limit(&values, KEY_REPLIES_LIMIT, defaults.replies_limit)?,
        }))
    }

    async fn save_config(&self, config: &AppConfig) -> Result<(), CoreError> {
        let entries = [
            (KEY_ACCESS_TOKEN, config.access_token.clone()),
            (KEY_PAGE_ID, config.page_id.clone()),
            (KEY_VERSION, config.api_version.clone()),
            (KEY_USE_MOCK_DATA, config.use_mock_data.to_string()),
            (KEY_REELS_LIMIT, config.reels_limit.to_string()),
            (KEY_COMMENTS_LIMIT, config.comments_limit.to_string()),
            (KEY_REPLIES_LIMIT, config.replies_limit.to_string()),
        ];

        let now = Utc::now().timestamp_millis();
        let mut tx = self.pool()?.begin().await?;
        for (key, value) in entries {
            sqlx::query(
                "INSERT INTO config (key, value, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(key)
            .bind(value)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!("Saved configuration for page {}", config.page_id);
        Ok(())
    }
}

#[async_trait]
impl RuleStore for Database {
    async fn load_rules(&self) -> Result<HashMap<String, Rule>, CoreError> {
        let rows: Vec<RuleRow> = sqlx::query_as(
            "SELECT object_id, match_words, reply_message, inbox_message, enabled FROM rules",
        )
        .fetch_all(self.pool()?)
        .await?;

        rows.into_iter()
            .map(|row| Rule::try_from(row).map(|rule| (rule.object_id.clone(), rule)))
            .collect()
    }

    async fn save_rule(&self, rule: &Rule) -> Result<(), CoreError> {
        let match_words = serde_json::to_string(&rule.match_words)?;
        sqlx::query(
            "INSERT INTO rules (object_id, match_words, reply_message, inbox_message, enabled, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(object_id) DO UPDATE SET
                match_words = excluded.match_words,
                reply_message = excluded.reply_message,
                inbox_message = excluded.inbox_message,
                enabled = excluded.enabled,
                updated_at = excluded.updated_at",
        )
        .bind(&rule.object_id)
        .bind(match_words)
        .bind(&rule.reply_message)
        .bind(rule.inbox_message.as_deref())
        .bind(rule.enabled)
        .bind(Utc::now().timestamp_millis())
        .execute(self.pool()?)
        .await?;

        debug!("Saved rule for {}", rule.object_id);
        Ok(())
    }

    async fn delete_rule(&self, object_id: &str) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM rules WHERE object_id = ?")
            .bind(object_id)
            .execute(self.pool()?)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl StatsSink for Database {
    async fn record_check(
        &self,
        at: DateTime<Utc>,
        error: Option<(&str, &str)>,
    ) -> Result<(), CoreError> {
        let (code, message) = match error {
            Some((code, message)) => (Some(code), Some(message)),
            None => (None, None),
        };
        sqlx::query(
            "UPDATE monitor_stats SET
                total_checks = total_checks + 1,
                last_check_time = ?,
                last_error = ?,
                last_error_code = ?
             WHERE id = 1",
        )
        .bind(at.timestamp_millis())
        .bind(message)
        .bind(code)
        .execute(self.pool()?)
        .await?;
        Ok(())
    }

    async fn record_reply(&self) -> Result<(), CoreError> {
        sqlx::query("UPDATE monitor_stats SET total_replies = total_replies + 1 WHERE id = 1")
            .execute(self.pool()?)
            .await?;
        Ok(())
    }

    async fn record_private_reply(&self) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE monitor_stats SET total_private_replies = total_private_replies + 1 WHERE id = 1",
        )
        .execute(self.pool()?)
        .await?;
        Ok(())
    }

    async fn load_stats(&self) -> Result<Option<CycleStats>, CoreError> {
        let row: Option<StatsRow> = sqlx::query_as(
            "SELECT total_checks, total_replies, total_private_replies, last_check_time, last_error, last_error_code
             FROM monitor_stats WHERE id = 1",
        )
        .fetch_optional(self.pool()?)
        .await?;
        Ok(row.map(CycleStats::from))
    }
}
