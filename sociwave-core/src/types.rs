use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_VERSION: &str = "v20.0";
pub const DEFAULT_REELS_LIMIT: u32 = 25;
pub const DEFAULT_COMMENTS_LIMIT: u32 = 100;
pub const DEFAULT_REPLIES_LIMIT: u32 = 100;

/// Facebook page configuration consumed by every monitoring cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub access_token: String,
    pub api_version: String,
    pub page_id: String,
    pub use_mock_data: bool,
    pub reels_limit: u32,
    pub comments_limit: u32,
    pub replies_limit: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            api_version: DEFAULT_API_VERSION.to_string(),
            page_id: String::new(),
            use_mock_data: false,
            reels_limit: DEFAULT_REELS_LIMIT,
            comments_limit: DEFAULT_COMMENTS_LIMIT,
            replies_limit: DEFAULT_REPLIES_LIMIT,
        }
    }
}

impl AppConfig {
    pub fn new(access_token: String, page_id: String) -> Self {
        Self {
            access_token,
            page_id,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("access_token", &self.access_token),
            ("api_version", &self.api_version),
            ("page_id", &self.page_id),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn scope(&self) -> Result<PageScope, ConfigError> {
        self.validate()?;
        Ok(PageScope {
            page_id: self.page_id.trim().to_string(),
            access_token: self.access_token.trim().to_string(),
            api_version: self.api_version.trim().to_string(),
        })
    }
}

/// Explicit page scope handed to every gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageScope {
    pub page_id: String,
    pub access_token: String,
    pub api_version: String,
}

/// Keyword rule attached to one reel or post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub object_id: String,
    #[serde(default)]
    pub match_words: Vec<String>,
    pub reply_message: String,
    #[serde(default)]
    pub inbox_message: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

impl Rule {
    pub fn new(object_id: impl Into<String>, reply_message: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            match_words: Vec::new(),
            reply_message: reply_message.into(),
            inbox_message: None,
            enabled: true,
        }
    }

    pub fn with_match_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.match_words = words.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_inbox_message(mut self, message: impl Into<String>) -> Self {
        self.inbox_message = Some(message.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// A rule without a reply message can never be posted.
    pub fn is_postable(&self) -> bool {
        !self.reply_message.trim().is_empty()
    }

    pub fn is_active(&self) -> bool {
        self.enabled && self.is_postable()
    }

    pub fn private_message(&self) -> Option<&str> {
        self.inbox_message
            .as_deref()
            .filter(|message| !message.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reel {
    pub id: String,
    pub description: Option<String>,
    pub updated_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub message: String,
    pub author: Option<CommentAuthor>,
    pub created_time: DateTime<Utc>,
    pub updated_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub replies: Vec<Comment>,
    /// Upstream total of replies in this thread, when the API reported one.
    #[serde(default)]
    pub reply_count: Option<u32>,
}

impl Comment {
    pub fn is_authored_by(&self, user_id: &str) -> bool {
        self.author
            .as_ref()
            .map_or(false, |author| author.id == user_id)
    }

    /// True when the upstream thread holds more replies than were returned.
    pub fn replies_truncated(&self) -> bool {
        self.reply_count
            .map_or(false, |count| count as usize > self.replies.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStats {
    pub total_checks: u64,
    pub total_replies: u64,
    pub total_private_replies: u64,
    pub last_check_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_code: Option<String>,
}
