use crate::metrics::{ApiMetrics, MetricsCollector, RequestMetrics};
use crate::rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimiter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sociwave_core::{
    Comment, CommentAuthor, ConfigError, CoreError, ErrorExt, GraphApiError, GraphGateway,
    GraphSettings, PageInfo, PageScope, Reel,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Graph error codes that mean a private reply was refused for this comment
/// rather than that the request itself was broken.
const PRIVATE_REPLY_CODES: &[i64] = &[10900, 10903, 551];
const PRIVATE_REPLY_SUBCODES: &[i64] = &[2018278];
const RATE_LIMIT_CODES: &[i64] = &[4, 17, 32, 613];
/// Business Use Case throttling, returned with HTTP 400.
const BUSINESS_THROTTLE_CODES: std::ops::RangeInclusive<i64> = 80001..=80014;
const THREAD_CHECK_LIMIT: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphListing<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub paging: Option<GraphPaging>,
    #[serde(default)]
    pub summary: Option<GraphSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphPaging {
    pub cursors: Option<GraphCursors>,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphCursors {
    pub before: Option<String>,
    pub after: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSummary {
    pub total_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphReelData {
    pub id: String,
    pub description: Option<String>,
    pub updated_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphUserData {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphCommentData {
    pub id: String,
    #[serde(default)]
    pub message: Option<String>,
    pub from: Option<GraphUserData>,
    pub created_time: String,
    pub updated_time: Option<String>,
    pub comments: Option<GraphListing<GraphCommentData>>,
}

#[derive(Debug, Clone, Deserialize)]
struct GraphErrorEnvelope {
    error: GraphErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
struct GraphErrorBody {
    #[serde(default)]
    message: String,
    code: Option<i64>,
    error_subcode: Option<i64>,
}

/// Parses Graph timestamps such as `2024-01-01T12:00:00+0000`.
pub fn parse_graph_time(value: &str) -> Result<DateTime<Utc>, GraphApiError> {
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|time| time.with_timezone(&Utc))
        .map_err(|_| GraphApiError::InvalidResponse {
            details: format!("unparseable timestamp '{}'", value),
        })
}

/// Maps a failed Graph response onto the gateway error taxonomy. The Graph
/// error code wins over the HTTP status, which Facebook reuses loosely.
pub fn classify_graph_error(status: u16, body: &str, retry_after: Option<u64>) -> GraphApiError {
    let parsed = serde_json::from_str::<GraphErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error);
    let code = parsed.as_ref().and_then(|error| error.code);
    let subcode = parsed.as_ref().and_then(|error| error.error_subcode);
    let message = parsed
        .map(|error| error.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status));

    if let Some(code) = code {
        if PRIVATE_REPLY_CODES.contains(&code)
            || subcode.map_or(false, |sub| PRIVATE_REPLY_SUBCODES.contains(&sub))
        {
            return GraphApiError::PrivateReplyRejected { code, message };
        }
        if code == 190 {
            return GraphApiError::Unauthorized { message };
        }
        if RATE_LIMIT_CODES.contains(&code) || BUSINESS_THROTTLE_CODES.contains(&code) {
            return GraphApiError::RateLimited { retry_after };
        }
        if code == 10 || (200..=299).contains(&code) {
            return GraphApiError::Forbidden { message };
        }
        if code == 100 && subcode == Some(33) {
            return GraphApiError::NotFound { object: message };
        }
    }

    match status {
        401 => GraphApiError::Unauthorized { message },
        403 => GraphApiError::Forbidden { message },
        404 => GraphApiError::NotFound { object: message },
        429 => GraphApiError::RateLimited { retry_after },
        408 => GraphApiError::RequestTimeout,
        s if s >= 500 => GraphApiError::ServerError { status_code: s },
        s => GraphApiError::BadRequest {
            status_code: s,
            code,
            message,
        },
    }
}

fn network_error(error: reqwest::Error) -> CoreError {
    if error.is_timeout() {
        CoreError::GraphApi(GraphApiError::RequestTimeout)
    } else if error.is_connect() {
        CoreError::GraphApi(GraphApiError::ConnectionFailed {
            reason: error.to_string(),
        })
    } else {
        CoreError::Network(error)
    }
}

/// The request timeout also covers the body download, so only decode
/// failures count as a malformed response.
fn body_error(operation: &str, error: reqwest::Error) -> CoreError {
    if error.is_decode() {
        CoreError::GraphApi(GraphApiError::InvalidResponse {
            details: format!("failed to parse {} response: {}", operation, error),
        })
    } else if error.is_timeout() {
        warn!("Timed out reading {} response", operation);
        CoreError::GraphApi(GraphApiError::RequestTimeout)
    } else {
        warn!("Lost connection reading {} response: {}", operation, error);
        CoreError::GraphApi(GraphApiError::ConnectionFailed {
            reason: error.to_string(),
        })
    }
}

impl TryFrom<GraphReelData> for Reel {
    type Error = GraphApiError;

    fn try_from(data: GraphReelData) -> Result<Self, Self::Error> {
        Ok(Self {
            updated_time: parse_graph_time(&data.updated_time)?,
            description: data.description.filter(|text| !text.is_empty()),
            id: data.id,
        })
    }
}

impl From<GraphUserData> for CommentAuthor {
    fn from(user: GraphUserData) -> Self {
        Self {
            id: user.id,
            name: user.name.unwrap_or_default(),
        }
    }
}

impl TryFrom<GraphCommentData> for Comment {
    type Error = GraphApiError;

    fn try_from(data: GraphCommentData) -> Result<Self, Self::Error> {
        let (replies, reply_count) = match data.comments {
            Some(listing) => {
                let count = listing.summary.and_then(|summary| summary.total_count);
                let replies = listing
                    .data
                    .into_iter()
                    .map(Comment::try_from)
                    .collect::<Result<Vec<_>, _>>()?;
                (replies, count)
            }
            None => (Vec::new(), None),
        };

        Ok(Self {
            created_time: parse_graph_time(&data.created_time)?,
            updated_time: data
                .updated_time
                .as_deref()
                .map(parse_graph_time)
                .transpose()?,
            id: data.id,
            message: data.message.unwrap_or_default(),
            author: data.from.map(CommentAuthor::from),
            replies,
            reply_count,
        })
    }
}

impl From<GraphUserData> for PageInfo {
    fn from(user: GraphUserData) -> Self {
        Self {
            id: user.id,
            name: user.name,
        }
    }
}

fn comment_fields(replies_limit: u32) -> String {
    format!(
        "id,message,from,created_time,updated_time,comments.limit({}).summary(true){{id,message,from,created_time}}",
        replies_limit
    )
}

/// Converts listing entries, dropping the ones that fail to parse.
fn convert_listing<W, T>(entries: Vec<W>, what: &str) -> Vec<T>
where
    T: TryFrom<W, Error = GraphApiError>,
{
    entries
        .into_iter()
        .filter_map(|entry| match T::try_from(entry) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Skipping malformed {}: {}", what, e);
                None
            }
        })
        .collect()
}

#[derive(Debug)]
pub struct GraphApiClient {
    http_client: Client,
    base_url: Url,
    rate_limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsCollector>,
}

impl GraphApiClient {
    pub fn new(settings: &GraphSettings) -> Result<Self, CoreError> {
        let mut base_url = Url::parse(&settings.base_url).map_err(|_| {
            CoreError::Config(ConfigError::InvalidValue {
                field: "graph.base_url".to_string(),
                value: settings.base_url.clone(),
            })
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http_client = Client::builder()
            .user_agent(&settings.user_agent)
            .connect_timeout(settings.connect_timeout())
            .timeout(settings.request_timeout())
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            rate_limiter: Arc::new(RateLimiter::new(RateLimitConfig::from_settings(settings))),
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    pub fn endpoint(&self, scope: &PageScope, path: &str) -> Result<Url, CoreError> {
        let relative = format!("{}/{}", scope.api_version, path.trim_start_matches('/'));
        self.base_url
            .join(&relative)
            .map_err(|e| CoreError::InvalidInput {
                message: format!("invalid Graph path '{}': {}", path, e),
            })
    }

    pub async fn make_request(
        &self,
        operation: &'static str,
        method: Method,
        scope: &PageScope,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Response, CoreError> {
        let url = self.endpoint(scope, path)?;
        let permit = self.rate_limiter.acquire_permit().await?;
        if !permit.queue_wait_time.is_zero() {
            debug!(
                "Waited {:?} for a Graph API permit ({})",
                permit.queue_wait_time, operation
            );
        }

        debug!("Making Graph API request: {} {}", method, url.path());
        let start_time = Instant::now();
        let (status_code, result) = self.execute(method, url, scope, query, body).await;
        drop(permit);

        let rate_limited = matches!(
            result,
            Err(CoreError::GraphApi(GraphApiError::RateLimited { .. }))
        );
        if rate_limited {
            self.rate_limiter.record_rate_limited().await;
        }

        self.metrics
            .record_request(RequestMetrics {
                operation,
                page_id: scope.page_id.clone(),
                status_code,
                response_time: start_time.elapsed(),
                success: result.is_ok(),
                rate_limited,
                error_type: result
                    .as_ref()
                    .err()
                    .map(|e| e.error_code().to_string()),
            })
            .await;

        result
    }

    async fn execute(
        &self,
        method: Method,
        url: Url,
        scope: &PageScope,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> (Option<u16>, Result<Response, CoreError>) {
        let mut request = self
            .http_client
            .request(method, url)
            .bearer_auth(&scope.access_token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Network error talking to the Graph API: {}", e);
                return (None, Err(network_error(e)));
            }
        };

        let status = response.status();
        if status.is_success() {
            return (Some(status.as_u16()), Ok(response));
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        let error = classify_graph_error(status.as_u16(), &body, retry_after);
        warn!("Graph API request failed with status {}: {}", status, error);

        (Some(status.as_u16()), Err(CoreError::GraphApi(error)))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        scope: &PageScope,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, CoreError> {
        let response = self
            .make_request(operation, Method::GET, scope, path, query, None)
            .await?;
        response.json::<T>().await.map_err(|e| body_error(operation, e))
    }

    pub async fn get_metrics(&self) -> ApiMetrics {
        self.metrics.get_metrics().await
    }

    pub async fn get_rate_limit_status(&self) -> RateLimitStatus {
        self.rate_limiter.status().await
    }

    pub async fn reset_metrics(&self) {
        self.metrics.reset_metrics().await;
    }
}

#[async_trait]
impl GraphGateway for GraphApiClient {
    async fn get_reels(&self, scope: &PageScope, limit: u32) -> Result<Vec<Reel>, CoreError> {
        let path = format!("{}/video_reels", scope.page_id);
        let listing: GraphListing<GraphReelData> = self
            .get_json(
                "get_reels",
                scope,
                &path,
                &[
                    ("fields", "id,description,updated_time".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        let reels: Vec<Reel> = convert_listing(listing.data, "reel");
        info!("Retrieved {} reels for page {}", reels.len(), scope.page_id);
        Ok(reels)
    }

    async fn get_comments(
        &self,
        scope: &PageScope,
        object_id: &str,
        limit: u32,
        replies_limit: u32,
    ) -> Result<Vec<Comment>, CoreError> {
        let path = format!("{}/comments", object_id);
        let listing: GraphListing<GraphCommentData> = self
            .get_json(
                "get_comments",
                scope,
                &path,
                &[
                    ("fields", comment_fields(replies_limit)),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        let comments: Vec<Comment> = convert_listing(listing.data, "comment");
        debug!("Retrieved {} comments for {}", comments.len(), object_id);
        Ok(comments)
    }

    async fn has_page_replied(
        &self,
        scope: &PageScope,
        comment_id: &str,
    ) -> Result<bool, CoreError> {
        let path = format!("{}/comments", comment_id);
        let listing: GraphListing<Value> = self
            .get_json(
                "has_page_replied",
                scope,
                &path,
                &[
                    ("fields", "id,from".to_string()),
                    ("limit", THREAD_CHECK_LIMIT.to_string()),
                ],
            )
            .await?;

        Ok(listing.data.iter().any(|reply| {
            reply
                .pointer("/from/id")
                .and_then(Value::as_str)
                .map_or(false, |id| id == scope.page_id)
        }))
    }

    async fn post_reply(
        &self,
        scope: &PageScope,
        comment_id: &str,
        message: &str,
    ) -> Result<(), CoreError> {
        let path = format!("{}/comments", comment_id);
        let body = json!({ "message": message });
        self.make_request("post_reply", Method::POST, scope, &path, &[], Some(&body))
            .await?;
        debug!("Posted reply to comment {}", comment_id);
        Ok(())
    }

    async fn post_private_reply(
        &self,
        scope: &PageScope,
        comment_id: &str,
        message: &str,
    ) -> Result<(), CoreError> {
        let path = format!("{}/messages", scope.page_id);
        let body = json!({
            "recipient": { "comment_id": comment_id },
            "message": { "text": message },
        });
        self.make_request(
            "post_private_reply",
            Method::POST,
            scope,
            &path,
            &[],
            Some(&body),
        )
        .await?;
        debug!("Sent private reply for comment {}", comment_id);
        Ok(())
    }

    async fn get_page_info(&self, scope: &PageScope) -> Result<PageInfo, CoreError> {
        let user: GraphUserData = self
            .get_json(
                "get_page_info",
                scope,
                &scope.page_id,
                &[("fields", "id,name".to_string())],
            )
            .await?;
        Ok(user.into())
    }
}
