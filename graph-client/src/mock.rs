//! In-memory Graph gateway used for `use_mock_data` mode and in tests.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sociwave_core::{
    Comment, CommentAuthor, CoreError, GraphApiError, GraphGateway, PageInfo, PageScope, Reel,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    GetReels,
    GetComments { object_id: String },
    HasPageReplied { comment_id: String },
    PostReply { comment_id: String, message: String },
    PostPrivateReply { comment_id: String, message: String },
    GetPageInfo,
}

#[derive(Debug, Default)]
struct MockState {
    reels: Vec<Reel>,
    comments: HashMap<String, Vec<Comment>>,
    calls: Vec<GatewayCall>,
    reels_failure: Option<GraphApiError>,
    comment_failures: HashMap<String, GraphApiError>,
    reply_failures: HashMap<String, GraphApiError>,
    private_reply_failure: Option<GraphApiError>,
    thread_check_failure: Option<GraphApiError>,
    record_replies_in_threads: bool,
    next_reply_id: u64,
}

#[derive(Debug)]
pub struct MockGraphGateway {
    state: Mutex<MockState>,
    page_name: String,
    latency: Option<Duration>,
}

impl Default for MockGraphGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGraphGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                record_replies_in_threads: true,
                ..MockState::default()
            }),
            page_name: "Mock Page".to_string(),
            latency: None,
        }
    }

    /// A small fixed catalogue of reels and comments for demo runs.
    pub fn with_sample_data(page_id: &str) -> Self {
        let gateway = Self::new();
        let now = Utc::now();

        for (index, description) in ["Spring collection", "Behind the scenes"].iter().enumerate() {
            let reel_id = format!("{}_reel_{}", page_id, index + 1);
            gateway.add_reel(Reel {
                id: reel_id.clone(),
                description: Some(description.to_string()),
                updated_time: now - ChronoDuration::hours(index as i64 + 1),
            });

            let samples = [
                ("u100", "Jamie", "What's the price?"),
                ("u101", "Robin", "Love this!"),
                ("u102", "Sam", "Is it available in blue? price please"),
            ];
            for (offset, (user_id, name, message)) in samples.iter().enumerate() {
                gateway.add_comment(
                    &reel_id,
                    Comment {
                        id: format!("{}_comment_{}", reel_id, offset + 1),
                        message: message.to_string(),
                        author: Some(CommentAuthor {
                            id: user_id.to_string(),
                            name: name.to_string(),
                        }),
                        created_time: now - ChronoDuration::minutes(offset as i64 * 5),
                        updated_time: None,
                        replies: Vec::new(),
                        reply_count: None,
                    },
                );
            }
        }

        gateway
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_page_name(mut self, name: impl Into<String>) -> Self {
        self.page_name = name.into();
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    pub fn add_reel(&self, reel: Reel) {
        self.state().reels.push(reel);
    }

    pub fn add_comment(&self, object_id: &str, comment: Comment) {
        self.state()
            .comments
            .entry(object_id.to_string())
            .or_default()
            .push(comment);
    }

    /// When enabled (the default) a posted reply shows up in the thread on
    /// the next fetch, like it does upstream.
    pub fn set_record_replies_in_threads(&self, enabled: bool) {
        self.state().record_replies_in_threads = enabled;
    }

    pub fn fail_reels_with(&self, error: Option<GraphApiError>) {
        self.state().reels_failure = error;
    }

    pub fn fail_comments_for(&self, object_id: &str, error: GraphApiError) {
        self.state()
            .comment_failures
            .insert(object_id.to_string(), error);
    }

    pub fn fail_reply_for(&self, comment_id: &str, error: GraphApiError) {
        self.state()
            .reply_failures
            .insert(comment_id.to_string(), error);
    }

    pub fn fail_private_replies_with(&self, error: Option<GraphApiError>) {
        self.state().private_reply_failure = error;
    }

    pub fn fail_thread_checks_with(&self, error: Option<GraphApiError>) {
        self.state().thread_check_failure = error;
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.reels_failure = None;
        state.comment_failures.clear();
        state.reply_failures.clear();
        state.private_reply_failure = None;
        state.thread_check_failure = None;
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn replies_posted(&self) -> Vec<(String, String)> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                GatewayCall::PostReply {
                    comment_id,
                    message,
                } => Some((comment_id.clone(), message.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn private_replies_sent(&self) -> Vec<(String, String)> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                GatewayCall::PostPrivateReply {
                    comment_id,
                    message,
                } => Some((comment_id.clone(), message.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn count_calls(&self, predicate: impl Fn(&GatewayCall) -> bool) -> usize {
        self.state().calls.iter().filter(|call| predicate(call)).count()
    }
}

fn find_comment<'a>(state: &'a mut MockState, comment_id: &str) -> Option<&'a mut Comment> {
    state
        .comments
        .values_mut()
        .flat_map(|comments| comments.iter_mut())
        .find(|comment| comment.id == comment_id)
}

#[async_trait]
impl GraphGateway for MockGraphGateway {
    async fn get_reels(&self, _scope: &PageScope, limit: u32) -> Result<Vec<Reel>, CoreError> {
        self.simulate_latency().await;
        let mut state = self.state();
        state.calls.push(GatewayCall::GetReels);

        if let Some(error) = state.reels_failure.clone() {
            return Err(error.into());
        }
        Ok(state.reels.iter().take(limit as usize).cloned().collect())
    }

    async fn get_comments(
        &self,
        _scope: &PageScope,
        object_id: &str,
        limit: u32,
        replies_limit: u32,
    ) -> Result<Vec<Comment>, CoreError> {
        self.simulate_latency().await;
        let mut state = self.state();
        state.calls.push(GatewayCall::GetComments {
            object_id: object_id.to_string(),
        });

        if let Some(error) = state.comment_failures.get(object_id) {
            return Err(error.clone().into());
        }

        let comments = state
            .comments
            .get(object_id)
            .map(|comments| {
                comments
                    .iter()
                    .take(limit as usize)
                    .map(|comment| {
                        let mut listed = comment.clone();
                        let total = comment.replies.len() as u32;
                        listed.reply_count = Some(comment.reply_count.unwrap_or(0).max(total));
                        listed.replies.truncate(replies_limit as usize);
                        listed
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(comments)
    }

    async fn has_page_replied(
        &self,
        scope: &PageScope,
        comment_id: &str,
    ) -> Result<bool, CoreError> {
        self.simulate_latency().await;
        let mut state = self.state();
        state.calls.push(GatewayCall::HasPageReplied {
            comment_id: comment_id.to_string(),
        });

        if let Some(error) = state.thread_check_failure.clone() {
            return Err(error.into());
        }
        Ok(find_comment(&mut state, comment_id).map_or(false, |comment| {
            comment
                .replies
                .iter()
                .any(|reply| reply.is_authored_by(&scope.page_id))
        }))
    }

    async fn post_reply(
        &self,
        scope: &PageScope,
        comment_id: &str,
        message: &str,
    ) -> Result<(), CoreError> {
        self.simulate_latency().await;
        let mut state = self.state();
        state.calls.push(GatewayCall::PostReply {
            comment_id: comment_id.to_string(),
            message: message.to_string(),
        });

        if let Some(error) = state.reply_failures.get(comment_id) {
            return Err(error.clone().into());
        }

        if state.record_replies_in_threads {
            state.next_reply_id += 1;
            let reply_id = format!("{}_reply_{}", comment_id, state.next_reply_id);
            let author = CommentAuthor {
                id: scope.page_id.clone(),
                name: self.page_name.clone(),
            };
            if let Some(comment) = find_comment(&mut state, comment_id) {
                comment.replies.push(Comment {
                    id: reply_id,
                    message: message.to_string(),
                    author: Some(author),
                    created_time: Utc::now(),
                    updated_time: None,
                    replies: Vec::new(),
                    reply_count: None,
                });
            }
        }
        debug!("Mock reply posted to {}", comment_id);
        Ok(())
    }

    async fn post_private_reply(
        &self,
        _scope: &PageScope,
        comment_id: &str,
        message: &str,
    ) -> Result<(), CoreError> {
        self.simulate_latency().await;
        let mut state = self.state();
        state.calls.push(GatewayCall::PostPrivateReply {
            comment_id: comment_id.to_string(),
            message: message.to_string(),
        });

        if let Some(error) = state.private_reply_failure.clone() {
            return Err(error.into());
        }
        Ok(())
    }

    async fn get_page_info(&self, scope: &PageScope) -> Result<PageInfo, CoreError> {
        self.simulate_latency().await;
        self.state().calls.push(GatewayCall::GetPageInfo);
        Ok(PageInfo {
            id: scope.page_id.clone(),
            name: Some(self.page_name.clone()),
        })
    }
}
