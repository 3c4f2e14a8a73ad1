use sociwave_core::{Comment, DEFAULT_DEDUP_CAPACITY};
use std::collections::{HashSet, VecDeque};

/// Local record of comments this process has replied to.
///
/// The nested replies returned by the Graph API are the authoritative
/// signal; this tracker only covers the window before a posted reply shows
/// up upstream. Once `capacity` ids are held, the oldest is evicted first.
#[derive(Debug)]
pub struct DedupTracker {
    capacity: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl Default for DedupTracker {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}

impl DedupTracker {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    pub fn has_replied(&self, comment_id: &str) -> bool {
        self.seen.contains(comment_id)
    }

    /// Returns false if the id was already tracked.
    pub fn mark_replied(&mut self, comment_id: &str) -> bool {
        if !self.seen.insert(comment_id.to_string()) {
            return false;
        }
        self.order.push_back(comment_id.to_string());

        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }

    /// True when any nested reply on `comment` was written by the page.
    pub fn has_page_replied(comment: &Comment, page_id: &str) -> bool {
        comment
            .replies
            .iter()
            .any(|reply| reply.is_authored_by(page_id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sociwave_core::CommentAuthor;

    fn comment(id: &str, author: &str, replies: Vec<Comment>) -> Comment {
        Comment {
            id: id.to_string(),
            message: String::new(),
            author: Some(CommentAuthor {
                id: author.to_string(),
                name: author.to_string(),
            }),
            created_time: Utc::now(),
            updated_time: None,
            replies,
            reply_count: None,
        }
    }

    #[test]
    fn test_mark_and_check() {
        let mut tracker = DedupTracker::default();
        assert!(!tracker.has_replied("c1"));
        assert!(tracker.mark_replied("c1"));
        assert!(!tracker.mark_replied("c1"));
        assert!(tracker.has_replied("c1"));
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.capacity(), DEFAULT_DEDUP_CAPACITY);
    }

    #[test]
    fn test_oldest_evicted_first() {
        let mut tracker = DedupTracker::new(2);
        tracker.mark_replied("c1");
        tracker.mark_replied("c2");
        tracker.mark_replied("c3");

        assert!(!tracker.has_replied("c1"));
        assert!(tracker.has_replied("c2"));
        assert!(tracker.has_replied("c3"));
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_has_page_replied() {
        let replied = comment("c1", "u1", vec![comment("c1_r", "page", Vec::new())]);
        assert!(DedupTracker::has_page_replied(&replied, "page"));

        let other = comment("c2", "u1", vec![comment("c2_r", "u2", Vec::new())]);
        assert!(!DedupTracker::has_page_replied(&other, "page"));
        assert!(!DedupTracker::has_page_replied(
            &comment("c3", "u1", Vec::new()),
            "page"
        ));
    }
}
