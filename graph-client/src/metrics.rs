use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rate_limited_requests: u64,
    pub total_response_time: Duration,
    pub last_request_time: Option<SystemTime>,
    pub requests_by_operation: HashMap<String, OperationMetrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationMetrics {
    pub request_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub total_response_time: Duration,
    pub max_response_time: Duration,
    pub last_error_type: Option<String>,
}

/// One completed Graph API call, labelled by gateway operation and page.
#[derive(Debug, Clone)]
pub struct RequestMetrics {
    pub operation: &'static str,
    pub page_id: String,
    pub status_code: Option<u16>,
    pub response_time: Duration,
    pub success: bool,
    pub rate_limited: bool,
    pub error_type: Option<String>,
}

impl OperationMetrics {
    fn new() -> Self {
        Self {
            request_count: 0,
            success_count: 0,
            error_count: 0,
            total_response_time: Duration::ZERO,
            max_response_time: Duration::ZERO,
            last_error_type: None,
        }
    }

    fn update(&mut self, metrics: &RequestMetrics) {
        self.request_count += 1;
        self.total_response_time += metrics.response_time;
        self.max_response_time = self.max_response_time.max(metrics.response_time);

        if metrics.success {
            self.success_count += 1;
        } else {
            self.error_count += 1;
            self.last_error_type = metrics.error_type.clone();
        }
    }

    pub fn average_response_time(&self) -> Duration {
        if self.request_count == 0 {
            Duration::ZERO
        } else {
            self.total_response_time / self.request_count as u32
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.request_count as f64
        }
    }
}

impl ApiMetrics {
    pub fn average_response_time(&self) -> Duration {
        if self.total_requests == 0 {
            Duration::ZERO
        } else {
            self.total_response_time / self.total_requests as u32
        }
    }
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: RwLock<ApiMetrics>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_request(&self, request: RequestMetrics) {
        let mut metrics = self.metrics.write().await;

        metrics.total_requests += 1;
        metrics.last_request_time = Some(SystemTime::now());
        metrics.total_response_time += request.response_time;

        if request.success {
            metrics.successful_requests += 1;
        } else {
            metrics.failed_requests += 1;
        }
        if request.rate_limited {
            metrics.rate_limited_requests += 1;
        }

        let key = format!("{}:{}", request.operation, request.page_id);
        metrics
            .requests_by_operation
            .entry(key)
            .or_insert_with(OperationMetrics::new)
            .update(&request);
    }

    pub async fn get_metrics(&self) -> ApiMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn get_operation_metrics(
        &self,
        operation: &str,
        page_id: &str,
    ) -> Option<OperationMetrics> {
        let key = format!("{}:{}", operation, page_id);
        self.metrics
            .read()
            .await
            .requests_by_operation
            .get(&key)
            .cloned()
    }

    pub async fn reset_metrics(&self) {
        *self.metrics.write().await = ApiMetrics::default();
    }

    pub async fn export_metrics(&self) -> Result<String, serde_json::Error> {
        let metrics = self.get_metrics().await;
        serde_json::to_string_pretty(&metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(operation: &'static str, success: bool, millis: u64) -> RequestMetrics {
        RequestMetrics {
            operation,
            page_id: "page-1".to_string(),
            status_code: Some(if success { 200 } else { 429 }),
            response_time: Duration::from_millis(millis),
            success,
            rate_limited: !success,
            error_type: (!success).then(|| "rate_limited".to_string()),
        }
    }

    #[tokio::test]
    async fn test_metrics_collection() {
        let collector = MetricsCollector::new();
        collector.record_request(sample("get_reels", true, 150)).await;
        collector.record_request(sample("get_reels", false, 50)).await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.successful_requests, 1);
        assert_eq!(metrics.failed_requests, 1);
        assert_eq!(metrics.rate_limited_requests, 1);
        assert_eq!(metrics.average_response_time(), Duration::from_millis(100));
        assert!(metrics.last_request_time.is_some());
    }

    #[tokio::test]
    async fn test_operation_metrics() {
        let collector = MetricsCollector::new();
        collector.record_request(sample("post_reply", true, 100)).await;
        collector.record_request(sample("post_reply", false, 300)).await;

        let operation = collector
            .get_operation_metrics("post_reply", "page-1")
            .await
            .unwrap();
        assert_eq!(operation.request_count, 2);
        assert_eq!(operation.average_response_time(), Duration::from_millis(200));
        assert_eq!(operation.max_response_time, Duration::from_millis(300));
        assert_eq!(operation.success_rate(), 0.5);
        assert_eq!(operation.last_error_type.as_deref(), Some("rate_limited"));

        assert!(collector
            .get_operation_metrics("post_reply", "other-page")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_export_and_reset() {
        let collector = MetricsCollector::new();
        collector.record_request(sample("get_comments", true, 10)).await;

        let exported = collector.export_metrics().await.unwrap();
        assert!(exported.contains("total_requests"));

        collector.reset_metrics().await;
        assert_eq!(collector.get_metrics().await.total_requests, 0);
    }
}
