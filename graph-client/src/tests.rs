use crate::{GatewayCall, GraphApiClient, MockGraphGateway};
use chrono::Utc;
use sociwave_core::{
    Comment, CommentAuthor, CoreError, ErrorExt, GraphApiError, GraphGateway, GraphSettings,
    PageScope, Reel,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

fn scope() -> PageScope {
    PageScope {
        page_id: "1234".to_string(),
        access_token: "token".to_string(),
        api_version: "v20.0".to_string(),
    }
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let read = socket.read(&mut chunk).await.unwrap();
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);

        if let Some(end) = find_header_end(&buffer) {
            let headers = String::from_utf8_lossy(&buffer[..end]).to_lowercase();
            let length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buffer.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buffer).to_string()
}

/// Answers exactly one HTTP request and hands back what was received.
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        request
    });

    (format!("http://{}", address), handle)
}

fn client_for(base_url: String) -> GraphApiClient {
    GraphApiClient::new(&GraphSettings {
        base_url,
        ..GraphSettings::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_get_reels_over_http() {
    let (base_url, server) = serve_once(
        "200 OK",
        r#"{"data":[{"id":"r1","description":"Launch","updated_time":"2024-01-01T12:00:00+0000"}],"paging":{"cursors":{"before":"a","after":"b"}}}"#,
    )
    .await;
    let client = client_for(base_url);

    let reels = client.get_reels(&scope(), 25).await.unwrap();
    assert_eq!(reels.len(), 1);
    assert_eq!(reels[0].id, "r1");
    assert_eq!(reels[0].description.as_deref(), Some("Launch"));

    let request = server.await.unwrap().to_lowercase();
    assert!(request.starts_with("get /v20.0/1234/video_reels?"));
    assert!(request.contains("limit=25"));
    assert!(request.contains("authorization: bearer token"));

    let metrics = client.get_metrics().await;
    assert_eq!(metrics.total_requests, 1);
    assert_eq!(metrics.successful_requests, 1);
}

#[tokio::test]
async fn test_has_page_replied_over_http() {
    let (base_url, server) = serve_once(
        "200 OK",
        r#"{"data":[{"id":"c1_r1","from":{"id":"999","name":"Fan"}},{"id":"c1_r2","from":{"id":"1234","name":"Page"}}]}"#,
    )
    .await;
    let client = client_for(base_url);

    assert!(client.has_page_replied(&scope(), "c1").await.unwrap());

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /v20.0/c1/comments?"));
}

#[tokio::test]
async fn test_private_reply_rejection_over_http() {
    let (base_url, server) = serve_once(
        "400 Bad Request",
        r#"{"error":{"message":"Activity already replied to","type":"OAuthException","code":10900}}"#,
    )
    .await;
    let client = client_for(base_url);

    let result = client
        .post_private_reply(&scope(), "c1", "Check your inbox")
        .await;
    assert!(matches!(
        result,
        Err(CoreError::GraphApi(GraphApiError::PrivateReplyRejected {
            code: 10900,
            ..
        }))
    ));

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /v20.0/1234/messages"));
    assert!(request.contains(r#""comment_id":"c1""#));
    assert!(request.contains(r#""text":"Check your inbox""#));

    let operation = client
        .metrics_for("post_private_reply")
        .await
        .expect("operation metrics recorded");
    assert_eq!(operation.error_count, 1);
    assert_eq!(
        operation.last_error_type.as_deref(),
        Some("PRIVATE_REPLY_REJECTED")
    );
}

#[tokio::test]
async fn test_rate_limited_response_over_http() {
    let (base_url, server) = serve_once("429 Too Many Requests", "{}").await;
    let client = client_for(base_url);

    let result = client.post_reply(&scope(), "c1", "Thanks!").await;
    assert!(matches!(
        result,
        Err(CoreError::GraphApi(GraphApiError::RateLimited { .. }))
    ));
    let request = server.await.unwrap();
    assert!(request.contains(r#""message":"Thanks!""#));

    let metrics = client.get_metrics().await;
    assert_eq!(metrics.rate_limited_requests, 1);
    assert_eq!(metrics.failed_requests, 1);

    let status = client.get_rate_limit_status().await;
    assert_eq!(status.window.rate_limited_responses, 1);
    assert_eq!(status.window.request_count, 1);
}

#[tokio::test]
async fn test_connection_failure_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let client = client_for(format!("http://{}", address));
    let result = client.get_page_info(&scope()).await;
    assert!(result.is_err());
    assert_eq!(client.get_metrics().await.failed_requests, 1);
}

#[tokio::test]
async fn test_stalled_body_is_reported_as_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 500\r\n\r\n{\"data\":[")
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
    });

    let client = GraphApiClient::new(&GraphSettings {
        base_url: format!("http://{}", address),
        request_timeout_secs: 1,
        ..GraphSettings::default()
    })
    .unwrap();

    let error = client.get_reels(&scope(), 25).await.unwrap_err();
    assert!(matches!(
        error,
        CoreError::GraphApi(GraphApiError::RequestTimeout)
    ));
    assert_eq!(error.error_code(), "GATEWAY_TRANSIENT");
    server.abort();
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let (base_url, server) = serve_once("200 OK", r#"{"data":"not a list"}"#).await;
    let client = client_for(base_url);

    let error = client.get_reels(&scope(), 25).await.unwrap_err();
    assert!(matches!(
        error,
        CoreError::GraphApi(GraphApiError::InvalidResponse { .. })
    ));
    server.await.unwrap();
}

impl GraphApiClient {
    async fn metrics_for(&self, operation: &str) -> Option<crate::OperationMetrics> {
        self.get_metrics()
            .await
            .requests_by_operation
            .get(&format!("{}:1234", operation))
            .cloned()
    }
}

fn comment(id: &str, author_id: &str, message: &str) -> Comment {
    Comment {
        id: id.to_string(),
        message: message.to_string(),
        author: Some(CommentAuthor {
            id: author_id.to_string(),
            name: format!("user {}", author_id),
        }),
        created_time: Utc::now(),
        updated_time: None,
        replies: Vec::new(),
        reply_count: None,
    }
}

#[tokio::test]
async fn test_mock_records_replies_in_threads() {
    let mock = MockGraphGateway::new();
    mock.add_reel(Reel {
        id: "r1".to_string(),
        description: None,
        updated_time: Utc::now(),
    });
    mock.add_comment("r1", comment("c1", "u1", "price?"));

    assert!(!mock.has_page_replied(&scope(), "c1").await.unwrap());
    mock.post_reply(&scope(), "c1", "Sent you a DM").await.unwrap();
    assert!(mock.has_page_replied(&scope(), "c1").await.unwrap());

    let comments = mock.get_comments(&scope(), "r1", 100, 100).await.unwrap();
    assert_eq!(comments[0].replies.len(), 1);
    assert!(comments[0].replies[0].is_authored_by("1234"));
    assert_eq!(
        mock.replies_posted(),
        vec![("c1".to_string(), "Sent you a DM".to_string())]
    );
}

#[tokio::test]
async fn test_mock_truncates_nested_replies() {
    let mock = MockGraphGateway::new();
    mock.set_record_replies_in_threads(true);
    let mut thread = comment("c1", "u1", "price?");
    thread.replies = vec![
        comment("c1_a", "u2", "same question"),
        comment("c1_b", "u3", "+1"),
        comment("c1_c", "1234", "Check your inbox"),
    ];
    mock.add_comment("r1", thread);

    let comments = mock.get_comments(&scope(), "r1", 100, 2).await.unwrap();
    assert_eq!(comments[0].replies.len(), 2);
    assert_eq!(comments[0].reply_count, Some(3));
    assert!(comments[0].replies_truncated());
    assert!(mock.has_page_replied(&scope(), "c1").await.unwrap());
}

#[tokio::test]
async fn test_mock_failure_injection() {
    let mock = MockGraphGateway::new();
    mock.fail_reels_with(Some(GraphApiError::RateLimited { retry_after: None }));
    mock.fail_comments_for("r2", GraphApiError::ServerError { status_code: 500 });

    assert!(mock.get_reels(&scope(), 10).await.is_err());
    assert!(mock.get_comments(&scope(), "r2", 10, 10).await.is_err());
    assert!(mock
        .get_comments(&scope(), "r1", 10, 10)
        .await
        .unwrap()
        .is_empty());

    mock.clear_failures();
    assert!(mock.get_reels(&scope(), 10).await.is_ok());
    assert_eq!(
        mock.count_calls(|call| matches!(call, GatewayCall::GetReels)),
        2
    );
}

#[tokio::test]
async fn test_mock_sample_data() {
    let mock = MockGraphGateway::with_sample_data("1234");
    let reels = mock.get_reels(&scope(), 25).await.unwrap();
    assert_eq!(reels.len(), 2);

    let comments = mock
        .get_comments(&scope(), &reels[0].id, 100, 100)
        .await
        .unwrap();
    assert_eq!(comments.len(), 3);
    assert!(comments.iter().all(|comment| !comment.is_authored_by("1234")));

    let page = mock.get_page_info(&scope()).await.unwrap();
    assert_eq!(page.id, "1234");
    assert_eq!(page.name.as_deref(), Some("Mock Page"));
}
