//! Client for the remote chat-query endpoint.
//!
//! One question goes out as a multipart form (`question`, `sessionId`,
//! `userId`, and one `files` part per attachment); one JSON answer comes
//! back. There is no streaming and no retry.

use async_trait::async_trait;
use futures::future::{AbortRegistration, Abortable};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::files::FileBlob;
use shared::settings::ChatSettings;
use std::sync::LazyLock;
use std::time::Duration;

static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

const QUERY_PATH: &str = "/chat/query";

#[derive(Debug, Clone)]
pub struct ChatQueryRequest {
    pub question: String,
    pub session_id: String,
    pub user_id: String,
    pub files: Vec<FileBlob>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub content: String,
    pub relevance: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatQueryResponse {
    /// Missing answers deserialize as "" and are replaced by a placeholder downstream
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub sources: Vec<Source>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Request cancelled")]
    Cancelled,
}

/// Anything that can answer a chat query.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn query(&self, request: ChatQueryRequest) -> Result<ChatQueryResponse, TransportError>;
}

pub struct HttpChatClient {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpChatClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            http: SHARED_HTTP.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Build from settings. Any environment override is already applied to `settings`.
    pub fn from_settings(settings: &ChatSettings) -> Self {
        Self::new(&settings.api_base_url, settings.request_timeout())
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, QUERY_PATH)
    }

    fn build_form(request: ChatQueryRequest) -> Result<Form, TransportError> {
        let mut form = Form::new()
            .text("question", request.question)
            .text("sessionId", request.session_id)
            .text("userId", request.user_id);

        for file in request.files {
            let part = Part::bytes(file.bytes.to_vec())
                .file_name(file.name)
                .mime_str(&file.media_type)?;
            form = form.part("files", part);
        }

        Ok(form)
    }
}

#[async_trait]
impl ChatTransport for HttpChatClient {
    async fn query(&self, request: ChatQueryRequest) -> Result<ChatQueryResponse, TransportError> {
        let file_count = request.files.len();
        let form = Self::build_form(request)?;
        let url = self.endpoint();
        tracing::debug!(%url, file_count, "sending chat query");

        let resp = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(self.timeout)
                } else {
                    TransportError::Http(e)
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status,
                body: body.chars().take(300).collect(),
            });
        }

        let bytes = resp.bytes().await?;
        serde_json::from_slice::<ChatQueryResponse>(&bytes)
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

/// Run one query with a deadline, abortable through `abort`.
pub async fn run_query(
    transport: &dyn ChatTransport,
    request: ChatQueryRequest,
    abort: AbortRegistration,
    timeout: Duration,
) -> Result<ChatQueryResponse, TransportError> {
    let call = tokio::time::timeout(timeout, transport.query(request));
    match Abortable::new(call, abort).await {
        Ok(Ok(result)) => result,
        Ok(Err(_elapsed)) => Err(TransportError::Timeout(timeout)),
        Err(_aborted) => Err(TransportError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::AbortHandle;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    /// Accept one request, capture its body, answer with `status` and `body`.
    fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());

        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
            }
            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).unwrap();

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
            String::from_utf8_lossy(&request_body).to_string()
        });

        (addr, handle)
    }

    fn request_with_file() -> ChatQueryRequest {
        ChatQueryRequest {
            question: "What does this code do?".into(),
            session_id: "session-1".into(),
            user_id: "user-default".into(),
            files: vec![FileBlob::new("main.txt", "text/plain", b"fn main() {}".to_vec())],
        }
    }

    struct SlowTransport;

    #[async_trait]
    impl ChatTransport for SlowTransport {
        async fn query(&self, _request: ChatQueryRequest) -> Result<ChatQueryResponse, TransportError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ChatQueryResponse::default())
        }
    }

    #[test]
    fn test_response_optional_fields() {
        let resp: ChatQueryResponse = serde_json::from_str(r#"{"answer":"42"}"#).unwrap();
        assert_eq!(resp.answer, "42");
        assert!(resp.session_id.is_none());
        assert!(resp.sources.is_empty());

        let resp: ChatQueryResponse = serde_json::from_str(
            r#"{"answer":"ok","sessionId":"s","timestamp":"t","sources":[{"title":"a","content":"b","relevance":0.5}]}"#,
        )
        .unwrap();
        assert_eq!(resp.session_id.as_deref(), Some("s"));
        assert_eq!(resp.sources[0].title, "a");
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let client = HttpChatClient::new("http://localhost:8000/", Duration::from_secs(5));
        assert_eq!(client.endpoint(), "http://localhost:8000/chat/query");
    }

    #[test]
    fn test_from_settings_ignores_environment() {
        std::env::set_var("CHAT_API_BASE_URL", "");
        let client = HttpChatClient::from_settings(&ChatSettings::default());
        assert_eq!(client.endpoint(), "http://127.0.0.1:8000/chat/query");

        let settings = ChatSettings {
            api_base_url: "http://chat.internal:9000/".into(),
            ..Default::default()
        };
        assert_eq!(
            HttpChatClient::from_settings(&settings).endpoint(),
            "http://chat.internal:9000/chat/query"
        );
    }

    #[tokio::test]
    async fn test_query_sends_multipart_fields() {
        let (addr, server) = serve_once("200 OK", r#"{"answer":"It prints nothing.","sessionId":"session-1"}"#);
        let client = HttpChatClient::new(&addr, Duration::from_secs(5));

        let resp = client.query(request_with_file()).await.unwrap();
        assert_eq!(resp.answer, "It prints nothing.");

        let body = server.join().unwrap();
        assert!(body.contains("name=\"question\""));
        assert!(body.contains("What does this code do?"));
        assert!(body.contains("name=\"sessionId\""));
        assert!(body.contains("name=\"userId\""));
        assert!(body.contains("name=\"files\"; filename=\"main.txt\""));
        assert!(body.contains("fn main() {}"));
    }

    #[tokio::test]
    async fn test_query_reports_error_status() {
        let (addr, server) = serve_once("500 Internal Server Error", r#"{"detail":"boom"}"#);
        let client = HttpChatClient::new(&addr, Duration::from_secs(5));

        let err = client.query(request_with_file()).await.unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 500, .. }));
        assert!(err.to_string().contains("boom"));
        server.join().unwrap();
    }

    #[tokio::test]
    async fn test_run_query_times_out() {
        let (_handle, reg) = AbortHandle::new_pair();
        let err = run_query(&SlowTransport, request_with_file(), reg, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_run_query_cancelled() {
        let (handle, reg) = AbortHandle::new_pair();
        handle.abort();
        let err = run_query(&SlowTransport, request_with_file(), reg, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Cancelled));
    }
}
