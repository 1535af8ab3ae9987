//! Outbound relay to the conversational flow service.
//!
//! One POST per chat turn to `{base}/api/v1/run/{endpoint}`. The call is
//! at-most-once: nothing here retries, and a failure leaves it to the caller
//! to decide what the user sees.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::AppConfig;
use crate::models::Message;

/// Where the reply text sits inside the flow service's response.
const REPLY_POINTER: &str = "/outputs/0/outputs/0/results/message/text";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("not authorized to call the chat service: FLOW_API_TOKEN is not configured")]
    MissingToken,

    #[error("chat service unreachable: {0}")]
    Network(String),

    #[error("chat service did not answer within {0:?}")]
    Timeout(Duration),

    #[error("chat service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("chat service returned a non-JSON body: {0}")]
    Malformed(String),

    #[error("chat service response has no reply at {0}")]
    MissingField(String),
}

/// One chat turn as handed to the relay.
#[derive(Debug, Clone, Copy)]
pub struct RelayRequest<'a> {
    pub message: &'a str,
    /// Earlier messages of the session, not including `message`.
    pub history: &'a [Message],
    pub user: &'a str,
    pub session_id: &'a str,
}

#[async_trait]
pub trait ChatRelay: Send + Sync {
    async fn send(&self, request: RelayRequest<'_>) -> Result<String, RelayError>;
}

#[derive(Debug, Serialize, PartialEq)]
struct FlowRunRequest<'a> {
    input_value: &'a str,
    output_type: &'static str,
    input_type: &'static str,
    user: &'a str,
    session_id: &'a str,
    /// JSON-encoded list of prior messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_history: Option<String>,
}

impl<'a> FlowRunRequest<'a> {
    fn from_request(request: &RelayRequest<'a>) -> Result<Self, RelayError> {
        let conversation_history = if request.history.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(request.history)
                    .map_err(|e| RelayError::Malformed(e.to_string()))?,
            )
        };
        Ok(FlowRunRequest {
            input_value: request.message,
            output_type: "chat",
            input_type: "chat",
            user: request.user,
            session_id: request.session_id,
            conversation_history,
        })
    }
}

/// HTTP client for the flow service.
#[derive(Debug, Clone)]
pub struct FlowRelay {
    client: Client,
    url: String,
    token: Option<String>,
    timeout: Duration,
}

impl FlowRelay {
    pub fn new(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.relay_timeout).build()?;
        Ok(FlowRelay {
            client,
            url: config.flow_url(),
            token: config.flow_api_token.clone(),
            timeout: config.relay_timeout,
        })
    }

    fn classify(&self, e: reqwest::Error) -> RelayError {
        if e.is_timeout() {
            RelayError::Timeout(self.timeout)
        } else {
            RelayError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl ChatRelay for FlowRelay {
    async fn send(&self, request: RelayRequest<'_>) -> Result<String, RelayError> {
        let token = self.token.as_deref().ok_or(RelayError::MissingToken)?;
        let payload = FlowRunRequest::from_request(&request)?;

        info!(
            "Relaying message for {} (session {}, {} prior messages)",
            request.user,
            request.session_id,
            request.history.len()
        );

        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", token))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!("HTTP request error: {}", e);
                self.classify(e)
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            error!("Error response from chat service ({}): {}", status, body);
            return Err(RelayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value =
            serde_json::from_str(&body).map_err(|e| RelayError::Malformed(e.to_string()))?;
        let reply = extract_reply(&value)?;
        debug!("Chat service replied with {} chars", reply.len());
        Ok(reply)
    }
}

/// Pulls the reply text out of a flow run response.
pub fn extract_reply(response: &Value) -> Result<String, RelayError> {
    response
        .pointer(REPLY_POINTER)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RelayError::MissingField(REPLY_POINTER.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_ADMIN_USERNAME;
    use crate::models::MessageRole;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    fn config(base: &str, token: Option<&str>) -> AppConfig {
        AppConfig {
            bind_address: "127.0.0.1:0".to_string(),
            database_url: "sqlite::memory:".to_string(),
            users_file: "users.json".to_string(),
            community_file: "community_posts.json".to_string(),
            flow_base_url: base.to_string(),
            flow_endpoint: "flow".to_string(),
            flow_api_token: token.map(str::to_string),
            relay_timeout: Duration::from_secs(2),
            admin_username: DEFAULT_ADMIN_USERNAME.to_string(),
            jwt_secret: "secret".to_string(),
            session_idle: Duration::from_secs(60),
            password_hash_rounds: 1_000,
        }
    }

    fn request<'a>(history: &'a [Message]) -> RelayRequest<'a> {
        RelayRequest {
            message: "Where should I stay?",
            history,
            user: "alice",
            session_id: "s1",
        }
    }

    #[test]
    fn extracts_nested_reply() {
        let body = json!({
            "outputs": [{
                "outputs": [{
                    "results": { "message": { "text": "Try Palo Alto." } }
                }]
            }]
        });
        assert_eq!(extract_reply(&body).unwrap(), "Try Palo Alto.");
    }

    #[test]
    fn missing_keys_are_reported() {
        for body in [
            json!({}),
            json!({ "outputs": [] }),
            json!({ "outputs": [{ "outputs": [{ "results": {} }] }] }),
            json!({ "outputs": [{ "outputs": [{ "results": { "message": { "text": 5 } } }] }] }),
        ] {
            assert!(matches!(
                extract_reply(&body),
                Err(RelayError::MissingField(_))
            ));
        }
    }

    #[test]
    fn payload_omits_empty_history() {
        let payload = FlowRunRequest::from_request(&request(&[])).unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            json!({
                "input_value": "Where should I stay?",
                "output_type": "chat",
                "input_type": "chat",
                "user": "alice",
                "session_id": "s1",
            })
        );
    }

    #[test]
    fn payload_encodes_history_as_json_string() {
        let history = vec![Message::new(MessageRole::User, "hi", Some("alice"))];
        let payload = FlowRunRequest::from_request(&request(&history)).unwrap();
        let encoded = payload.conversation_history.unwrap();
        let decoded: Vec<Message> = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, history);
    }

    #[tokio::test]
    async fn missing_token_fails_before_any_request() {
        let relay = FlowRelay::new(&config("http://127.0.0.1:1", None)).unwrap();
        let err = relay.send(request(&[])).await.unwrap_err();
        assert!(matches!(err, RelayError::MissingToken));
        assert!(err.to_string().contains("not authorized"));
    }

    #[tokio::test]
    async fn unreachable_service_is_a_relay_error() {
        let relay = FlowRelay::new(&config("http://127.0.0.1:1", Some("token"))).unwrap();
        let err = relay.send(request(&[])).await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::Network(_) | RelayError::Timeout(_)
        ));
    }

    /// Reads one HTTP/1.1 request, head and `content-length` body.
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + len {
                    break;
                }
            }
        }
        String::from_utf8(buf).unwrap()
    }

    /// Answers a single request with `status` and `body`, yielding the raw request.
    async fn respond_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            request
        });
        (base, handle)
    }

    #[tokio::test]
    async fn sends_bearer_token_and_flow_payload() {
        let (base, server) = respond_once(
            "200 OK",
            r#"{"outputs":[{"outputs":[{"results":{"message":{"text":"Try Palo Alto."}}}]}]}"#,
        )
        .await;
        let relay = FlowRelay::new(&config(&base, Some("secret-token"))).unwrap();
        let history = vec![Message::new(MessageRole::User, "hi", Some("alice"))];

        let reply = relay.send(request(&history)).await.unwrap();
        assert_eq!(reply, "Try Palo Alto.");

        let raw = server.await.unwrap();
        let (head, body) = raw.split_once("\r\n\r\n").unwrap();
        assert!(head.starts_with("POST /api/v1/run/flow HTTP/1.1"));
        assert!(head
            .to_ascii_lowercase()
            .contains("authorization: bearer secret-token"));

        let payload: Value = serde_json::from_str(body).unwrap();
        assert_eq!(payload["input_value"], "Where should I stay?");
        assert_eq!(payload["output_type"], "chat");
        assert_eq!(payload["input_type"], "chat");
        assert_eq!(payload["user"], "alice");
        assert_eq!(payload["session_id"], "s1");
        let sent: Vec<Message> =
            serde_json::from_str(payload["conversation_history"].as_str().unwrap()).unwrap();
        assert_eq!(sent, history);
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let (base, _server) = respond_once("200 OK", "hello").await;
        let relay = FlowRelay::new(&config(&base, Some("token"))).unwrap();
        let err = relay.send(request(&[])).await.unwrap_err();
        assert!(matches!(err, RelayError::Malformed(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn error_status_carries_status_and_body() {
        let (base, _server) = respond_once("500 Internal Server Error", "boom").await;
        let relay = FlowRelay::new(&config(&base, Some("token"))).unwrap();
        match relay.send(request(&[])).await.unwrap_err() {
            RelayError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn json_without_reply_is_missing_field() {
        let (base, _server) = respond_once("200 OK", r#"{"outputs":[]}"#).await;
        let relay = FlowRelay::new(&config(&base, Some("token"))).unwrap();
        let err = relay.send(request(&[])).await.unwrap_err();
        assert!(matches!(err, RelayError::MissingField(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn silent_service_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let _server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let mut config = config(&base, Some("token"));
        config.relay_timeout = Duration::from_secs(1);
        let relay = FlowRelay::new(&config).unwrap();

        let err = relay.send(request(&[])).await.unwrap_err();
        match err {
            RelayError::Timeout(limit) => assert_eq!(limit, Duration::from_secs(1)),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
