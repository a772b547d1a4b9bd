//! HTTP client for the remote thread service: thread creation, durable
//! state fetch, and streamed run submission. Requests are single-attempt;
//! failures surface verbatim to the caller.

use std::collections::VecDeque;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use loomchat_client_core::session::{
    SendMessageRequest, ThreadApi, ThreadCreated, ThreadStateSnapshot,
};
use loomchat_client_core::stream::{SseFrame, SseFrameBuffer, StreamEvent};

pub const ENV_THREAD_BASE_URL: &str = "LOOMCHAT_THREAD_BASE_URL";
pub const ENV_THREAD_API_KEY: &str = "LOOMCHAT_THREAD_API_KEY";
pub const ENV_ASSISTANT_ID: &str = "LOOMCHAT_ASSISTANT_ID";

pub const DEFAULT_ASSISTANT_ID: &str = "agent";

const RUN_STREAM_MODES: &[&str] = &["messages"];

#[derive(Debug, Clone)]
pub struct ThreadServiceConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub assistant_id: String,
}

impl ThreadServiceConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            assistant_id: DEFAULT_ASSISTANT_ID.to_string(),
        }
    }

    pub fn from_env() -> Result<Self, ThreadClientError> {
        let base_url =
            env_non_empty(ENV_THREAD_BASE_URL).ok_or(ThreadClientError::BaseUrlMissing)?;
        Ok(Self {
            base_url,
            api_key: env_non_empty(ENV_THREAD_API_KEY),
            assistant_id: env_non_empty(ENV_ASSISTANT_ID)
                .unwrap_or_else(|| DEFAULT_ASSISTANT_ID.to_string()),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ThreadClientError {
    #[error("thread_base_url_missing")]
    BaseUrlMissing,
    #[error("thread_invalid_path")]
    InvalidPath,
    #[error("thread_request_failed:{message}")]
    Request { message: String },
    #[error("thread_read_failed:{message}")]
    Read { message: String },
    #[error("thread_http_{status}:{body}")]
    Http { status: StatusCode, body: String },
    #[error("thread_json_decode_failed:{message}")]
    Decode { message: String },
}

#[derive(Debug, Clone)]
pub struct ThreadServiceClient {
    base_url: String,
    api_key: Option<String>,
    assistant_id: String,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct RunInput<'a> {
    messages: &'a [Value],
}

#[derive(Debug, Serialize)]
struct RunStreamBody<'a> {
    assistant_id: &'a str,
    input: RunInput<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<&'a Value>,
    stream_mode: &'a [&'a str],
}

impl ThreadServiceClient {
    pub fn new(config: ThreadServiceConfig) -> Result<Self, ThreadClientError> {
        let base_url = normalize_base_url(&config.base_url)?;
        Ok(Self {
            base_url,
            api_key: config.api_key,
            assistant_id: config.assistant_id,
            http: reqwest::Client::new(),
        })
    }

    pub fn from_env() -> Result<Self, ThreadClientError> {
        Self::new(ThreadServiceConfig::from_env()?)
    }

    #[must_use]
    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            Some(format!("{}{}", self.base_url, trimmed))
        } else {
            Some(format!("{}/{}", self.base_url, trimmed))
        }
    }

    #[must_use]
    pub fn threads_path() -> &'static str {
        "/threads"
    }

    #[must_use]
    pub fn thread_state_path(thread_id: &str) -> String {
        format!("/threads/{}/state", thread_id.trim())
    }

    #[must_use]
    pub fn runs_stream_path(thread_id: &str) -> String {
        format!("/threads/{}/runs/stream", thread_id.trim())
    }

    /// `POST /threads`: the service mints and owns the thread id.
    pub async fn create_thread(&self) -> Result<ThreadCreated, ThreadClientError> {
        self.post_json(Self::threads_path(), &serde_json::json!({}))
            .await
    }

    /// `GET /threads/{id}/state`: durable state for an existing thread.
    pub async fn thread_state(
        &self,
        thread_id: &str,
    ) -> Result<ThreadStateSnapshot, ThreadClientError> {
        self.get_json(Self::thread_state_path(thread_id).as_str())
            .await
    }

    /// `POST /threads/{id}/runs/stream`: submit one turn and open the
    /// reply stream.
    pub async fn send_message(
        &self,
        request: &SendMessageRequest,
    ) -> Result<ReplyStream, ThreadClientError> {
        let path = Self::runs_stream_path(&request.thread_id);
        let url = self.endpoint(&path).ok_or(ThreadClientError::InvalidPath)?;
        let body = RunStreamBody {
            assistant_id: &self.assistant_id,
            input: RunInput {
                messages: &request.messages,
            },
            command: request.command.as_ref(),
            stream_mode: RUN_STREAM_MODES,
        };

        let builder = self
            .http
            .post(url.as_str())
            .header("x-request-id", request_id())
            .header("accept", "text/event-stream")
            .json(&body);
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|error| ThreadClientError::Request {
                message: error.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(|error| ThreadClientError::Read {
                    message: error.to_string(),
                })?;
            return Err(format_http_error(status, &bytes));
        }

        tracing::debug!(thread_id = %request.thread_id, "run stream opened");
        Ok(ReplyStream::new(response))
    }

    pub async fn get_json<T>(&self, path: &str) -> Result<T, ThreadClientError>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let url = self.endpoint(path).ok_or(ThreadClientError::InvalidPath)?;
        let builder = self
            .http
            .get(url.as_str())
            .header("x-request-id", request_id());
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|error| ThreadClientError::Request {
                message: error.to_string(),
            })?;
        decode_json_response(response).await
    }

    pub async fn post_json<Req, Res>(
        &self,
        path: &str,
        payload: &Req,
    ) -> Result<Res, ThreadClientError>
    where
        Req: Serialize + ?Sized,
        Res: for<'de> serde::Deserialize<'de>,
    {
        let url = self.endpoint(path).ok_or(ThreadClientError::InvalidPath)?;
        let builder = self
            .http
            .post(url.as_str())
            .header("x-request-id", request_id())
            .json(payload);
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|error| ThreadClientError::Request {
                message: error.to_string(),
            })?;
        decode_json_response(response).await
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(api_key) => builder.header("x-api-key", api_key),
            None => builder,
        }
    }
}

#[async_trait]
impl ThreadApi for ThreadServiceClient {
    type Error = ThreadClientError;
    type Reply = ReplyStream;

    async fn create_thread(&self) -> Result<ThreadCreated, ThreadClientError> {
        Self::create_thread(self).await
    }

    async fn thread_state(&self, thread_id: &str) -> Result<ThreadStateSnapshot, ThreadClientError> {
        Self::thread_state(self, thread_id).await
    }

    async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<ReplyStream, ThreadClientError> {
        Self::send_message(self, &request).await
    }
}

/// Incremental view of one run's reply. Frames are decoded as chunks
/// arrive; undecodable frames are skipped. Dropping the stream abandons the
/// transfer.
#[derive(Debug)]
pub struct ReplyStream {
    response: reqwest::Response,
    buffer: SseFrameBuffer,
    queued: VecDeque<StreamEvent>,
    done: bool,
}

impl ReplyStream {
    fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buffer: SseFrameBuffer::new(),
            queued: VecDeque::new(),
            done: false,
        }
    }

    /// Next decoded event, or `None` once the server closes the stream.
    pub async fn next_event(&mut self) -> Result<Option<StreamEvent>, ThreadClientError> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Ok(Some(event));
            }
            if self.done {
                return Ok(None);
            }
            match self.response.chunk().await {
                Ok(Some(bytes)) => {
                    let text = String::from_utf8_lossy(&bytes);
                    let frames = self.buffer.push(&text);
                    for frame in frames {
                        self.enqueue(frame);
                    }
                }
                Ok(None) => {
                    self.done = true;
                    if let Some(frame) = self.buffer.finish() {
                        self.enqueue(frame);
                    }
                }
                Err(error) => {
                    self.done = true;
                    return Err(ThreadClientError::Read {
                        message: error.to_string(),
                    });
                }
            }
        }
    }

    fn enqueue(&mut self, frame: SseFrame) {
        match StreamEvent::decode(&frame) {
            Ok(event) => self.queued.push_back(event),
            Err(error) => {
                tracing::warn!(%error, "skipping undecodable stream frame");
            }
        }
    }
}

pub fn format_http_error(status: StatusCode, body: &[u8]) -> ThreadClientError {
    let body = String::from_utf8_lossy(body);
    let body = body.trim();
    let body = if body.is_empty() { "<empty>" } else { body };
    ThreadClientError::Http {
        status,
        body: body.to_string(),
    }
}

fn request_id() -> String {
    format!("req_{}", Uuid::new_v4().simple())
}

fn normalize_base_url(base_url: &str) -> Result<String, ThreadClientError> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(ThreadClientError::BaseUrlMissing);
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

async fn decode_json_response<T>(response: reqwest::Response) -> Result<T, ThreadClientError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|error| ThreadClientError::Read {
            message: error.to_string(),
        })?;

    if !status.is_success() {
        return Err(format_http_error(status, &bytes));
    }

    serde_json::from_slice::<T>(&bytes).map_err(|error| ThreadClientError::Decode {
        message: error.to_string(),
    })
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn with_env<T>(overrides: &[(&str, Option<&str>)], test: impl FnOnce() -> T) -> T {
        let lock = ENV_LOCK.get_or_init(|| Mutex::new(()));
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let previous = overrides
            .iter()
            .map(|(key, _)| (*key, std::env::var(key).ok()))
            .collect::<Vec<_>>();

        for (key, value) in overrides {
            if let Some(value) = value {
                unsafe { std::env::set_var(key, value) };
            } else {
                unsafe { std::env::remove_var(key) };
            }
        }

        let result = test();

        for (key, value) in previous {
            if let Some(value) = value {
                unsafe { std::env::set_var(key, value) };
            } else {
                unsafe { std::env::remove_var(key) };
            }
        }

        result
    }

    fn client(base_url: &str) -> ThreadServiceClient {
        ThreadServiceClient::new(ThreadServiceConfig::new(base_url)).expect("thread client")
    }

    #[test]
    fn endpoint_builder_normalizes_paths() {
        let client = client("https://threads.example.com/");
        assert_eq!(
            client.endpoint("/threads"),
            Some("https://threads.example.com/threads".to_string())
        );
        assert_eq!(
            client.endpoint("threads"),
            Some("https://threads.example.com/threads".to_string())
        );
        assert_eq!(client.endpoint(""), None);
    }

    #[test]
    fn path_helpers_are_deterministic() {
        assert_eq!(ThreadServiceClient::threads_path(), "/threads");
        assert_eq!(
            ThreadServiceClient::thread_state_path(" T1 "),
            "/threads/T1/state"
        );
        assert_eq!(
            ThreadServiceClient::runs_stream_path("T1"),
            "/threads/T1/runs/stream"
        );
    }

    #[test]
    fn http_error_mapping_preserves_shape() {
        let error = format_http_error(StatusCode::BAD_GATEWAY, b" gateway failed ");
        assert_eq!(
            error.to_string(),
            "thread_http_502 Bad Gateway:gateway failed"
        );

        let empty_body = format_http_error(StatusCode::SERVICE_UNAVAILABLE, b" ");
        assert_eq!(
            empty_body.to_string(),
            "thread_http_503 Service Unavailable:<empty>"
        );
    }

    #[test]
    fn base_url_missing_is_rejected() {
        let result = ThreadServiceClient::new(ThreadServiceConfig::new("   "));
        assert!(matches!(result, Err(ThreadClientError::BaseUrlMissing)));
    }

    #[test]
    fn run_body_omits_absent_command() {
        let messages = vec![json!({"type": "human", "content": "hi"})];
        let body = RunStreamBody {
            assistant_id: "agent",
            input: RunInput {
                messages: &messages,
            },
            command: None,
            stream_mode: RUN_STREAM_MODES,
        };
        let encoded = serde_json::to_value(&body).expect("run body");
        assert_eq!(
            encoded,
            json!({
                "assistant_id": "agent",
                "input": {"messages": [{"type": "human", "content": "hi"}]},
                "stream_mode": ["messages"],
            })
        );
    }

    #[test]
    fn run_body_passes_command_verbatim() {
        let messages: Vec<Value> = Vec::new();
        let command = json!({"resume": "approved"});
        let body = RunStreamBody {
            assistant_id: "agent",
            input: RunInput {
                messages: &messages,
            },
            command: Some(&command),
            stream_mode: RUN_STREAM_MODES,
        };
        let encoded = serde_json::to_value(&body).expect("run body");
        assert_eq!(encoded.get("command"), Some(&command));
    }

    #[test]
    fn config_resolves_from_env_with_assistant_default() {
        with_env(
            &[
                (ENV_THREAD_BASE_URL, Some("https://threads.example.com/")),
                (ENV_THREAD_API_KEY, None),
                (ENV_ASSISTANT_ID, None),
            ],
            || {
                let config = ThreadServiceConfig::from_env().expect("config");
                assert_eq!(config.base_url, "https://threads.example.com");
                assert_eq!(config.api_key, None);
                assert_eq!(config.assistant_id, DEFAULT_ASSISTANT_ID);
            },
        );
    }

    #[test]
    fn config_requires_base_url() {
        with_env(&[(ENV_THREAD_BASE_URL, None)], || {
            let error = ThreadServiceConfig::from_env().expect_err("missing base url");
            assert!(matches!(error, ThreadClientError::BaseUrlMissing));
        });
    }
}
