use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response to thread creation: the service mints the id, the client only
/// ever references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadCreated {
    pub thread_id: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ThreadValues {
    #[serde(default)]
    pub messages: Vec<Value>,
}

/// Durable state of an existing thread as reported by the service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ThreadStateSnapshot {
    #[serde(default)]
    pub values: ThreadValues,
}

/// One outgoing turn. Messages and command are opaque payloads negotiated
/// between the transcript layer and the backend; this layer passes them
/// through verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct SendMessageRequest {
    pub thread_id: String,
    pub messages: Vec<Value>,
    pub command: Option<Value>,
}

/// The Chat API boundary: three logical operations against the remote
/// thread service. Implemented over HTTP by `loomchat-thread-client`; tests
/// substitute recording fakes.
#[async_trait]
pub trait ThreadApi {
    type Error;
    type Reply;

    async fn create_thread(&self) -> Result<ThreadCreated, Self::Error>;
    async fn thread_state(&self, thread_id: &str) -> Result<ThreadStateSnapshot, Self::Error>;
    async fn send_message(&self, request: SendMessageRequest) -> Result<Self::Reply, Self::Error>;
}

/// Session adapter over a [`ThreadApi`]: owns the single mutable thread-id
/// slot and the three lifecycle operations the chat surface drives.
///
/// The slot starts empty and is populated at most once per thread lifetime;
/// only a switch overwrites it. It lives as long as this value; dropping
/// and rebuilding the session is the only reset.
#[derive(Debug)]
pub struct ChatSession<T: ThreadApi> {
    api: T,
    thread_id: Option<String>,
}

impl<T: ThreadApi> ChatSession<T> {
    #[must_use]
    pub fn new(api: T) -> Self {
        Self {
            api,
            thread_id: None,
        }
    }

    #[must_use]
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// Send one turn, lazily materializing a thread on first use. Returns
    /// whatever the transport yields; failures propagate unchanged.
    pub async fn stream_reply(
        &mut self,
        messages: Vec<Value>,
        command: Option<Value>,
    ) -> Result<T::Reply, T::Error> {
        let thread_id = match self.thread_id.clone() {
            Some(existing) => existing,
            None => {
                let created = self.api.create_thread().await?;
                tracing::debug!(thread_id = %created.thread_id, "thread created lazily");
                self.thread_id = Some(created.thread_id.clone());
                created.thread_id
            }
        };
        self.api
            .send_message(SendMessageRequest {
                thread_id,
                messages,
                command,
            })
            .await
    }

    /// Unconditionally create a fresh thread and overwrite the slot. The
    /// previous thread is abandoned, not cleaned up.
    pub async fn start_new_session(&mut self) -> Result<String, T::Error> {
        let created = self.api.create_thread().await?;
        tracing::debug!(thread_id = %created.thread_id, "switched to new thread");
        self.thread_id = Some(created.thread_id.clone());
        Ok(created.thread_id)
    }

    /// Fetch durable state for an existing thread, adopt it as current, and
    /// return exactly the message history the service reported.
    pub async fn resume_session(&mut self, thread_id: &str) -> Result<Vec<Value>, T::Error> {
        let state = self.api.thread_state(thread_id).await?;
        self.thread_id = Some(thread_id.to_string());
        Ok(state.values.messages)
    }
}
