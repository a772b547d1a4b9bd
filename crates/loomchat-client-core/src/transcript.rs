use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::stream::StreamEvent;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub id: String,
    pub role: SpeakerRole,
    pub text: String,
    pub streaming: bool,
}

/// Ordered transcript fed by the reply stream. Mutation methods return
/// whether anything visible changed so the caller can skip re-rendering.
#[derive(Debug, Clone)]
pub struct TranscriptState {
    thread_id: Option<String>,
    messages: Vec<TranscriptMessage>,
    next_local_id: u64,
    index_by_remote_id: BTreeMap<String, usize>,
    pending_local_user_texts: Vec<String>,
}

impl Default for TranscriptState {
    fn default() -> Self {
        Self {
            thread_id: None,
            messages: Vec::new(),
            next_local_id: 1,
            index_by_remote_id: BTreeMap::new(),
            pending_local_user_texts: Vec::new(),
        }
    }
}

impl TranscriptState {
    #[must_use]
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    #[must_use]
    pub fn messages(&self) -> &[TranscriptMessage] {
        &self.messages
    }

    /// Switching threads resets the transcript; setting the same id again is
    /// a no-op.
    pub fn set_thread_id(&mut self, thread_id: Option<String>) {
        if self.thread_id == thread_id {
            return;
        }
        self.thread_id = thread_id;
        self.messages.clear();
        self.next_local_id = 1;
        self.index_by_remote_id.clear();
        self.pending_local_user_texts.clear();
    }

    /// Echo the user's input immediately; the remote copy of the same text
    /// is suppressed when the stream plays it back.
    pub fn append_local_user_message(&mut self, text: &str) -> bool {
        let normalized = text.trim().to_string();
        if normalized.is_empty() {
            return false;
        }
        self.pending_local_user_texts.push(normalized.clone());
        let id = format!("local:user:{}", self.next_local_id);
        self.push_message(SpeakerRole::User, normalized, false, Some(id));
        true
    }

    pub fn apply_event(&mut self, event: &StreamEvent) -> bool {
        match event {
            StreamEvent::Metadata { thread_id } => self.adopt_thread(thread_id.as_deref()),
            StreamEvent::PartialMessages(messages) => {
                let mut changed = false;
                for message in messages {
                    if self.upsert_remote_message(message, true) {
                        changed = true;
                    }
                }
                changed
            }
            StreamEvent::CompleteMessages(messages) => {
                let mut changed = false;
                for message in messages {
                    if self.upsert_remote_message(message, false) {
                        changed = true;
                    }
                }
                changed
            }
            StreamEvent::StreamError { message } => {
                let mut changed = self.finalize_streams();
                if self.append_system_once(message) {
                    changed = true;
                }
                changed
            }
            StreamEvent::End => self.finalize_streams(),
            StreamEvent::Other { .. } => false,
        }
    }

    /// Seed the transcript from durable thread state. Never overwrites a
    /// transcript that already has content for the same thread.
    pub fn hydrate_history_if_empty(
        &mut self,
        thread_id: Option<String>,
        history: &[Value],
    ) -> bool {
        let mut changed = false;
        if self.thread_id != thread_id {
            self.set_thread_id(thread_id);
            changed = true;
        }

        if !self.messages.is_empty() || history.is_empty() {
            return changed;
        }

        for message in history {
            if self.upsert_remote_message(message, false) {
                changed = true;
            }
        }
        self.index_by_remote_id.clear();
        changed
    }

    fn adopt_thread(&mut self, incoming: Option<&str>) -> bool {
        let Some(incoming) = incoming else {
            return false;
        };
        if self.thread_id.is_none() {
            // Adopting the id mid-stream must not clear the local echo, so
            // the slot is written directly rather than via set_thread_id.
            self.thread_id = Some(incoming.to_string());
            return true;
        }
        false
    }

    fn upsert_remote_message(&mut self, message: &Value, streaming: bool) -> bool {
        let Some(text) = message_text(message) else {
            return false;
        };
        let role = message_role(message);

        if role == SpeakerRole::User && self.consume_pending_user_text(&text) {
            return false;
        }

        let remote_id = message
            .get("id")
            .and_then(Value::as_str)
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .map(|id| id.to_string());

        if let Some(remote_id) = &remote_id {
            if let Some(index) = self.index_by_remote_id.get(remote_id).copied() {
                if let Some(entry) = self.messages.get_mut(index) {
                    let mut changed = false;
                    if entry.text != text {
                        entry.text = text;
                        changed = true;
                    }
                    if entry.streaming != streaming {
                        entry.streaming = streaming;
                        changed = true;
                    }
                    return changed;
                }
            }
        }

        let id = remote_id.clone();
        self.push_message(role, text, streaming, id);
        if let Some(remote_id) = remote_id {
            self.index_by_remote_id
                .insert(remote_id, self.messages.len().saturating_sub(1));
        }
        true
    }

    fn append_system_once(&mut self, message: &str) -> bool {
        let normalized = message.trim().to_string();
        if normalized.is_empty() {
            return false;
        }
        if self
            .messages
            .last()
            .is_some_and(|entry| entry.role == SpeakerRole::System && entry.text == normalized)
        {
            return false;
        }
        self.push_message(SpeakerRole::System, normalized, false, None);
        true
    }

    fn consume_pending_user_text(&mut self, text: &str) -> bool {
        let normalized = text.trim();
        if normalized.is_empty() {
            return false;
        }
        if let Some(index) = self
            .pending_local_user_texts
            .iter()
            .position(|entry| entry == normalized)
        {
            self.pending_local_user_texts.remove(index);
            true
        } else {
            false
        }
    }

    fn finalize_streams(&mut self) -> bool {
        let mut changed = false;
        for message in &mut self.messages {
            if message.streaming {
                message.streaming = false;
                changed = true;
            }
        }
        if changed {
            self.index_by_remote_id.clear();
        }
        changed
    }

    fn push_message(
        &mut self,
        role: SpeakerRole,
        text: String,
        streaming: bool,
        explicit_id: Option<String>,
    ) {
        if text.trim().is_empty() {
            return;
        }
        let id = explicit_id.unwrap_or_else(|| format!("msg:{}", self.next_local_id));
        self.next_local_id = self.next_local_id.saturating_add(1);
        self.messages.push(TranscriptMessage {
            id,
            role,
            text,
            streaming,
        });
    }
}

/// Message payloads are opaque; only the common text shapes are understood
/// for display: a plain `content` string, or a content-block array whose
/// entries carry `text` fields.
#[must_use]
pub fn message_text(message: &Value) -> Option<String> {
    if let Some(text) = message.get("content").and_then(Value::as_str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        return Some(trimmed.to_string());
    }

    if let Some(blocks) = message.get("content").and_then(Value::as_array) {
        let parts: Vec<&str> = blocks
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();
        if parts.is_empty() {
            return None;
        }
        return Some(parts.join("\n"));
    }

    None
}

#[must_use]
pub fn message_role(message: &Value) -> SpeakerRole {
    match message
        .get("type")
        .or_else(|| message.get("role"))
        .and_then(Value::as_str)
        .unwrap_or_default()
    {
        "human" | "user" => SpeakerRole::User,
        "ai" | "assistant" => SpeakerRole::Assistant,
        _ => SpeakerRole::System,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn partial(messages: Vec<Value>) -> StreamEvent {
        StreamEvent::PartialMessages(messages)
    }

    #[test]
    fn partial_snapshots_replace_by_message_id() {
        let mut state = TranscriptState::default();
        assert!(state.apply_event(&partial(vec![
            json!({"id": "m1", "type": "ai", "content": "Hel"}),
        ])));
        assert!(state.apply_event(&partial(vec![
            json!({"id": "m1", "type": "ai", "content": "Hello there"}),
        ])));

        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.messages()[0].text, "Hello there");
        assert!(state.messages()[0].streaming);
    }

    #[test]
    fn identical_partial_snapshot_reports_no_change() {
        let mut state = TranscriptState::default();
        let snapshot = partial(vec![json!({"id": "m1", "type": "ai", "content": "Hi"})]);
        assert!(state.apply_event(&snapshot));
        assert!(!state.apply_event(&snapshot));
    }

    #[test]
    fn complete_event_finalizes_the_message() {
        let mut state = TranscriptState::default();
        assert!(state.apply_event(&partial(vec![
            json!({"id": "m1", "type": "ai", "content": "Hello"}),
        ])));
        assert!(state.apply_event(&StreamEvent::CompleteMessages(vec![
            json!({"id": "m1", "type": "ai", "content": "Hello."}),
        ])));

        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.messages()[0].text, "Hello.");
        assert!(!state.messages()[0].streaming);
    }

    #[test]
    fn end_event_clears_all_streaming_flags() {
        let mut state = TranscriptState::default();
        assert!(state.apply_event(&partial(vec![
            json!({"id": "m1", "type": "ai", "content": "partial answer"}),
        ])));
        assert!(state.apply_event(&StreamEvent::End));
        assert!(!state.messages()[0].streaming);
        assert!(!state.apply_event(&StreamEvent::End));
    }

    #[test]
    fn local_echo_suppresses_remote_copy_of_same_user_text() {
        let mut state = TranscriptState::default();
        assert!(state.append_local_user_message("who are you?"));
        let changed = state.apply_event(&StreamEvent::CompleteMessages(vec![
            json!({"id": "u-remote", "type": "human", "content": "who are you?"}),
        ]));
        assert!(!changed);
        assert_eq!(state.messages().len(), 1);
    }

    #[test]
    fn metadata_adopts_thread_id_without_clearing_echo() {
        let mut state = TranscriptState::default();
        assert!(state.append_local_user_message("hello"));
        assert!(state.apply_event(&StreamEvent::Metadata {
            thread_id: Some("T1".to_string())
        }));
        assert_eq!(state.thread_id(), Some("T1"));
        assert_eq!(state.messages().len(), 1);

        // An already-adopted thread is not overwritten.
        assert!(!state.apply_event(&StreamEvent::Metadata {
            thread_id: Some("T2".to_string())
        }));
        assert_eq!(state.thread_id(), Some("T1"));
    }

    #[test]
    fn stream_error_lands_as_one_system_line_and_finalizes() {
        let mut state = TranscriptState::default();
        assert!(state.apply_event(&partial(vec![
            json!({"id": "m1", "type": "ai", "content": "Partial"}),
        ])));
        let error = StreamEvent::StreamError {
            message: "recursion limit".to_string(),
        };
        assert!(state.apply_event(&error));
        assert!(!state.apply_event(&error));

        let system_lines = state
            .messages()
            .iter()
            .filter(|message| message.role == SpeakerRole::System)
            .count();
        assert_eq!(system_lines, 1);
        assert!(!state.messages()[0].streaming);
    }

    #[test]
    fn hydrate_seeds_empty_transcript() {
        let mut state = TranscriptState::default();
        let history = vec![
            json!({"id": "m1", "type": "human", "content": "hello"}),
            json!({"id": "m2", "type": "ai", "content": "hi there"}),
        ];
        assert!(state.hydrate_history_if_empty(Some("T1".to_string()), &history));
        assert_eq!(state.thread_id(), Some("T1"));
        assert_eq!(state.messages().len(), 2);
        assert_eq!(state.messages()[0].role, SpeakerRole::User);
        assert_eq!(state.messages()[1].text, "hi there");
    }

    #[test]
    fn hydrate_does_not_overwrite_populated_transcript() {
        let mut state = TranscriptState::default();
        state.set_thread_id(Some("T1".to_string()));
        assert!(state.append_local_user_message("pending local message"));

        let changed = state.hydrate_history_if_empty(
            Some("T1".to_string()),
            &[json!({"id": "m1", "type": "ai", "content": "history response"})],
        );
        assert!(!changed);
        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.messages()[0].text, "pending local message");
    }

    #[test]
    fn switching_threads_resets_the_transcript() {
        let mut state = TranscriptState::default();
        assert!(state.append_local_user_message("first thread"));
        state.set_thread_id(Some("T2".to_string()));
        assert!(state.messages().is_empty());

        state.set_thread_id(Some("T2".to_string()));
        assert!(state.messages().is_empty());
    }

    #[test]
    fn content_block_arrays_join_text_parts() {
        let message = json!({
            "id": "m1",
            "type": "ai",
            "content": [
                {"type": "text", "text": "first"},
                {"type": "tool_use", "name": "search"},
                {"type": "text", "text": "second"},
            ],
        });
        assert_eq!(message_text(&message).as_deref(), Some("first\nsecond"));
    }

    #[test]
    fn unrecognized_roles_fall_back_to_system() {
        assert_eq!(message_role(&json!({"type": "tool"})), SpeakerRole::System);
        assert_eq!(message_role(&json!({"role": "assistant"})), SpeakerRole::Assistant);
        assert_eq!(message_role(&json!({})), SpeakerRole::System);
    }
}
