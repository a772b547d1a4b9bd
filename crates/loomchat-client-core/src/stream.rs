use serde_json::Value;

/// One complete server-sent event frame: an event name plus the joined data
/// payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Accumulates raw network chunks and yields complete SSE frames. Frames may
/// arrive split across arbitrary chunk boundaries; partial frames stay
/// buffered until their terminating blank line shows up.
#[derive(Debug, Default)]
pub struct SseFrameBuffer {
    pending: String,
}

impl SseFrameBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame completed by it.
    pub fn push(&mut self, chunk: &str) -> Vec<SseFrame> {
        self.pending.push_str(chunk);
        let mut frames = Vec::new();
        while let Some(boundary) = find_frame_boundary(&self.pending) {
            let block = self.pending[..boundary.start].to_string();
            self.pending.drain(..boundary.end);
            if let Some(frame) = parse_frame_block(&block) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush whatever is left at end of stream. Servers normally terminate
    /// the last frame, but a connection can drop mid-frame.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let block = std::mem::take(&mut self.pending);
        parse_frame_block(&block)
    }
}

struct FrameBoundary {
    start: usize,
    end: usize,
}

fn find_frame_boundary(buffer: &str) -> Option<FrameBoundary> {
    let lf = buffer.find("\n\n").map(|index| FrameBoundary {
        start: index,
        end: index + 2,
    });
    let crlf = buffer.find("\r\n\r\n").map(|index| FrameBoundary {
        start: index,
        end: index + 4,
    });
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.start <= b.start { a } else { b }),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn parse_frame_block(block: &str) -> Option<SseFrame> {
    let mut event = String::new();
    let mut data_lines: Vec<&str> = Vec::new();

    for raw_line in block.lines() {
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = field_value(line, "event") {
            event = value.to_string();
        } else if let Some(value) = field_value(line, "data") {
            data_lines.push(value);
        }
        // id: and retry: fields are not used by this client.
    }

    if event.is_empty() && data_lines.is_empty() {
        return None;
    }

    Some(SseFrame {
        event: if event.is_empty() {
            "message".to_string()
        } else {
            event
        },
        data: data_lines.join("\n"),
    })
}

fn field_value<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(field)?;
    let rest = rest.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("stream_event_decode_failed:{event}:{message}")]
pub struct StreamDecodeError {
    pub event: String,
    pub message: String,
}

/// Decoded reply-stream event. Message payloads stay opaque; only the
/// envelope is interpreted here.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Run bookkeeping emitted at stream start; may carry the thread id.
    Metadata { thread_id: Option<String> },
    /// Accumulated in-progress messages, full snapshots keyed by message id.
    PartialMessages(Vec<Value>),
    /// Finalized messages.
    CompleteMessages(Vec<Value>),
    /// Server-reported failure; terminates the turn.
    StreamError { message: String },
    /// End of stream.
    End,
    /// Event kinds this client does not interpret.
    Other { event: String },
}

impl StreamEvent {
    pub fn decode(frame: &SseFrame) -> Result<Self, StreamDecodeError> {
        match frame.event.as_str() {
            "metadata" => {
                let value = parse_data(frame)?;
                let thread_id = value
                    .get("thread_id")
                    .and_then(Value::as_str)
                    .map(|id| id.trim())
                    .filter(|id| !id.is_empty())
                    .map(|id| id.to_string());
                Ok(Self::Metadata { thread_id })
            }
            "messages/partial" => Ok(Self::PartialMessages(parse_message_list(frame)?)),
            "messages/complete" => Ok(Self::CompleteMessages(parse_message_list(frame)?)),
            "error" => {
                let message = match serde_json::from_str::<Value>(&frame.data) {
                    Ok(Value::String(text)) => text,
                    Ok(value) => value
                        .get("message")
                        .or_else(|| value.get("error"))
                        .and_then(Value::as_str)
                        .unwrap_or("stream error")
                        .to_string(),
                    Err(_) => frame.data.trim().to_string(),
                };
                Ok(Self::StreamError { message })
            }
            "end" => Ok(Self::End),
            other => Ok(Self::Other {
                event: other.to_string(),
            }),
        }
    }
}

fn parse_data(frame: &SseFrame) -> Result<Value, StreamDecodeError> {
    serde_json::from_str(&frame.data).map_err(|error| StreamDecodeError {
        event: frame.event.clone(),
        message: error.to_string(),
    })
}

fn parse_message_list(frame: &SseFrame) -> Result<Vec<Value>, StreamDecodeError> {
    match parse_data(frame)? {
        Value::Array(messages) => Ok(messages),
        // A single bare message object is accepted for robustness.
        other @ Value::Object(_) => Ok(vec![other]),
        _ => Err(StreamDecodeError {
            event: frame.event.clone(),
            message: "expected a message array".to_string(),
        }),
    }
}
