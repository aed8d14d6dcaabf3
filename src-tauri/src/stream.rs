//! Server-sent event consumption for chat replies.
//!
//! The backend writes one `data:` line per delta. A payload is either raw text,
//! a JSON string, or a JSON object (citations, completion, error). The stream
//! ends with `[DONE]` or a completion object.

use crate::api::models::SourceNode;
use crate::error::{ClientError, Result};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;

/// One `data:` line plus the `event:` name in effect when it arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental line splitter. Bytes are buffered until a newline so multi-byte
/// characters split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            if let Some(frame) = self.take_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing line that never got its newline.
    pub fn finish(&mut self) -> Vec<SseFrame> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let line = String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).into_owned();
        self.take_line(&line).into_iter().collect()
    }

    fn take_line(&mut self, line: &str) -> Option<SseFrame> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            self.event = None;
            return None;
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => {
                self.event = Some(value.trim().to_string());
                None
            }
            "data" => Some(SseFrame {
                event: self.event.clone(),
                data: value.to_string(),
            }),
            _ => None,
        }
    }
}

/// Terminal object some backends send instead of `[DONE]`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Completion {
    #[serde(default, alias = "source_nodes")]
    pub sources: Option<Vec<SourceNode>>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Delta(String),
    Sources(Vec<SourceNode>),
    Done(Option<Completion>),
    Error(String),
}

impl StreamEvent {
    /// Classify a frame. Returns `None` for keep-alives and unknown objects.
    pub fn from_frame(frame: &SseFrame) -> Option<StreamEvent> {
        let data = frame.data.as_str();
        if frame.event.as_deref() == Some("error") {
            return Some(StreamEvent::Error(data.to_string()));
        }
        if data.is_empty() {
            return None;
        }
        let trimmed = data.trim();
        if trimmed == "[DONE]" {
            return Some(StreamEvent::Done(None));
        }
        if trimmed.starts_with('{') {
            if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(trimmed) {
                return classify_object(obj);
            }
        }
        if trimmed.starts_with('"') {
            if let Ok(text) = serde_json::from_str::<String>(trimmed) {
                return Some(StreamEvent::Delta(text));
            }
        }
        Some(StreamEvent::Delta(data.to_string()))
    }
}

fn classify_object(obj: serde_json::Map<String, Value>) -> Option<StreamEvent> {
    if let Some(err) = obj.get("error") {
        let message = err
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Some(StreamEvent::Error(message));
    }

    let kind = obj.get("type").and_then(Value::as_str);
    let done = obj.get("done").and_then(Value::as_bool).unwrap_or(false)
        || matches!(kind, Some("done") | Some("complete"));
    if done {
        let completion = serde_json::from_value::<Completion>(Value::Object(obj)).ok();
        return Some(StreamEvent::Done(completion));
    }

    let sources = obj.get("sources").or_else(|| obj.get("source_nodes"));
    if let Some(sources) = sources {
        return serde_json::from_value::<Vec<SourceNode>>(sources.clone())
            .ok()
            .map(StreamEvent::Sources);
    }

    ["delta", "content", "text"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(|text| StreamEvent::Delta(text.to_string()))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamOutcome {
    pub content: String,
    pub sources: Vec<SourceNode>,
    pub title: Option<String>,
    /// False when the transport closed without a terminal marker.
    pub completed: bool,
}

/// Drive a byte stream to its end, reporting every event to `on_event`.
pub async fn consume<S>(mut stream: S, mut on_event: impl FnMut(&StreamEvent)) -> Result<StreamOutcome>
where
    S: Stream<Item = Result<Vec<u8>>> + Unpin,
{
    let mut decoder = SseDecoder::new();
    let mut outcome = StreamOutcome::default();
    let mut received = false;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        for frame in decoder.push(&chunk) {
            if apply_frame(&frame, &mut outcome, &mut received, &mut on_event)? {
                return Ok(outcome);
            }
        }
    }
    for frame in decoder.finish() {
        if apply_frame(&frame, &mut outcome, &mut received, &mut on_event)? {
            return Ok(outcome);
        }
    }

    if !received {
        return Err(ClientError::Stream(
            "stream closed before any data arrived".into(),
        ));
    }
    log::warn!("chat stream ended without a terminal marker");
    Ok(outcome)
}

/// Returns `Ok(true)` once the terminal marker has been seen.
fn apply_frame(
    frame: &SseFrame,
    outcome: &mut StreamOutcome,
    received: &mut bool,
    on_event: &mut impl FnMut(&StreamEvent),
) -> Result<bool> {
    let Some(event) = StreamEvent::from_frame(frame) else {
        return Ok(false);
    };
    on_event(&event);
    match event {
        StreamEvent::Delta(text) => {
            *received = true;
            outcome.content.push_str(&text);
            Ok(false)
        }
        StreamEvent::Sources(sources) => {
            *received = true;
            outcome.sources = sources;
            Ok(false)
        }
        StreamEvent::Done(completion) => {
            if let Some(completion) = completion {
                if let Some(sources) = completion.sources {
                    outcome.sources = sources;
                }
                outcome.title = completion.title;
            }
            outcome.completed = true;
            Ok(true)
        }
        StreamEvent::Error(message) => Err(ClientError::Stream(message)),
    }
}
