//! Wire types shared with the viva backend.
//!
//! Field names follow the JSON the server speaks (`session_id`, `event_type`,
//! `duration_seconds`, ...), so everything here derives serde directly.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Text sent to ask the server for the opening question. Never rendered.
pub const START_SENTINEL: &str = "__start__";

/// Opaque session token issued by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Sender {
    Student,
    Ai,
    System,
}

/// One transcript entry. Immutable once rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

/// RFC 3339, or a zone-less ISO timestamp read as UTC. Anything else is
/// dropped rather than failing the whole transcript.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(Value::String(raw)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    Ok(NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive)))
}

impl Message {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            timestamp: None,
        }
    }

    /// The start request echoed back, whoever the server attributes it to.
    pub fn is_start_sentinel(&self) -> bool {
        self.text.trim() == START_SENTINEL
    }

    pub fn segments(&self) -> Vec<MessageSegment> {
        MessageSegment::split(&self.text)
    }
}

/// A run of prose or a fenced code block inside a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageSegment {
    Text(String),
    Code(String),
}

impl MessageSegment {
    /// Split on triple-backtick fences. An unterminated fence is kept as text.
    pub fn split(text: &str) -> Vec<MessageSegment> {
        const FENCE: &str = "```";
        let mut segments = Vec::new();
        let mut rest = text;

        while let Some(open) = rest.find(FENCE) {
            let after_open = &rest[open + FENCE.len()..];
            let Some(close) = after_open.find(FENCE) else {
                break;
            };
            push_text(&mut segments, &rest[..open]);
            let code = after_open[..close].trim_matches('\n');
            if !code.is_empty() {
                segments.push(MessageSegment::Code(code.to_string()));
            }
            rest = &after_open[close + FENCE.len()..];
        }
        push_text(&mut segments, rest);
        segments
    }
}

fn push_text(segments: &mut Vec<MessageSegment>, text: &str) {
    let trimmed = text.trim_matches('\n');
    if !trimmed.trim().is_empty() {
        segments.push(MessageSegment::Text(trimmed.to_string()));
    }
}

/// `POST <send-endpoint>` for a regular message or the start sentinel.
#[derive(Debug, Clone, Serialize)]
pub struct SendRequest {
    pub session_id: SessionId,
    pub text: String,
}

/// `POST <send-endpoint>` closing the session.
#[derive(Debug, Clone, Serialize)]
pub struct EndRequest {
    pub session_id: SessionId,
    pub sender: Sender,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub ended: bool,
    pub duration_seconds: u64,
}

impl EndRequest {
    pub fn new(session_id: SessionId, text: Option<String>, duration_seconds: u64) -> Self {
        Self {
            session_id,
            sender: Sender::Student,
            text: text.filter(|t| !t.trim().is_empty()),
            ended: true,
            duration_seconds,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SendResponse {
    #[serde(default)]
    pub session_id: Option<Value>,
    #[serde(default)]
    pub attempts_left: Option<i64>,
    #[serde(default)]
    pub attempts_used: Option<i64>,
    #[serde(default)]
    pub included_submissions: Option<Vec<Value>>,
    #[serde(default)]
    pub ai_text: Option<String>,
    #[serde(default)]
    pub ai_model_answer: Option<String>,
    #[serde(default)]
    pub feedback_text: Option<String>,
    #[serde(default)]
    pub feedback_visible: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
}

/// `GET <poll-endpoint>`: the full transcript, index order is chronological.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptResponse {
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    Blur,
    Focus,
    Visibility,
    Paste,
    Copy,
    Cut,
    Keypress,
    ArrhythmicTyping,
    TypingCadence,
    VivaEnd,
}

/// A behavioural signal. `event_data` always carries a `client_ts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub event_type: EventType,
    pub event_data: Map<String, Value>,
}

impl TelemetryEvent {
    pub fn new(event_type: EventType, data: Value) -> Self {
        let mut event_data = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        event_data.insert(
            "client_ts".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        Self {
            event_type,
            event_data,
        }
    }

    pub fn bare(event_type: EventType) -> Self {
        Self::new(event_type, Value::Null)
    }
}

/// `POST /viva/log/` batched body.
#[derive(Debug, Clone, Serialize)]
pub struct LogBatch {
    pub session_id: SessionId,
    pub events: Vec<TelemetryEvent>,
}

/// `POST /viva/log/` single-event body used by the immediate path.
#[derive(Debug, Clone, Serialize)]
pub struct LogSingle {
    pub session_id: SessionId,
    pub event_type: EventType,
    pub event_data: Map<String, Value>,
}

impl LogSingle {
    pub fn new(session_id: SessionId, event: TelemetryEvent) -> Self {
        Self {
            session_id,
            event_type: event.event_type,
            event_data: event.event_data,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RatingRequest {
    pub session_id: SessionId,
    pub rating: u8,
}

/// `GET /viva/summary/<id>/?poll=1`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FeedbackPoll {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub strengths: Option<String>,
    #[serde(default)]
    pub improvements: Option<String>,
    #[serde(default)]
    pub misconceptions: Option<String>,
    #[serde(default)]
    pub impression: Option<String>,
}

impl FeedbackPoll {
    /// Flatten the structured feedback into one readable block.
    pub fn to_text(&self) -> Option<String> {
        if !self.ready {
            return None;
        }
        let parts = [
            ("Strengths", &self.strengths),
            ("Improvements", &self.improvements),
            ("Misconceptions", &self.misconceptions),
            ("Overall", &self.impression),
        ];
        let text = parts
            .iter()
            .filter_map(|(label, value)| {
                value
                    .as_deref()
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| format!("{label}: {v}"))
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        (!text.is_empty()).then_some(text)
    }
}
