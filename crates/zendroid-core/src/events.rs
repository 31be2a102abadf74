use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ClientError;

/// Tag carried in the `type` field of every inbound envelope.
///
/// Tags this client does not know parse to [`EventKind::Unrecognized`] so a
/// newer agent never breaks the session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Status,
    Plan,
    TaskStart,
    ActionPlan,
    ActionExecuted,
    TaskComplete,
    Screenshot,
    Error,
    ErrorAwaitingInput,
    Complete,
    Unrecognized(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Status => "status",
            Self::Plan => "plan",
            Self::TaskStart => "task_start",
            Self::ActionPlan => "action_plan",
            Self::ActionExecuted => "action_executed",
            Self::TaskComplete => "task_complete",
            Self::Screenshot => "screenshot",
            Self::Error => "error",
            Self::ErrorAwaitingInput => "error_awaiting_input",
            Self::Complete => "complete",
            Self::Unrecognized(tag) => tag,
        }
    }

    /// Progress narration: rendered as an `agent` transcript entry.
    pub fn is_narrated(&self) -> bool {
        matches!(
            self,
            Self::Status
                | Self::Plan
                | Self::TaskStart
                | Self::ActionPlan
                | Self::ActionExecuted
                | Self::TaskComplete
        )
    }

    pub fn is_error_like(&self) -> bool {
        matches!(self, Self::Error | Self::ErrorAwaitingInput)
    }
}

impl From<String> for EventKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "status" => Self::Status,
            "plan" => Self::Plan,
            "task_start" => Self::TaskStart,
            "action_plan" => Self::ActionPlan,
            "action_executed" => Self::ActionExecuted,
            "task_complete" => Self::TaskComplete,
            "screenshot" => Self::Screenshot,
            "error" => Self::Error,
            "error_awaiting_input" => Self::ErrorAwaitingInput,
            "complete" => Self::Complete,
            _ => Self::Unrecognized(tag),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Unrecognized(tag) => tag,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope pushed by the remote agent over the duplex channel.
///
/// `status`, `task`, `task_number` and `total_tasks` feed run state no matter
/// what the tag is. Fields outside the known set are kept in `extra`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Base64 image payload for `screenshot` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tasks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InboundEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            message: None,
            data: None,
            status: None,
            task: None,
            task_number: None,
            total_tasks: None,
            timestamp: None,
            extra: Map::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn with_progress(mut self, task_number: u32, total_tasks: u32) -> Self {
        self.task_number = Some(task_number);
        self.total_tasks = Some(total_tasks);
        self
    }

    /// Parse one text frame. Anything that is not a JSON object with a string
    /// `type` is a protocol error.
    pub fn parse(text: &str) -> Result<Self, ClientError> {
        serde_json::from_str(text).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    /// Transcript text: the `message` when present, otherwise the event itself
    /// rendered as JSON.
    pub fn narration(&self) -> String {
        match &self.message {
            Some(message) => message.clone(),
            None => serde_json::to_string(self).unwrap_or_else(|_| self.kind.to_string()),
        }
    }
}

/// Envelope sent to the agent over the duplex channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    UserMessage { message: String },
}

impl OutboundEvent {
    pub fn user_message(text: impl Into<String>) -> Self {
        Self::UserMessage {
            message: text.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // A single string field cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// One entry of the run history returned by the status endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HistoryItem {
    pub fn is_system(&self) -> bool {
        self.role.as_deref() == Some("system")
    }

    pub fn render(&self) -> String {
        if let Some(content) = &self.content {
            return content.clone();
        }
        let action = self.extra.get("action").and_then(Value::as_str);
        let reason = self.extra.get("reason").and_then(Value::as_str);
        match (action, reason) {
            (Some(action), Some(reason)) => format!("{action}: {reason}"),
            (Some(action), None) => action.to_string(),
            _ => serde_json::to_string(self).unwrap_or_default(),
        }
    }
}

/// Full-state response of `GET /test/{run_id}`. Never a delta.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PollSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_tags() {
        let evt = InboundEvent::parse(r#"{"type":"task_start","message":"Task 1/3"}"#).unwrap();
        assert_eq!(evt.kind, EventKind::TaskStart);
        assert_eq!(evt.message.as_deref(), Some("Task 1/3"));

        let evt = InboundEvent::parse(r#"{"type":"error_awaiting_input"}"#).unwrap();
        assert_eq!(evt.kind, EventKind::ErrorAwaitingInput);
    }

    #[test]
    fn unknown_tag_is_unrecognized() {
        let evt = InboundEvent::parse(r#"{"type":"warning","message":"retrying"}"#).unwrap();
        assert_eq!(evt.kind, EventKind::Unrecognized("warning".into()));
        assert_eq!(evt.kind.as_str(), "warning");
        assert!(!evt.kind.is_narrated());
        assert!(!evt.kind.is_error_like());
    }

    #[test]
    fn missing_type_is_protocol_error() {
        let err = InboundEvent::parse(r#"{"message":"hi"}"#).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        let err = InboundEvent::parse("not json").unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn parses_progress_fields_and_integer_timestamp() {
        let evt = InboundEvent::parse(
            r#"{"type":"task_start","task":"Open settings","task_number":2,"total_tasks":5,"timestamp":1718000000}"#,
        )
        .unwrap();
        assert_eq!(evt.task.as_deref(), Some("Open settings"));
        assert_eq!(evt.task_number, Some(2));
        assert_eq!(evt.total_tasks, Some(5));
        assert_eq!(evt.timestamp, Some(1_718_000_000.0));
    }

    #[test]
    fn extra_fields_are_kept_for_narration() {
        let evt = InboundEvent::parse(r#"{"type":"action_plan","action":"click","reason":"login button"}"#)
            .unwrap();
        assert_eq!(evt.extra.get("action"), Some(&Value::String("click".into())));
        let text = evt.narration();
        assert!(text.contains("\"type\":\"action_plan\""), "got: {text}");
        assert!(text.contains("login button"), "got: {text}");
    }

    #[test]
    fn narration_prefers_message() {
        let evt = InboundEvent::new(EventKind::Status).with_message("Connected to emulator");
        assert_eq!(evt.narration(), "Connected to emulator");
    }

    #[test]
    fn outbound_user_message_shape() {
        let json = OutboundEvent::user_message("retry").to_json();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, serde_json::json!({"type": "user_message", "message": "retry"}));
    }

    #[test]
    fn kind_classification() {
        assert!(EventKind::ActionExecuted.is_narrated());
        assert!(!EventKind::Screenshot.is_narrated());
        assert!(!EventKind::Complete.is_narrated());
        assert!(EventKind::Error.is_error_like());
        assert!(EventKind::ErrorAwaitingInput.is_error_like());
    }

    #[test]
    fn snapshot_tolerates_sparse_body() {
        let snap: PollSnapshot = serde_json::from_str(r#"{"status":"starting"}"#).unwrap();
        assert_eq!(snap.status.as_deref(), Some("starting"));
        assert!(snap.history.is_empty());
        assert!(snap.screenshot.is_none());
    }

    #[test]
    fn history_item_rendering() {
        let plain: HistoryItem =
            serde_json::from_str(r#"{"role":"system","content":"Session started"}"#).unwrap();
        assert!(plain.is_system());
        assert_eq!(plain.render(), "Session started");

        let action: HistoryItem =
            serde_json::from_str(r#"{"role":"model","action":"tap","reason":"open menu"}"#).unwrap();
        assert!(!action.is_system());
        assert_eq!(action.render(), "tap: open menu");
    }
}
