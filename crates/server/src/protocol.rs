//! Client wire protocol: JSON text frames tagged by `action`.
//!
//! ```text
//! { "action": "add", "owner": .., "project": .., "command": .., "build": .., "timeout": .., ... }
//! { "action": "complete", "project": .., "command": .., "build": .. }
//! { "action": "flush" }
//! ```
//!
//! The channel never comes from the frame; it is the path the client
//! connected on.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use fairshare_queue::{JobKey, JobSpec, Scheduler, SchedulerError};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("frame must be a JSON object")]
    NotAnObject,

    #[error("frame has no 'action'")]
    MissingAction,

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Add(JobSpec),
    Complete(JobKey),
    Flush,
}

impl ClientMessage {
    pub fn parse(channel: &str, text: &str) -> Result<Self, ProtocolError> {
        let body: Map<String, Value> = match serde_json::from_str(text)? {
            Value::Object(body) => body,
            _ => return Err(ProtocolError::NotAnObject),
        };
        let action = body
            .get("action")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingAction)?;

        match action {
            "add" => Ok(Self::Add(JobSpec::from_json(channel, &body)?)),
            "complete" => Ok(Self::Complete(JobKey::from_json(channel, &body)?)),
            "flush" => Ok(Self::Flush),
            other => Err(ProtocolError::UnknownAction(other.to_string())),
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::Add(_) => "add",
            Self::Complete(_) => "complete",
            Self::Flush => "flush",
        }
    }
}

/// Outcome of one client frame, sent back to that client only when acks
/// are enabled.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Reply {
    Ack {
        action: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    Nack {
        action: String,
        error: String,
    },
}

impl Reply {
    fn ack(action: &str, id: Option<String>) -> Self {
        Reply::Ack {
            action: action.to_string(),
            id,
        }
    }

    fn nack(action: &str, error: impl ToString) -> Self {
        Reply::Nack {
            action: action.to_string(),
            error: error.to_string(),
        }
    }

    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Parse and apply one text frame from a client on `channel`.
pub async fn handle_frame(scheduler: &Scheduler, channel: &str, text: &str) -> Reply {
    let message = match ClientMessage::parse(channel, text) {
        Ok(message) => message,
        Err(e) => return Reply::nack(raw_action(text).as_deref().unwrap_or("unknown"), e),
    };
    let action = message.action();

    match apply(scheduler, message).await {
        Ok(id) => Reply::ack(action, id),
        Err(e) => Reply::nack(action, e),
    }
}

async fn apply(scheduler: &Scheduler, message: ClientMessage) -> Result<Option<String>, ProtocolError> {
    match message {
        ClientMessage::Add(spec) => {
            let id = scheduler.submit(spec).await?;
            Ok(Some(id.to_string()))
        }
        ClientMessage::Complete(key) => {
            let id = key.id();
            if scheduler.complete(&key).await? {
                Ok(Some(id.to_string()))
            } else {
                Err(SchedulerError::NotFound(id).into())
            }
        }
        ClientMessage::Flush => {
            scheduler.flush().await?;
            Ok(None)
        }
    }
}

/// Best-effort `action` of a frame that failed to parse, for the nack.
fn raw_action(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    value.get("action")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use fairshare_queue::MemoryBackend;

    fn scheduler() -> Scheduler {
        Scheduler::new(Arc::new(MemoryBackend::new()), 4)
    }

    #[test]
    fn parse_add_injects_channel_and_keeps_extras() {
        let text = r#"{"action":"add","owner":"ana","project":"web","command":"test","build":42,
                       "timeout":30,"branch":"main","channel":"spoofed"}"#;
        let ClientMessage::Add(spec) = ClientMessage::parse("ci", text).unwrap() else {
            panic!("expected add");
        };
        assert_eq!(spec.channel, "ci");
        assert_eq!(spec.build, "42");
        assert_eq!(spec.timeout, Some(30));
        assert_eq!(spec.extra.get("branch").map(String::as_str), Some("main"));
        assert!(!spec.extra.contains_key("channel"));
    }

    #[test]
    fn parse_complete_needs_only_identity_fields() {
        let text = r#"{"action":"complete","project":"web","command":"test","build":"7"}"#;
        assert_eq!(
            ClientMessage::parse("ci", text).unwrap(),
            ClientMessage::Complete(JobKey {
                channel: "ci".into(),
                project: "web".into(),
                build: "7".into(),
                command: "test".into(),
            })
        );
    }

    #[test]
    fn parse_rejects_bad_frames() {
        assert!(matches!(
            ClientMessage::parse("ci", "not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            ClientMessage::parse("ci", "[1,2]"),
            Err(ProtocolError::NotAnObject)
        ));
        assert!(matches!(
            ClientMessage::parse("ci", r#"{"owner":"x"}"#),
            Err(ProtocolError::MissingAction)
        ));
        assert!(matches!(
            ClientMessage::parse("ci", r#"{"action":"retry"}"#),
            Err(ProtocolError::UnknownAction(a)) if a == "retry"
        ));
        assert!(matches!(
            ClientMessage::parse("ci", r#"{"action":"add","owner":"x","project":"p","build":"1"}"#),
            Err(ProtocolError::Scheduler(SchedulerError::InvalidJob(_)))
        ));
    }

    #[tokio::test]
    async fn add_then_complete_round_trip() {
        let s = scheduler();
        let add = r#"{"action":"add","owner":"o","project":"p","command":"c","build":"1"}"#;
        assert_eq!(
            handle_frame(&s, "ci", add).await,
            Reply::Ack { action: "add".into(), id: Some("ci/p/1/c".into()) }
        );
        s.next().await.unwrap().unwrap();

        let done = r#"{"action":"complete","project":"p","command":"c","build":"1"}"#;
        assert!(matches!(handle_frame(&s, "ci", done).await, Reply::Ack { .. }));
        assert_eq!(s.stats().await.unwrap().running, 0);

        // Second completion of the same job: harmless, but reported.
        let reply = handle_frame(&s, "ci", done).await;
        assert!(matches!(reply, Reply::Nack { ref error, .. } if error.contains("not found")));
    }

    #[tokio::test]
    async fn invalid_frame_is_nacked_and_changes_nothing() {
        let s = scheduler();
        let reply = handle_frame(&s, "ci", r#"{"action":"add","owner":"o"}"#).await;
        assert!(matches!(reply, Reply::Nack { ref action, .. } if action == "add"));
        assert_eq!(s.stats().await.unwrap().pending, 0);

        let reply = handle_frame(&s, "ci", "{").await;
        assert!(matches!(reply, Reply::Nack { ref action, .. } if action == "unknown"));
    }

    #[tokio::test]
    async fn flush_clears_queue() {
        let s = scheduler();
        let add = r#"{"action":"add","owner":"o","project":"p","command":"c","build":"1"}"#;
        handle_frame(&s, "ci", add).await;
        assert_eq!(
            handle_frame(&s, "ci", r#"{"action":"flush"}"#).await.to_frame(),
            r#"{"type":"ack","action":"flush"}"#
        );
        assert_eq!(s.stats().await.unwrap().pending, 0);
    }
}
