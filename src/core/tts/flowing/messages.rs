//! Wire messages for the flowing synthesis protocol.
//!
//! Outgoing control messages share a common header envelope; incoming
//! events are parsed by peeking `header.name` and dispatched as
//! [`ServerEvent`] variants. Unrecognized events are preserved as
//! `Unknown` rather than rejected, so gateway additions do not break the
//! client.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SYNTHESIZER_NAMESPACE;

/// Generates a 32-hex-character identifier for message and task ids.
pub fn fresh_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Header envelope for every outgoing control message.
#[derive(Debug, Clone, Serialize)]
pub struct MessageHeader {
    pub message_id: String,
    pub task_id: String,
    pub namespace: &'static str,
    pub name: &'static str,
    pub appkey: String,
}

impl MessageHeader {
    fn new(name: &'static str, task_id: &str, app_key: &str) -> Self {
        Self {
            message_id: fresh_id(),
            task_id: task_id.to_string(),
            namespace: SYNTHESIZER_NAMESPACE,
            name,
            appkey: app_key.to_string(),
        }
    }
}

/// Synthesis parameters sent with StartSynthesis.
#[derive(Debug, Clone, Serialize)]
pub struct StartSynthesisPayload {
    pub voice: String,
    pub format: &'static str,
    pub sample_rate: u32,
    pub volume: u32,
    pub speech_rate: i32,
    pub pitch_rate: i32,
    pub enable_subtitle: bool,
    pub platform: String,
}

/// Opens a synthesis session on the channel.
#[derive(Debug, Clone, Serialize)]
pub struct StartSynthesisMessage {
    pub header: MessageHeader,
    pub payload: StartSynthesisPayload,
}

impl StartSynthesisMessage {
    pub fn new(task_id: &str, app_key: &str, payload: StartSynthesisPayload) -> Self {
        Self {
            header: MessageHeader::new("StartSynthesis", task_id, app_key),
            payload,
        }
    }
}

/// Submits one text segment to the open session.
#[derive(Debug, Clone, Serialize)]
pub struct RunSynthesisMessage {
    pub header: MessageHeader,
    pub payload: RunSynthesisPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSynthesisPayload {
    pub text: String,
}

impl RunSynthesisMessage {
    pub fn new(task_id: &str, app_key: &str, text: String) -> Self {
        Self {
            header: MessageHeader::new("RunSynthesis", task_id, app_key),
            payload: RunSynthesisPayload { text },
        }
    }
}

/// Asks the server to finish the session and flush remaining audio.
#[derive(Debug, Clone, Serialize)]
pub struct StopSynthesisMessage {
    pub header: MessageHeader,
}

impl StopSynthesisMessage {
    pub fn new(task_id: &str, app_key: &str) -> Self {
        Self {
            header: MessageHeader::new("StopSynthesis", task_id, app_key),
        }
    }
}

/// Header fields of an incoming server event.
#[derive(Debug, Clone, Deserialize)]
pub struct EventHeader {
    pub name: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub status: Option<u32>,
    #[serde(default)]
    pub status_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    header: EventHeader,
}

/// Parsed server event.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Session accepted; the client may submit text
    SynthesisStarted(EventHeader),
    /// All audio for the submitted text has been produced
    SentenceEnd(EventHeader),
    /// Session closed on the server side
    SynthesisCompleted(EventHeader),
    /// Session aborted by the server
    TaskFailed(EventHeader),
    /// Anything this client does not understand, kept verbatim
    Unknown(String),
}

impl ServerEvent {
    /// Parses a text frame into an event by peeking at `header.name`.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let envelope: EventEnvelope = serde_json::from_str(text)?;
        let event = match envelope.header.name.as_str() {
            "SynthesisStarted" => ServerEvent::SynthesisStarted(envelope.header),
            "SentenceEnd" => ServerEvent::SentenceEnd(envelope.header),
            "SynthesisCompleted" => ServerEvent::SynthesisCompleted(envelope.header),
            "TaskFailed" => ServerEvent::TaskFailed(envelope.header),
            _ => ServerEvent::Unknown(text.to_string()),
        };
        Ok(event)
    }

    /// Task id the event belongs to, if the server sent one.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            ServerEvent::SynthesisStarted(h)
            | ServerEvent::SentenceEnd(h)
            | ServerEvent::SynthesisCompleted(h)
            | ServerEvent::TaskFailed(h) => h.task_id.as_deref(),
            ServerEvent::Unknown(_) => None,
        }
    }
}
