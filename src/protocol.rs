//! Envelope types exchanged with the journaling service.
//!
//! Every frame on the channel is a JSON object tagged by a `type` field.
//! Both directions are closed sum types: a frame either decodes into one of
//! these variants or is dropped at the channel boundary, so the controller
//! never sees a half-understood message.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client → service messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundEnvelope {
    /// One finished utterance, base64-encoded by the capture pipeline.
    Audio { audio: String },
    /// Typed input, sent verbatim.
    Text { text: String },
    /// Ask the service for the session's accumulated document.
    Export,
}

/// Service → client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundEnvelope {
    /// The assistant's reply to one audio or text request.
    Response {
        conversation: String,
        /// Transcription of what the user said; set for audio requests.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_input: Option<String>,
        /// Full replacement for the client's task list.
        #[serde(default)]
        tasks: Vec<Task>,
        /// Full replacement for the client's schedule.
        #[serde(default)]
        schedule: Vec<ScheduleItem>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mood: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        energy_level: Option<String>,
    },
    /// The session document, passed through to the export collaborator.
    Export { data: Value },
    /// Service-side failure for the outstanding request.
    Error { message: String },
}

/// One extracted task. A value object: replies replace the whole list, so
/// there is no identity to track across updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub title: String,
    pub priority: Priority,
    pub category: String,
    pub estimated_time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        };
        f.write_str(s)
    }
}

/// One row of the day plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleItem {
    pub time: String,
    pub activity: String,
}
