//! Session state owned by the controller.
//!
//! Everything a frontend could render lives here as plain data. The
//! controller mutates it in one place and observers only ever see it through
//! notifications, so there is no shared mutable state to lock.

use crate::protocol::{ScheduleItem, Task};

/// Lifecycle of one conversational turn.
///
/// `Faulted` is transient: it exists so observers can render the failure,
/// and the controller moves straight back to `Idle` afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Ready for input; nothing in flight.
    #[default]
    Idle,
    /// Microphone capture in progress.
    Capturing,
    /// A request is outstanding; waiting for the service reply.
    AwaitingReply,
    /// A capture fault is being surfaced.
    Faulted,
}

/// Which input surface the frontend currently offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Voice,
    Text,
}

impl InputMode {
    /// The other mode; toggling twice is the identity.
    pub fn toggled(self) -> Self {
        match self {
            InputMode::Voice => InputMode::Text,
            InputMode::Text => InputMode::Voice,
        }
    }
}

/// Who said a conversation line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::User => "You",
            Speaker::Assistant => "Assistant",
        }
    }
}

/// Category attached to every status notification, so frontends can style
/// the text without parsing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Connected,
    Disconnected,
    Recording,
    Processing,
    Error,
}

impl StatusKind {
    pub fn label(&self) -> &'static str {
        match self {
            StatusKind::Connected => "connected",
            StatusKind::Disconnected => "disconnected",
            StatusKind::Recording => "recording",
            StatusKind::Processing => "processing",
            StatusKind::Error => "error",
        }
    }
}

/// What kind of request is awaiting a reply. Decides whether the reply's
/// transcription echo belongs in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingRequest {
    Audio,
    Text,
}

/// The controller's complete view of the session.
#[derive(Debug, Default)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub input_mode: InputMode,
    /// Set when entering `AwaitingReply`, cleared when the exchange ends.
    pub pending: Option<PendingRequest>,
    /// Last task list from the service, replaced wholesale on each reply.
    pub tasks: Vec<Task>,
    /// Last schedule from the service, replaced wholesale on each reply.
    pub schedule: Vec<ScheduleItem>,
    pub mood: Option<String>,
    pub energy: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_mode_toggle_round_trips() {
        let mode = InputMode::Voice;
        assert_eq!(mode.toggled(), InputMode::Text);
        assert_eq!(mode.toggled().toggled(), mode);
    }

    #[test]
    fn fresh_state_is_idle_voice() {
        let state = SessionState::default();
        assert_eq!(state.phase, SessionPhase::Idle);
        assert_eq!(state.input_mode, InputMode::Voice);
        assert!(state.pending.is_none());
        assert!(state.tasks.is_empty());
        assert!(state.schedule.is_empty());
    }
}
