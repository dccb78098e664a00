//! Session core for a voice-or-text journaling client.
//!
//! Four pieces wire together around one session identity: microphone capture
//! ([`audio`]), the tagged envelope protocol ([`protocol`]), the WebSocket
//! channel that carries it ([`channel`]), and the state machine coordinating
//! them ([`controller`]). Presentation is a collaborator behind
//! [`controller::SessionObserver`]; the service is a black box behind the
//! envelope types.

pub mod audio;
pub mod channel;
pub mod config;
pub mod controller;
pub mod protocol;
pub mod session;
pub mod state;

pub use audio::{AudioCapture, Capture, CaptureConfig, CaptureError, EncodedPayload};
pub use channel::{ChannelClient, ChannelCommand, ChannelEvent, LinkState};
pub use config::Config;
pub use controller::{SessionCommand, SessionController, SessionObserver};
pub use protocol::{InboundEnvelope, OutboundEnvelope, Priority, ScheduleItem, Task};
pub use session::SessionId;
pub use state::{InputMode, SessionPhase, SessionState, Speaker, StatusKind};
