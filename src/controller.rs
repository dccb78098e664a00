//! Session controller: the state machine between frontend, capture, and
//! channel.
//!
//! All session state lives here and is only ever touched from the dispatch
//! loop, so commands, channel events, and capture faults are serialized by
//! construction. Anything that does not fit the current phase is a logged
//! no-op, never a crash.

use tokio::sync::mpsc;

use crate::audio::{Capture, CaptureError};
use crate::channel::{ChannelCommand, ChannelEvent, LinkState};
use crate::protocol::{InboundEnvelope, OutboundEnvelope, ScheduleItem, Task};
use crate::state::{
    InputMode, PendingRequest, SessionPhase, SessionState, Speaker, StatusKind,
};

const STATUS_CONNECTED: &str = "Connected";
const STATUS_DISCONNECTED: &str = "Disconnected";
const STATUS_RECORDING: &str = "Recording...";
const STATUS_PROCESSING: &str = "Processing...";
const STATUS_READY: &str = "Ready";

/// Frontend requests, delivered over the command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    StartCapture,
    StopCapture,
    /// Single-button behavior: start when idle, stop when capturing, ignore
    /// while a reply is outstanding.
    ToggleCapture,
    SubmitText(String),
    RequestExport,
    ToggleInputMode,
    Shutdown,
}

/// Presentation seam. Methods default to no-ops so a frontend implements
/// only what it renders.
pub trait SessionObserver: Send {
    fn state_changed(&mut self, _phase: SessionPhase) {}
    fn conversation_message(&mut self, _speaker: Speaker, _text: &str) {}
    fn tasks_updated(&mut self, _tasks: &[Task]) {}
    fn schedule_updated(&mut self, _schedule: &[ScheduleItem]) {}
    fn mood_energy_updated(&mut self, _mood: &str, _energy: &str) {}
    fn status(&mut self, _text: &str, _kind: StatusKind) {}
    fn export_ready(&mut self, _document: &serde_json::Value) {}
    fn input_mode_changed(&mut self, _mode: InputMode) {}
}

pub struct SessionController {
    state: SessionState,
    capture: Box<dyn Capture>,
    channel: mpsc::Sender<ChannelCommand>,
    observer: Box<dyn SessionObserver>,
}

impl SessionController {
    pub fn new(
        capture: Box<dyn Capture>,
        channel: mpsc::Sender<ChannelCommand>,
        observer: Box<dyn SessionObserver>,
    ) -> Self {
        Self {
            state: SessionState::default(),
            capture,
            channel,
            observer,
        }
    }

    /// Read-only view of the session, mainly for tests and diagnostics.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Single dispatch loop. Runs until the command channel closes or a
    /// `Shutdown` command arrives; always releases the capture device on the
    /// way out.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut channel_events: mpsc::Receiver<ChannelEvent>,
        mut capture_faults: mpsc::UnboundedReceiver<CaptureError>,
    ) {
        log::info!("session controller started with {} capture", self.capture.name());
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(SessionCommand::Shutdown) | None => {
                        log::info!("session controller stopping");
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd).await,
                },
                Some(event) = channel_events.recv() => self.handle_channel_event(event).await,
                Some(fault) = capture_faults.recv() => self.handle_capture_fault(fault),
            }
        }
        if self.capture.is_capturing() {
            let _ = self.capture.stop();
        }
    }

    pub async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::StartCapture => self.start_capture(),
            SessionCommand::StopCapture => self.stop_capture().await,
            SessionCommand::ToggleCapture => match self.state.phase {
                SessionPhase::Idle => self.start_capture(),
                SessionPhase::Capturing => self.stop_capture().await,
                _ => log::debug!("capture toggle ignored while {:?}", self.state.phase),
            },
            SessionCommand::SubmitText(text) => self.submit_text(&text).await,
            SessionCommand::RequestExport => self.request_export().await,
            SessionCommand::ToggleInputMode => self.toggle_input_mode(),
            SessionCommand::Shutdown => {} // consumed by the run loop
        }
    }

    pub async fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::State(link) => self.link_state_changed(link),
            ChannelEvent::Inbound(envelope) => self.handle_inbound(envelope),
        }
    }

    /// Device faults reported by the capture thread while recording.
    pub fn handle_capture_fault(&mut self, err: CaptureError) {
        match self.state.phase {
            SessionPhase::Idle | SessionPhase::Capturing => self.capture_failed(err),
            _ => log::warn!("late capture fault ignored: {err}"),
        }
    }

    fn start_capture(&mut self) {
        if self.state.phase != SessionPhase::Idle {
            // At most one capture per session, and never while a reply is
            // outstanding.
            log::debug!("capture start ignored while {:?}", self.state.phase);
            return;
        }
        match self.capture.start() {
            Ok(()) => {
                self.set_phase(SessionPhase::Capturing);
                self.observer.status(STATUS_RECORDING, StatusKind::Recording);
            }
            Err(e) => self.capture_failed(e),
        }
    }

    async fn stop_capture(&mut self) {
        if self.state.phase != SessionPhase::Capturing {
            log::debug!("capture stop ignored while {:?}", self.state.phase);
            return;
        }
        match self.capture.stop() {
            Ok(payload) => {
                self.send(OutboundEnvelope::Audio {
                    audio: payload.into_string(),
                })
                .await;
                self.state.pending = Some(PendingRequest::Audio);
                self.set_phase(SessionPhase::AwaitingReply);
                self.observer.status(STATUS_PROCESSING, StatusKind::Processing);
            }
            Err(e) => self.capture_failed(e),
        }
    }

    async fn submit_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if self.state.phase != SessionPhase::Idle {
            log::debug!("text submit ignored while {:?}", self.state.phase);
            return;
        }
        // Typed words render locally right away; the reply must not echo
        // them into the conversation a second time.
        self.observer.conversation_message(Speaker::User, text);
        self.send(OutboundEnvelope::Text {
            text: text.to_string(),
        })
        .await;
        self.state.pending = Some(PendingRequest::Text);
        self.set_phase(SessionPhase::AwaitingReply);
        self.observer.status(STATUS_PROCESSING, StatusKind::Processing);
    }

    /// Export is a degenerate exchange: no reply is awaited and the session
    /// stays idle, so journaling can continue while the document is prepared.
    async fn request_export(&mut self) {
        if self.state.phase != SessionPhase::Idle {
            log::debug!("export ignored while {:?}", self.state.phase);
            return;
        }
        self.send(OutboundEnvelope::Export).await;
    }

    fn toggle_input_mode(&mut self) {
        self.state.input_mode = self.state.input_mode.toggled();
        log::info!("input mode: {:?}", self.state.input_mode);
        self.observer.input_mode_changed(self.state.input_mode);
    }

    fn link_state_changed(&mut self, link: LinkState) {
        match link {
            LinkState::Connecting => log::info!("channel connecting"),
            LinkState::Connected => {
                self.observer.status(STATUS_CONNECTED, StatusKind::Connected);
            }
            LinkState::Errored => self.observer.status("Error", StatusKind::Error),
            LinkState::Disconnected => {
                // Whatever was in flight left with the connection.
                if self.capture.is_capturing() {
                    match self.capture.stop() {
                        Ok(_) => log::info!("discarded capture cut off by disconnect"),
                        Err(e) => log::warn!("capture cleanup failed: {e}"),
                    }
                }
                self.state.pending = None;
                self.set_phase(SessionPhase::Idle);
                self.observer
                    .status(STATUS_DISCONNECTED, StatusKind::Disconnected);
            }
        }
    }

    fn handle_inbound(&mut self, envelope: InboundEnvelope) {
        match envelope {
            InboundEnvelope::Response {
                conversation,
                user_input,
                tasks,
                schedule,
                mood,
                energy_level,
            } => self.handle_response(conversation, user_input, tasks, schedule, mood, energy_level),
            InboundEnvelope::Export { data } => {
                // Passed through verbatim; export never touches session state.
                self.observer.export_ready(&data);
            }
            InboundEnvelope::Error { message } => {
                // An error with no outstanding request has no exchange to
                // end; it is noise, like an unsolicited response.
                if self.state.phase != SessionPhase::AwaitingReply {
                    log::warn!(
                        "unsolicited service error dropped while {:?}: {message}",
                        self.state.phase
                    );
                    return;
                }
                log::warn!("service error: {message}");
                self.state.pending = None;
                self.set_phase(SessionPhase::Idle);
                self.observer
                    .status(&format!("Error: {message}"), StatusKind::Error);
            }
        }
    }

    fn handle_response(
        &mut self,
        conversation: String,
        user_input: Option<String>,
        tasks: Vec<Task>,
        schedule: Vec<ScheduleItem>,
        mood: Option<String>,
        energy_level: Option<String>,
    ) {
        if self.state.phase != SessionPhase::AwaitingReply {
            log::warn!("unsolicited response dropped while {:?}", self.state.phase);
            return;
        }
        let pending = self.state.pending.take();

        // The transcription echo is what the user said; it belongs in the
        // conversation only for audio turns. Typed turns already rendered it.
        if let Some(echo) = user_input {
            if pending == Some(PendingRequest::Audio) {
                self.observer.conversation_message(Speaker::User, &echo);
            } else {
                log::debug!("suppressing echo for text-originated request");
            }
        }
        self.observer
            .conversation_message(Speaker::Assistant, &conversation);

        self.state.tasks = tasks;
        self.observer.tasks_updated(&self.state.tasks);
        self.state.schedule = schedule;
        self.observer.schedule_updated(&self.state.schedule);

        // The pair renders only when both halves arrived.
        if let (Some(mood), Some(energy)) = (mood, energy_level) {
            self.observer.mood_energy_updated(&mood, &energy);
            self.state.mood = Some(mood);
            self.state.energy = Some(energy);
        }

        self.set_phase(SessionPhase::Idle);
        self.observer.status(STATUS_READY, StatusKind::Connected);
    }

    /// Shared failure path for device faults: surface the remediation hint
    /// through a transient `Faulted`, then return to `Idle`. No retry.
    fn capture_failed(&mut self, err: CaptureError) {
        log::error!("capture failed: {err}");
        if self.capture.is_capturing() {
            // Release the device; a partial capture is not worth sending.
            match self.capture.stop() {
                Ok(_) => log::debug!("discarded partial capture"),
                Err(e) => log::warn!("capture cleanup failed: {e}"),
            }
        }
        self.set_phase(SessionPhase::Faulted);
        self.observer.status(err.hint(), StatusKind::Error);
        self.set_phase(SessionPhase::Idle);
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.state.phase != phase {
            log::info!("session phase: {:?} -> {:?}", self.state.phase, phase);
            self.state.phase = phase;
            self.observer.state_changed(phase);
        }
    }

    /// Hand one envelope to the channel task. Fire-and-forget; a failed
    /// handoff is logged and the link-state events reset the session.
    async fn send(&mut self, envelope: OutboundEnvelope) {
        if let Err(e) = self.channel.send(ChannelCommand::Send(envelope)).await {
            log::error!("channel handoff failed: {e}");
        }
    }
}
