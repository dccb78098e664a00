//! Terminal frontend for the journaling session core.
//!
//! Reads commands from stdin, renders observer callbacks as plain lines, and
//! writes exported session documents next to the desktop frontend's naming:
//! `morning-brain-dump-YYYY-MM-DD.json`.

use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use tokio::io::AsyncBufReadExt;
use tokio::signal;
use tokio::sync::mpsc;

use braindump::audio::AudioCapture;
use braindump::channel::ChannelClient;
use braindump::config::Config;
use braindump::controller::{SessionCommand, SessionController, SessionObserver};
use braindump::protocol::{ScheduleItem, Task};
use braindump::session::SessionId;
use braindump::state::{InputMode, SessionPhase, Speaker, StatusKind};

struct TerminalFrontend {
    export_dir: PathBuf,
}

impl TerminalFrontend {
    fn new(export_dir: PathBuf) -> Self {
        Self { export_dir }
    }
}

impl SessionObserver for TerminalFrontend {
    fn state_changed(&mut self, phase: SessionPhase) {
        match phase {
            SessionPhase::Idle => println!("(ready - 'rec' starts your morning brain dump)"),
            SessionPhase::Capturing => println!("(recording - 'rec' again to stop)"),
            SessionPhase::AwaitingReply => println!("(processing your thoughts...)"),
            SessionPhase::Faulted => {}
        }
    }

    fn conversation_message(&mut self, speaker: Speaker, text: &str) {
        println!("{}: {}", speaker.label(), text);
    }

    fn tasks_updated(&mut self, tasks: &[Task]) {
        if tasks.is_empty() {
            println!("tasks: none yet");
            return;
        }
        println!("tasks:");
        for task in tasks {
            println!(
                "  [{}] {} ({}, {})",
                task.priority, task.title, task.category, task.estimated_time
            );
        }
    }

    fn schedule_updated(&mut self, schedule: &[ScheduleItem]) {
        if schedule.is_empty() {
            println!("schedule: nothing planned yet");
            return;
        }
        println!("schedule:");
        for item in schedule {
            println!("  {}  {}", item.time, item.activity);
        }
    }

    fn mood_energy_updated(&mut self, mood: &str, energy: &str) {
        println!("mood: {mood} | energy: {energy}");
    }

    fn status(&mut self, text: &str, kind: StatusKind) {
        println!("[{}] {}", kind.label(), text);
    }

    fn export_ready(&mut self, document: &serde_json::Value) {
        let path = self.export_dir.join(export_file_name(Utc::now().date_naive()));
        let written = serde_json::to_string_pretty(document)
            .map_err(anyhow::Error::from)
            .and_then(|json| std::fs::write(&path, json).map_err(Into::into));
        match written {
            Ok(()) => println!("session exported to {}", path.display()),
            Err(e) => log::error!("export write failed: {e:#}"),
        }
    }

    fn input_mode_changed(&mut self, mode: InputMode) {
        match mode {
            InputMode::Voice => println!("(voice input - 'rec' toggles the microphone)"),
            InputMode::Text => println!("(text input - type a line to send it)"),
        }
    }
}

/// One file per day, same name the web frontend gives its download.
fn export_file_name(date: NaiveDate) -> String {
    format!("morning-brain-dump-{}.json", date.format("%Y-%m-%d"))
}

/// Map one stdin line to a session command.
///
/// `rec` toggles capture, `export` requests the session document, `mode`
/// switches voice/text input, `quit` ends the session; anything else is a
/// journal entry.
fn parse_line(line: &str) -> Option<SessionCommand> {
    match line.trim() {
        "" => None,
        "rec" => Some(SessionCommand::ToggleCapture),
        "export" => Some(SessionCommand::RequestExport),
        "mode" => Some(SessionCommand::ToggleInputMode),
        "quit" | "exit" => Some(SessionCommand::Shutdown),
        text => Some(SessionCommand::SubmitText(text.to_string())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
    let config = Config::load(&config_path)?;
    let session = SessionId::generate();
    log::info!("starting session {session}");

    let (event_tx, event_rx) = mpsc::channel(100);
    let (channel_tx, channel_rx) = mpsc::channel(100);
    let (fault_tx, fault_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::channel(100);

    let client = ChannelClient::new(config.server.clone(), session, event_tx, channel_rx);
    tokio::spawn(client.run());

    let capture = AudioCapture::new(config.audio.clone(), fault_tx);
    let frontend = TerminalFrontend::new(config.export.dir.clone());
    let controller = SessionController::new(Box::new(capture), channel_tx, Box::new(frontend));

    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_line(&line) {
                Some(SessionCommand::Shutdown) => {
                    let _ = command_tx.send(SessionCommand::Shutdown).await;
                    return;
                }
                Some(cmd) => {
                    if command_tx.send(cmd).await.is_err() {
                        return;
                    }
                }
                None => {}
            }
        }
        // stdin closing ends the session: command_tx drops here and the
        // controller loop sees the channel close.
    });

    println!("morning brain dump - 'rec' to record, 'mode' for text input, 'export' to save, 'quit' to leave");

    tokio::select! {
        _ = controller.run(command_rx, event_rx, fault_rx) => {}
        _ = signal::ctrl_c() => {
            log::info!("interrupted, shutting down");
        }
    }
    Ok(())
}
