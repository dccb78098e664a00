//! Microphone capture: one buffered utterance per start/stop cycle.
//!
//! A capture owns a dedicated OS thread for the device stream so real-time
//! callbacks never touch the async runtime. Fragments accumulate in order
//! until `stop`, which releases the device and hands back the assembled,
//! encoded utterance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;

use super::device;
use super::payload::{self, EncodedPayload};

/// Why acquiring or running the input device failed.
///
/// Mapped from the platform layer into a fixed set of causes so the session
/// can pick a remediation hint. Faults are never retried automatically;
/// recovery is the user trying again from an idle session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("no usable microphone")]
    DeviceNotFound,
    #[error("input configuration not supported")]
    Unsupported,
    #[error("microphone blocked by a security policy")]
    SecurityRestricted,
    #[error("capture failed: {0}")]
    Unknown(String),
}

impl CaptureError {
    /// Remediation text surfaced verbatim in the status line.
    pub fn hint(&self) -> &'static str {
        match self {
            CaptureError::PermissionDenied => {
                "Microphone permission denied. Please allow microphone access and try again."
            }
            CaptureError::DeviceNotFound => {
                "No microphone found. Please connect a microphone and try again."
            }
            CaptureError::Unsupported => {
                "The microphone's input format is not supported. Try a different input device."
            }
            CaptureError::SecurityRestricted => {
                "Microphone access is blocked by system security settings. Check your privacy settings and try again."
            }
            CaptureError::Unknown(_) => {
                "Microphone capture failed. Check your audio settings and try again."
            }
        }
    }
}

/// Capture settings from the `[audio]` config section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Exact input-device name; `None` selects the platform default.
    pub device: Option<String>,
    /// Requested sample rate; `None` keeps the device default.
    pub sample_rate: Option<u32>,
    /// Requested channel count; `None` keeps the device default.
    pub channels: Option<u16>,
}

/// Ordered raw PCM fragments of one in-progress capture.
///
/// Lives exactly as long as its capture: created at start, consumed once at
/// stop. Fragment boundaries are a device detail; only the concatenation is
/// meaningful.
#[derive(Debug, Default)]
pub struct RecordingBuffer {
    fragments: Vec<Vec<u8>>,
}

impl RecordingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one device fragment, preserving arrival order.
    pub fn push(&mut self, fragment: Vec<u8>) {
        self.fragments.push(fragment);
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    pub fn byte_len(&self) -> usize {
        self.fragments.iter().map(Vec::len).sum()
    }

    /// Concatenate all fragments in arrival order.
    pub fn assemble(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        for fragment in self.fragments {
            out.extend_from_slice(&fragment);
        }
        out
    }
}

/// Recording device seam. `start` and `stop` come in pairs; a second `start`
/// while active must not disturb the running capture.
pub trait Capture: Send {
    /// Begin capturing into a fresh buffer.
    fn start(&mut self) -> Result<(), CaptureError>;
    /// Stop, release the device, and return the encoded utterance.
    fn stop(&mut self) -> Result<EncodedPayload, CaptureError>;
    /// True while a capture is active.
    fn is_capturing(&self) -> bool;
    /// Implementation name for logging.
    fn name(&self) -> &'static str;
}

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(20);
const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// cpal-backed [`Capture`].
///
/// Mid-capture stream faults are pushed on the `faults` channel so the
/// session hears about a dying device without polling.
pub struct AudioCapture {
    config: CaptureConfig,
    faults: mpsc::UnboundedSender<CaptureError>,
    active: Option<ActiveCapture>,
}

struct ActiveCapture {
    buffer: Arc<Mutex<RecordingBuffer>>,
    stop: Arc<AtomicBool>,
    worker: JoinHandle<()>,
}

impl AudioCapture {
    pub fn new(config: CaptureConfig, faults: mpsc::UnboundedSender<CaptureError>) -> Self {
        Self {
            config,
            faults,
            active: None,
        }
    }

    fn shutdown(active: ActiveCapture) -> RecordingBuffer {
        active.stop.store(true, Ordering::SeqCst);
        if active.worker.join().is_err() {
            log::error!("capture thread panicked during shutdown");
        }
        match Arc::try_unwrap(active.buffer) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(|p| p.into_inner()),
            Err(shared) => {
                // A callback clone outlived the join; drain under the lock.
                let mut guard = shared.lock().unwrap_or_else(|p| p.into_inner());
                std::mem::take(&mut *guard)
            }
        }
    }
}

impl Capture for AudioCapture {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.active.is_some() {
            log::warn!("capture already active, ignoring start");
            return Ok(());
        }

        let buffer = Arc::new(Mutex::new(RecordingBuffer::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel(1);

        let worker = {
            let config = self.config.clone();
            let buffer = buffer.clone();
            let stop = stop.clone();
            let faults = self.faults.clone();
            thread::Builder::new()
                .name("audio-capture".to_string())
                .spawn(move || capture_thread(config, buffer, stop, faults, ready_tx))
                .map_err(|e| CaptureError::Unknown(format!("failed to spawn capture thread: {e}")))?
        };

        match await_device_ready(&ready_rx, READY_TIMEOUT) {
            Ok(()) => {
                self.active = Some(ActiveCapture {
                    buffer,
                    stop,
                    worker,
                });
                Ok(())
            }
            Err(e) => {
                // Detached, not joined: the worker exits through the stop
                // flag once acquisition resolves, whenever that is.
                stop.store(true, Ordering::SeqCst);
                drop(worker);
                Err(e)
            }
        }
    }

    fn stop(&mut self) -> Result<EncodedPayload, CaptureError> {
        let Some(active) = self.active.take() else {
            return Err(CaptureError::Unknown("no capture active".to_string()));
        };
        let buffer = Self::shutdown(active);
        log::info!(
            "capture stopped: {} fragments, {} bytes",
            buffer.fragment_count(),
            buffer.byte_len()
        );
        Ok(payload::encode(&buffer.assemble()))
    }

    fn is_capturing(&self) -> bool {
        self.active.is_some()
    }

    fn name(&self) -> &'static str {
        "cpal"
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            let _ = Self::shutdown(active);
        }
    }
}

type ReadySender = std::sync::mpsc::SyncSender<Result<(), CaptureError>>;

/// Owns the device stream for one capture. The stream is created and dropped
/// on this thread, so the device is released on every exit path.
fn capture_thread(
    config: CaptureConfig,
    buffer: Arc<Mutex<RecordingBuffer>>,
    stop: Arc<AtomicBool>,
    faults: mpsc::UnboundedSender<CaptureError>,
    ready: ReadySender,
) {
    let on_fragment = {
        let buffer = buffer.clone();
        move |bytes: Vec<u8>| {
            let mut guard = buffer.lock().unwrap_or_else(|p| p.into_inner());
            guard.push(bytes);
        }
    };
    let on_error = move |err: CaptureError| {
        log::error!("input stream fault: {err}");
        let _ = faults.send(err);
    };

    let (stream, params) = match device::open_input(&config, on_fragment, on_error) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    log::info!(
        "capture started: device \"{}\", {} Hz, {} ch",
        params.device_name,
        params.sample_rate,
        params.channels
    );
    let _ = ready.send(Ok(()));

    while !stop.load(Ordering::Relaxed) {
        thread::sleep(STOP_POLL_INTERVAL);
    }

    drop(stream);
}

/// Wait for the capture thread to report its acquisition outcome, giving up
/// after `timeout` so a stuck device surfaces as an error instead of
/// stalling the caller.
fn await_device_ready(
    ready: &std::sync::mpsc::Receiver<Result<(), CaptureError>>,
    timeout: Duration,
) -> Result<(), CaptureError> {
    match ready.recv_timeout(timeout) {
        Ok(outcome) => outcome,
        Err(RecvTimeoutError::Timeout) => Err(CaptureError::Unknown(
            "input device did not become ready in time".to_string(),
        )),
        Err(RecvTimeoutError::Disconnected) => Err(CaptureError::Unknown(
            "capture thread exited during device setup".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_assembles_fragments_in_order() {
        let mut buffer = RecordingBuffer::new();
        buffer.push(vec![1, 2, 3]);
        buffer.push(vec![4, 5]);
        assert_eq!(buffer.fragment_count(), 2);
        assert_eq!(buffer.byte_len(), 5);
        assert_eq!(buffer.assemble(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn empty_buffer_assembles_to_nothing() {
        assert!(RecordingBuffer::new().assemble().is_empty());
    }

    #[test]
    fn assembled_payload_equals_encoding_the_concatenation() {
        let mut buffer = RecordingBuffer::new();
        buffer.push(vec![10, 20]);
        buffer.push(vec![30]);
        let via_buffer = payload::encode(&buffer.assemble());
        assert_eq!(via_buffer, payload::encode(&[10, 20, 30]));
    }

    #[test]
    fn every_error_kind_carries_a_hint() {
        let errors = [
            CaptureError::PermissionDenied,
            CaptureError::DeviceNotFound,
            CaptureError::Unsupported,
            CaptureError::SecurityRestricted,
            CaptureError::Unknown("boom".to_string()),
        ];
        for err in &errors {
            assert!(err.hint().ends_with("try again.") || err.hint().contains("input device"));
        }
        assert_eq!(
            CaptureError::PermissionDenied.hint(),
            "Microphone permission denied. Please allow microphone access and try again."
        );
    }

    #[test]
    fn unknown_error_keeps_its_detail() {
        let err = CaptureError::Unknown("device unplugged".to_string());
        assert_eq!(err.to_string(), "capture failed: device unplugged");
    }

    #[test]
    fn ready_wait_passes_the_outcome_through() {
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        tx.send(Ok(())).unwrap();
        assert_eq!(await_device_ready(&rx, Duration::from_secs(1)), Ok(()));

        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        tx.send(Err(CaptureError::DeviceNotFound)).unwrap();
        assert_eq!(
            await_device_ready(&rx, Duration::from_secs(1)),
            Err(CaptureError::DeviceNotFound)
        );
    }

    #[test]
    fn ready_wait_gives_up_instead_of_hanging() {
        // Sender held open but silent, like a device stuck in acquisition.
        let (_tx, rx) = std::sync::mpsc::sync_channel::<Result<(), CaptureError>>(1);
        let err = await_device_ready(&rx, Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, CaptureError::Unknown(_)));
    }

    #[test]
    fn ready_wait_reports_a_dead_thread() {
        let (tx, rx) = std::sync::mpsc::sync_channel::<Result<(), CaptureError>>(1);
        drop(tx);
        let err = await_device_ready(&rx, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, CaptureError::Unknown(_)));
    }
}
