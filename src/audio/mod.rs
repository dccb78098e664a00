//! audio - Microphone capture pipeline
//!
//! Device acquisition and streaming go through cpal; fragments are buffered
//! in arrival order and assembled into one base64 payload per utterance.
//! The async side only ever sees the [`Capture`] trait and fault events.

mod capture;
mod device;
pub mod payload;

pub use capture::{AudioCapture, Capture, CaptureConfig, CaptureError, RecordingBuffer};
pub use device::InputParams;
pub use payload::{EncodedPayload, PayloadDecodeError};
