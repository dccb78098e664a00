//! cpal input-device handling.
//!
//! Everything platform-specific stays here: device selection, stream
//! construction per sample format, and the mapping from backend errors into
//! the capture error taxonomy.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BuildStreamError, DefaultStreamConfigError, Device, DevicesError, PlayStreamError,
    SampleFormat, Stream, StreamConfig, StreamError,
};

use super::capture::{CaptureConfig, CaptureError};

/// Parameters actually negotiated with the input device.
#[derive(Debug, Clone)]
pub struct InputParams {
    pub device_name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Open the configured input device and start streaming from it.
///
/// `on_fragment` receives interleaved 16-bit little-endian PCM in arrival
/// order; `on_error` receives faults that happen after a successful open.
/// Dropping the returned stream releases the device.
pub fn open_input(
    config: &CaptureConfig,
    on_fragment: impl FnMut(Vec<u8>) + Send + 'static,
    mut on_error: impl FnMut(CaptureError) + Send + 'static,
) -> Result<(Stream, InputParams), CaptureError> {
    let host = cpal::default_host();
    let device = select_device(&host, config.device.as_deref())?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let supported = device.default_input_config()?;
    let sample_format = supported.sample_format();
    let mut stream_config: StreamConfig = supported.into();
    if let Some(rate) = config.sample_rate {
        stream_config.sample_rate = cpal::SampleRate(rate);
    }
    if let Some(channels) = config.channels {
        stream_config.channels = channels;
    }

    let err_cb = move |e: StreamError| on_error(map_stream_error(e));
    let stream = build_stream(&device, &stream_config, sample_format, on_fragment, err_cb)?;
    stream.play()?;

    let params = InputParams {
        device_name,
        sample_rate: stream_config.sample_rate.0,
        channels: stream_config.channels,
    };
    Ok((stream, params))
}

fn select_device(host: &cpal::Host, preferred: Option<&str>) -> Result<Device, CaptureError> {
    if let Some(want) = preferred {
        let mut devices = host.input_devices()?;
        if let Some(device) = devices.find(|d| d.name().map(|n| n == want).unwrap_or(false)) {
            log::info!("using preferred input device: {want}");
            return Ok(device);
        }
        log::warn!("input device {want:?} not found, falling back to default");
    }
    host.default_input_device()
        .ok_or(CaptureError::DeviceNotFound)
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    mut on_fragment: impl FnMut(Vec<u8>) + Send + 'static,
    err_cb: impl FnMut(StreamError) + Send + 'static,
) -> Result<Stream, CaptureError> {
    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _| on_fragment(samples_to_bytes(data)),
            err_cb,
            None,
        )?,
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _| {
                let converted: Vec<i16> =
                    data.iter().map(|&s| (s * i16::MAX as f32) as i16).collect();
                on_fragment(samples_to_bytes(&converted));
            },
            err_cb,
            None,
        )?,
        other => {
            log::error!("unsupported input sample format: {other:?}");
            return Err(CaptureError::Unsupported);
        }
    };
    Ok(stream)
}

/// Interleaved samples → little-endian bytes, the layout the service expects.
fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Map a backend's free-text description onto a cause the session can act on.
fn classify_backend(description: &str) -> CaptureError {
    let lower = description.to_ascii_lowercase();
    if lower.contains("permission")
        || lower.contains("not permitted")
        || lower.contains("access denied")
    {
        CaptureError::PermissionDenied
    } else if lower.contains("privilege") || lower.contains("restricted") || lower.contains("policy")
    {
        CaptureError::SecurityRestricted
    } else if lower.contains("no such device")
        || lower.contains("not found")
        || lower.contains("disconnected")
    {
        CaptureError::DeviceNotFound
    } else {
        CaptureError::Unknown(description.to_string())
    }
}

impl From<DevicesError> for CaptureError {
    fn from(e: DevicesError) -> Self {
        match e {
            DevicesError::BackendSpecific { err } => classify_backend(&err.description),
        }
    }
}

impl From<DefaultStreamConfigError> for CaptureError {
    fn from(e: DefaultStreamConfigError) -> Self {
        match e {
            DefaultStreamConfigError::DeviceNotAvailable => CaptureError::DeviceNotFound,
            DefaultStreamConfigError::StreamTypeNotSupported => CaptureError::Unsupported,
            DefaultStreamConfigError::BackendSpecific { err } => classify_backend(&err.description),
        }
    }
}

impl From<BuildStreamError> for CaptureError {
    fn from(e: BuildStreamError) -> Self {
        match e {
            BuildStreamError::DeviceNotAvailable => CaptureError::DeviceNotFound,
            BuildStreamError::StreamConfigNotSupported => CaptureError::Unsupported,
            BuildStreamError::InvalidArgument => CaptureError::Unsupported,
            BuildStreamError::StreamIdOverflow => {
                CaptureError::Unknown("stream id overflow".to_string())
            }
            BuildStreamError::BackendSpecific { err } => classify_backend(&err.description),
        }
    }
}

impl From<PlayStreamError> for CaptureError {
    fn from(e: PlayStreamError) -> Self {
        match e {
            PlayStreamError::DeviceNotAvailable => CaptureError::DeviceNotFound,
            PlayStreamError::BackendSpecific { err } => classify_backend(&err.description),
        }
    }
}

fn map_stream_error(e: StreamError) -> CaptureError {
    match e {
        StreamError::DeviceNotAvailable => CaptureError::DeviceNotFound,
        StreamError::BackendSpecific { err } => classify_backend(&err.description),
    }
}
