//! Microphone input via `cpal`.
//!
//! [`CpalInput`] is the production [`DeviceOpener`].  It negotiates a stream
//! configuration the device actually supports, preferring mono at the
//! configured rate and otherwise falling back to the device default.  The
//! callback converts every hardware buffer to mono `i16` at the configured
//! rate (see [`convert`](super::convert)) and forwards it over an mpsc
//! channel; [`CpalDevice::read_block`] reassembles exact `chunk_size` reads.
//! Dropping the device drops the `cpal::Stream`, which stops the hardware.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};

use super::capture::{DeviceError, DeviceOpener, InputDevice, ReadError};
use super::convert::MonoConverter;
use crate::config::DetectorConfig;

/// Upper bound on a single wait inside `read_block`.
const READ_TIMEOUT: Duration = Duration::from_millis(250);

enum Packet {
    Samples(Vec<i16>),
    Fault(cpal::StreamError),
}

// ---------------------------------------------------------------------------
// Config negotiation
// ---------------------------------------------------------------------------

/// The parts of a supported config range that matter for choosing one.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    channels: u16,
    min_rate: u32,
    max_rate: u32,
    format: SampleFormat,
}

impl From<&cpal::SupportedStreamConfigRange> for Candidate {
    fn from(range: &cpal::SupportedStreamConfigRange) -> Self {
        Self {
            channels: range.channels(),
            min_rate: range.min_sample_rate().0,
            max_rate: range.max_sample_rate().0,
            format: range.sample_format(),
        }
    }
}

/// Preference among the formats the callback can convert; `None` if the
/// format is not handled.
fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::I16 => Some(0),
        SampleFormat::F32 => Some(1),
        SampleFormat::U16 => Some(2),
        _ => None,
    }
}

/// Index of the best candidate that can run at `rate`: mono first, then the
/// fewest channels, then `i16` over `f32` over `u16`.
fn pick_config(candidates: &[Candidate], rate: u32) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.channels > 0 && c.min_rate <= rate && rate <= c.max_rate)
        .filter_map(|(i, c)| format_rank(c.format).map(|rank| (i, (c.channels, rank))))
        .min_by_key(|&(_, key)| key)
        .map(|(i, _)| i)
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut converter: MonoConverter,
    tx: mpsc::Sender<Packet>,
) -> Result<cpal::Stream, DeviceError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let err_tx = tx.clone();
    let mut scratch: Vec<f32> = Vec::new();

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            scratch.clear();
            scratch.extend(data.iter().map(|&s| f32::from_sample(s)));
            // Receiver gone means the device is being closed.
            let _ = tx.send(Packet::Samples(converter.convert(&scratch)));
        },
        move |err: cpal::StreamError| {
            let _ = err_tx.send(Packet::Fault(err));
        },
        None,
    )?;
    Ok(stream)
}

// ---------------------------------------------------------------------------
// CpalInput
// ---------------------------------------------------------------------------

/// Opens the default (or a named) input device on the default cpal host.
#[derive(Debug, Clone, Default)]
pub struct CpalInput {
    device_name: Option<String>,
}

impl CpalInput {
    /// `None` selects the host's default input device.
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn find_device(&self, host: &cpal::Host) -> Result<cpal::Device, DeviceError> {
        match &self.device_name {
            None => host.default_input_device().ok_or(DeviceError::NoDevice),
            Some(wanted) => host
                .input_devices()?
                .find(|d| d.name().map(|n| &n == wanted).unwrap_or(false))
                .ok_or_else(|| DeviceError::DeviceNotFound(wanted.clone())),
        }
    }

    /// A supported config at the configured rate, or the device default.
    fn negotiate(
        device: &cpal::Device,
        name: &str,
        rate: u32,
    ) -> Result<cpal::SupportedStreamConfig, DeviceError> {
        let ranges: Vec<cpal::SupportedStreamConfigRange> =
            device.supported_input_configs()?.collect();
        let candidates: Vec<Candidate> = ranges.iter().map(Candidate::from).collect();

        if let Some(range) = pick_config(&candidates, rate).and_then(|i| ranges.into_iter().nth(i)) {
            return Ok(range.with_sample_rate(cpal::SampleRate(rate)));
        }

        let fallback = device.default_input_config()?;
        log::warn!(
            "capture: {name:?} has no config at {rate} Hz, using {} Hz {}ch {:?} and resampling",
            fallback.sample_rate().0,
            fallback.channels(),
            fallback.sample_format()
        );
        Ok(fallback)
    }
}

impl DeviceOpener for CpalInput {
    type Device = CpalDevice;

    fn open(&self, config: &DetectorConfig) -> Result<CpalDevice, DeviceError> {
        let host = cpal::default_host();
        let device = self.find_device(&host)?;
        let name = device.name().unwrap_or_else(|_| "<unnamed>".into());

        let supported = Self::negotiate(&device, &name, config.sample_rate)?;
        let mut stream_config = supported.config();
        stream_config.buffer_size = cpal::BufferSize::Default;

        let converter = MonoConverter::new(
            stream_config.channels,
            stream_config.sample_rate.0,
            config.sample_rate,
        );
        let (tx, rx) = mpsc::channel::<Packet>();

        let stream = match supported.sample_format() {
            SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, converter, tx)?,
            SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, converter, tx)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, converter, tx)?,
            other => {
                return Err(DeviceError::Unavailable(format!(
                    "{name:?} only offers unsupported sample format {other:?}"
                )))
            }
        };

        stream.play()?;
        log::info!(
            "capture: opened input device {name:?} ({} Hz, {} ch, {:?})",
            stream_config.sample_rate.0,
            stream_config.channels,
            supported.sample_format()
        );

        Ok(CpalDevice {
            _stream: stream,
            rx,
            pending: VecDeque::with_capacity(config.chunk_size * 2),
        })
    }
}

// ---------------------------------------------------------------------------
// CpalDevice
// ---------------------------------------------------------------------------

/// An open cpal input stream.
pub struct CpalDevice {
    _stream: cpal::Stream,
    rx: mpsc::Receiver<Packet>,
    /// Samples received but not yet handed out.
    pending: VecDeque<i16>,
}

impl InputDevice for CpalDevice {
    fn read_block(&mut self, buf: &mut [i16]) -> Result<(), ReadError> {
        while self.pending.len() < buf.len() {
            match self.rx.recv_timeout(READ_TIMEOUT) {
                Ok(Packet::Samples(samples)) => self.pending.extend(samples),
                Ok(Packet::Fault(cpal::StreamError::DeviceNotAvailable)) => {
                    return Err(ReadError::Disconnected("device no longer available".into()));
                }
                Ok(Packet::Fault(err)) => return Err(ReadError::Overrun(err.to_string())),
                Err(mpsc::RecvTimeoutError::Timeout) => return Err(ReadError::Stalled),
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(ReadError::Disconnected("stream callback dropped".into()));
                }
            }
        }

        let n = buf.len();
        for (slot, sample) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = sample;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
