//! Audio capture: input device → fixed-size i16 blocks → bounded queue.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback (downmix, resample, i16)
//!           → CpalDevice::read_block (chunk_size samples)
//!           → [audio-capture thread] → BlockQueue (drop-oldest) → consumer
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use sound_trigger::audio::{CaptureSource, CpalInput};
//! use sound_trigger::config::DetectorConfig;
//!
//! let mut capture = CaptureSource::new(CpalInput::default(), DetectorConfig::default());
//! let feed = capture.start().unwrap();
//!
//! while feed.is_running() {
//!     if let Some(block) = feed.queue.pop() {
//!         println!("block #{} with {} samples", block.sequence, block.len());
//!     }
//! }
//! capture.stop();
//! ```

pub mod capture;
pub mod convert;
pub mod device;
pub mod queue;

pub use capture::{
    CaptureFeed, CaptureSource, CaptureState, DeviceError, DeviceOpener, InputDevice, ReadError,
};
pub use convert::MonoConverter;
pub use device::{CpalDevice, CpalInput};
pub use queue::{BlockQueue, SampleBlock};

#[cfg(test)]
pub use capture::{MockOpener, WhenExhausted};
