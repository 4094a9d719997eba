//! Etalon matching: rolling buffer, valid-mode cross-correlation, decision.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                    StreamMatcher                       │
//! │                                                       │
//! │  SampleBlock ─▶ RollingWindow ─▶ Correlator ─▶ score  │
//! │                  (2 s, f32)     (vs Reference)   │     │
//! │                                                  ▼     │
//! │                        score > threshold ─▶ MatchAction│
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust
//! use sound_trigger::action::ActionOutcome;
//! use sound_trigger::config::DetectorConfig;
//! use sound_trigger::matcher::{Reference, StreamMatcher};
//!
//! let reference = Reference::from_json("[0.5, -0.5, 0.5, -0.5]").unwrap();
//! let action = Box::new(|score: f32| {
//!     println!("heard it ({score:.2})");
//!     ActionOutcome::Handled
//! });
//! let mut matcher = StreamMatcher::new(reference, &DetectorConfig::default(), action).unwrap();
//!
//! let evaluation = matcher.ingest(&[0, 16_384, -16_384, 16_384, -16_384, 0]);
//! assert!(evaluation.is_match());
//! assert_eq!(matcher.buffered_len(), 0);
//! ```

pub mod correlate;
pub mod etalon;
pub mod stream;
pub mod window;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use correlate::Correlator;
pub use etalon::{Reference, ReferenceError};
pub use stream::{DetectionResult, Evaluation, MatcherState, StreamMatcher};
pub use window::{pcm_to_f32, RollingWindow, PCM_FULL_SCALE};
