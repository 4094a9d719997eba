//! Control loop: the consumer side of the capture queue.
//!
//! # Architecture
//!
//! ```text
//! capture thread ──▶ BlockQueue (drop-oldest) ──▶ Detector::run()  ← async
//!        │                                            │
//!        └── watch<CaptureState> ─────────────────────┤
//!                                                     ├─ StreamMatcher::ingest
//! CancellationToken (Ctrl-C) ─────────────────────────┘      └─ MatchAction
//!                                                     ▼
//!                                          (RunOutcome, RunStats)
//! ```
//!
//! Only the detector decides when a run ends; actions merely report an
//! [`ActionOutcome`](crate::action::ActionOutcome).

pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use runner::Detector;
pub use state::{RunOutcome, RunStats};
