//! Run outcome and counters reported by the control loop.
//!
//! [`RunOutcome`] says *why* a run ended; [`RunStats`] says how much audio it
//! saw on the way.  Both are plain values handed back to the caller of
//! [`Detector::run`](super::Detector::run) / [`App::run`](crate::app::App::run).

use std::fmt;

use crate::matcher::Evaluation;

// ---------------------------------------------------------------------------
// RunOutcome
// ---------------------------------------------------------------------------

/// Why the detector stopped listening.
///
/// ```text
/// start ──stop token──────────────▶ Stopped   (backlog discarded)
///       ──device fault, drained───▶ CaptureEnded(reason)
///       ──Handled + stop_on_handled▶ ActionHandled { score }
///       ──target already running──▶ TargetAlreadyActive   (before capture)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The stop token was cancelled (Ctrl-C or an embedding caller).
    Stopped,

    /// The capture thread ended on its own; every queued block was processed
    /// before returning.
    CaptureEnded(String),

    /// A match fired and the action reported [`Handled`]; the run ends here.
    ///
    /// [`Handled`]: crate::action::ActionOutcome::Handled
    ActionHandled { score: f32 },

    /// The target process was already running at startup, so nothing was
    /// captured.
    TargetAlreadyActive,
}

impl RunOutcome {
    /// Whether the run ended the way a user would call "successful".
    ///
    /// ```
    /// use sound_trigger::pipeline::RunOutcome;
    ///
    /// assert!(RunOutcome::Stopped.is_clean());
    /// assert!(RunOutcome::ActionHandled { score: 0.9 }.is_clean());
    /// assert!(RunOutcome::TargetAlreadyActive.is_clean());
    /// assert!(!RunOutcome::CaptureEnded("unplugged".into()).is_clean());
    /// ```
    pub fn is_clean(&self) -> bool {
        !matches!(self, RunOutcome::CaptureEnded(_))
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Stopped => write!(f, "stopped"),
            RunOutcome::CaptureEnded(reason) => write!(f, "capture ended: {reason}"),
            RunOutcome::ActionHandled { score } => {
                write!(f, "etalon detected (score {score:.3}), action handled")
            }
            RunOutcome::TargetAlreadyActive => write!(f, "target already running"),
        }
    }
}

// ---------------------------------------------------------------------------
// RunStats
// ---------------------------------------------------------------------------

/// Counters accumulated over one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    /// Blocks taken off the capture queue.
    pub blocks: u64,
    /// Samples contained in those blocks.
    pub samples: u64,
    /// Correlations actually computed.
    pub evaluations: u64,
    pub matches: u64,
    /// Blocks the capture queue evicted on overflow.
    pub dropped_blocks: u64,
    /// Blocks still queued when the run ended on a stop request or a
    /// handled action.
    pub discarded_blocks: u64,
    /// Highest score seen, matched or not.
    pub best_score: Option<f32>,
}

impl RunStats {
    /// Fold one block and its evaluation into the counters.
    pub fn record(&mut self, block_len: usize, evaluation: &Evaluation) {
        self.blocks += 1;
        self.samples += block_len as u64;

        let Some(result) = evaluation.result() else {
            return;
        };
        self.evaluations += 1;
        if result.matched {
            self.matches += 1;
        }
        if self.best_score.map_or(true, |best| result.score > best) {
            self.best_score = Some(result.score);
        }
    }

    /// Seconds of audio consumed at `sample_rate`.
    pub fn audio_secs(&self, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.samples as f64 / f64::from(sample_rate)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
