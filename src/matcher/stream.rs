//! Streaming etalon matcher.
//!
//! [`StreamMatcher`] turns each captured block into a match decision:
//!
//! ```text
//! ingest(block) ─▶ i16 / 32768 ─▶ RollingWindow (front-truncated)
//!                   len < L ? ─▶ InsufficientData        [Accumulating]
//!                   else     ─▶ evaluate()               [Ready]
//!                                 score = max normalized valid correlation
//!                                 score > threshold ?
//!                                   yes ─▶ clear window, action(score) ─▶ Matched
//!                                   no  ─▶ NoMatch
//! ```
//!
//! Clearing the whole window on a match re-arms the detector: the same sound
//! cannot score again until a full reference length of new audio arrives.

use crate::action::{ActionOutcome, MatchAction};
use crate::config::{DetectorConfig, Normalization};

use super::correlate::Correlator;
use super::etalon::{Reference, ReferenceError};
use super::window::RollingWindow;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Transient match decision for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionResult {
    pub matched: bool,
    pub score: f32,
}

/// What a single `ingest` / `evaluate` call did.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// Fewer than `required` samples buffered; nothing was evaluated.
    InsufficientData { buffered: usize, required: usize },
    /// Evaluated, score did not exceed the threshold.
    NoMatch(DetectionResult),
    /// Evaluated and matched; the window was cleared and the action ran.
    Matched {
        result: DetectionResult,
        outcome: ActionOutcome,
    },
}

impl Evaluation {
    /// The detection result, if an evaluation took place.
    pub fn result(&self) -> Option<DetectionResult> {
        match self {
            Evaluation::InsufficientData { .. } => None,
            Evaluation::NoMatch(result) | Evaluation::Matched { result, .. } => Some(*result),
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Evaluation::Matched { .. })
    }
}

/// Implicit two-state machine, derived from the buffered length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherState {
    Accumulating,
    Ready,
}

// ---------------------------------------------------------------------------
// StreamMatcher
// ---------------------------------------------------------------------------

pub struct StreamMatcher {
    reference: Reference,
    correlator: Correlator,
    window: RollingWindow,
    threshold: f32,
    normalization: Normalization,
    action: Box<dyn MatchAction>,
    evaluations: u64,
    matches: u64,
}

impl std::fmt::Debug for StreamMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamMatcher")
            .field("reference_len", &self.reference.len())
            .field("buffered", &self.window.len())
            .field("threshold", &self.threshold)
            .field("normalization", &self.normalization)
            .finish_non_exhaustive()
    }
}

impl StreamMatcher {
    /// Build a matcher owning `reference` and `action`.
    ///
    /// # Errors
    ///
    /// [`ReferenceError::TooLong`] when the reference does not fit in the
    /// rolling window; such a reference could never be detected.
    pub fn new(
        reference: Reference,
        config: &DetectorConfig,
        action: Box<dyn MatchAction>,
    ) -> Result<Self, ReferenceError> {
        let window_len = config.window_len();
        if reference.len() > window_len {
            return Err(ReferenceError::TooLong {
                len: reference.len(),
                window: window_len,
            });
        }

        Ok(Self {
            correlator: Correlator::new(&reference),
            reference,
            window: RollingWindow::new(window_len),
            threshold: config.threshold,
            normalization: config.normalization,
            action,
            evaluations: 0,
            matches: 0,
        })
    }

    /// Append one PCM block and evaluate if enough audio is buffered.
    pub fn ingest(&mut self, block: &[i16]) -> Evaluation {
        self.window.push_pcm(block);
        if self.window.len() < self.reference.len() {
            return self.insufficient();
        }
        self.evaluate()
    }

    /// Correlate the buffered audio against the reference and decide.
    ///
    /// Safe to call at any time; reports `InsufficientData` while the window
    /// is shorter than the reference.
    pub fn evaluate(&mut self) -> Evaluation {
        let score = match self
            .correlator
            .max_score(self.window.as_slice(), self.normalization)
        {
            Some(score) => score as f32,
            None => return self.insufficient(),
        };
        self.evaluations += 1;

        if score > self.threshold {
            self.window.clear();
            self.matches += 1;
            log::info!(
                "etalon detected, correlation {score:.3} (threshold {:.3})",
                self.threshold
            );
            let result = DetectionResult {
                matched: true,
                score,
            };
            let outcome = self.action.trigger(score);
            log::debug!("matcher: action outcome {outcome:?}");
            Evaluation::Matched { result, outcome }
        } else {
            log::trace!("matcher: score {score:.4}");
            Evaluation::NoMatch(DetectionResult {
                matched: false,
                score,
            })
        }
    }

    fn insufficient(&self) -> Evaluation {
        Evaluation::InsufficientData {
            buffered: self.window.len(),
            required: self.reference.len(),
        }
    }

    pub fn state(&self) -> MatcherState {
        if self.window.len() < self.reference.len() {
            MatcherState::Accumulating
        } else {
            MatcherState::Ready
        }
    }

    /// Samples currently in the rolling window.
    pub fn buffered_len(&self) -> usize {
        self.window.len()
    }

    /// Contiguous copy-free view of the rolling window.
    pub fn buffered(&mut self) -> &[f32] {
        self.window.as_slice()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn window_capacity(&self) -> usize {
        self.window.capacity()
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// Number of evaluations that produced a score.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub fn matches(&self) -> u64 {
        self.matches
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
