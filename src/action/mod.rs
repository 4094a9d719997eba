//! Actions run when the etalon is detected.
//!
//! An action never stops the process itself.  It reports an
//! [`ActionOutcome`] and the control loop decides what happens next:
//!
//! | Outcome         | Control loop                                    |
//! |-----------------|-------------------------------------------------|
//! | `Handled`       | stop listening (when `stop_on_handled` is set)  |
//! | `AlreadyActive` | keep listening                                  |
//! | `Failed`        | log, keep listening                             |

pub mod launch;
pub mod process;

pub use launch::LaunchAction;
pub use process::{CommandCheck, ProcessCheck};

// ---------------------------------------------------------------------------
// ActionOutcome
// ---------------------------------------------------------------------------

/// Result of running an action for one detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The action did its job.
    Handled,
    /// Nothing to do: the target is already active.
    AlreadyActive,
    /// The action could not complete.
    Failed(String),
}

impl ActionOutcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, ActionOutcome::Handled)
    }
}

// ---------------------------------------------------------------------------
// MatchAction
// ---------------------------------------------------------------------------

/// Invoked by the stream matcher once per detection, with the match score.
///
/// Closures work directly:
///
/// ```rust
/// use sound_trigger::action::{ActionOutcome, MatchAction};
///
/// let mut hits = 0;
/// let mut action = |score: f32| {
///     hits += 1;
///     println!("heard it ({score:.3})");
///     ActionOutcome::Handled
/// };
/// assert_eq!(action.trigger(0.93), ActionOutcome::Handled);
/// ```
pub trait MatchAction: Send {
    fn trigger(&mut self, score: f32) -> ActionOutcome;
}

impl<F> MatchAction for F
where
    F: FnMut(f32) -> ActionOutcome + Send,
{
    fn trigger(&mut self, score: f32) -> ActionOutcome {
        self(score)
    }
}

// Compile-time assertion: Box<dyn MatchAction> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn MatchAction>) {}
};
