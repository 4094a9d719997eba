//! The consumer loop: drains the capture queue into the matcher.
//!
//! # Loop
//!
//! ```text
//! loop
//!   ├─ spawn_blocking: pop queued blocks ─▶ StreamMatcher::ingest   (FIFO)
//!   │     ├─ Matched + Handled + stop_on_handled ─▶ ActionHandled  (no more ingest)
//!   │     └─ stop token seen between blocks ──────▶ rest discarded
//!   ├─ stop token cancelled ──────────────────────▶ Stopped
//!   ├─ capture no longer running ─▶ final drain ──▶ CaptureEnded(reason)
//!   └─ select { stop.cancelled(), sleep(poll_interval) }
//! ```
//!
//! Correlation and the action both run on tokio's blocking pool, so the
//! async workers stay free for the timer and the Ctrl-C listener.  The loop
//! never spins: an empty queue parks it on the tokio timer until the next
//! poll or the stop token, whichever comes first.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::action::ActionOutcome;
use crate::audio::{BlockQueue, CaptureFeed, CaptureState};
use crate::config::DetectorConfig;
use crate::matcher::{Evaluation, StreamMatcher};

use super::state::{RunOutcome, RunStats};

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

/// How a drain pass ended.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Drained {
    /// The queue is empty.
    Empty,
    /// An action reported `Handled` and the run must end; nothing after the
    /// matching block was ingested.
    Handled(f32),
    /// The stop token fired between blocks.
    Interrupted,
}

/// Matcher plus bookkeeping, shared with the blocking pool for each drain.
struct Consumer {
    matcher: StreamMatcher,
    queue: Arc<BlockQueue>,
    stop_on_handled: bool,
    next_sequence: Option<u64>,
    stats: RunStats,
}

impl Consumer {
    /// Ingest queued blocks in order until the queue is empty, the stop token
    /// fires, or a handled action ends the run.
    fn drain(&mut self, stop: &CancellationToken) -> Drained {
        while !stop.is_cancelled() {
            let Some(block) = self.queue.pop() else {
                return Drained::Empty;
            };
            if let Some(expected) = self.next_sequence {
                if block.sequence != expected {
                    log::debug!(
                        "detector: {} block(s) lost to queue overflow",
                        block.sequence.saturating_sub(expected)
                    );
                }
            }
            self.next_sequence = Some(block.sequence + 1);

            let evaluation = self.matcher.ingest(&block.samples);
            self.stats.record(block.len(), &evaluation);

            if let Evaluation::Matched { result, outcome } = evaluation {
                match outcome {
                    ActionOutcome::Handled if self.stop_on_handled => {
                        return Drained::Handled(result.score)
                    }
                    ActionOutcome::Handled => {
                        log::info!("detector: action handled, still listening");
                    }
                    ActionOutcome::AlreadyActive => {
                        log::info!("detector: target already active, still listening");
                    }
                    ActionOutcome::Failed(reason) => {
                        log::warn!("detector: action failed: {reason}");
                    }
                }
            }
        }
        Drained::Interrupted
    }
}

fn lock(consumer: &Mutex<Consumer>) -> MutexGuard<'_, Consumer> {
    consumer.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Single consumer of a [`CaptureFeed`].
///
/// Owns the [`StreamMatcher`] (and through it the action), so actions are
/// only ever invoked from this loop, one drain at a time.
pub struct Detector {
    consumer: Arc<Mutex<Consumer>>,
    feed: CaptureFeed,
    poll_interval: Duration,
}

impl Detector {
    pub fn new(
        matcher: StreamMatcher,
        feed: CaptureFeed,
        config: &DetectorConfig,
        stop_on_handled: bool,
    ) -> Self {
        let consumer = Consumer {
            matcher,
            queue: Arc::clone(&feed.queue),
            stop_on_handled,
            next_sequence: None,
            stats: RunStats::default(),
        };
        Self {
            consumer: Arc::new(Mutex::new(consumer)),
            feed,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }

    /// Consume blocks until the stop token fires, the capture ends, or a
    /// handled action ends the run.
    ///
    /// When the capture ends on its own, blocks still queued are processed
    /// before returning.  After a stop request or a handled action they are
    /// left unprocessed and counted in [`RunStats::discarded_blocks`].
    pub async fn run(self, stop: CancellationToken) -> (RunOutcome, RunStats) {
        {
            let consumer = lock(&self.consumer);
            log::info!(
                "detector: listening for a {}-sample etalon (threshold {:.2})",
                consumer.matcher.reference().len(),
                consumer.matcher.threshold()
            );
        }

        let outcome = loop {
            if let Drained::Handled(score) = self.drain(&stop).await {
                break RunOutcome::ActionHandled { score };
            }
            if stop.is_cancelled() {
                break RunOutcome::Stopped;
            }
            if !self.feed.is_running() {
                let ended = match self.feed.current_state() {
                    CaptureState::Terminated(reason) => RunOutcome::CaptureEnded(reason),
                    other => RunOutcome::CaptureEnded(format!("capture {other:?}")),
                };
                // Blocks pushed before the capture stopped are visible now.
                break match self.drain(&stop).await {
                    Drained::Handled(score) => RunOutcome::ActionHandled { score },
                    Drained::Empty | Drained::Interrupted => ended,
                };
            }

            tokio::select! {
                _ = stop.cancelled() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        };

        let mut stats = std::mem::take(&mut lock(&self.consumer).stats);
        stats.dropped_blocks = self.feed.queue.evicted();
        stats.discarded_blocks = self.feed.queue.len() as u64;
        log::info!(
            "detector: {outcome} ({} blocks, {} evaluations, {} matches, {} dropped, {} discarded)",
            stats.blocks,
            stats.evaluations,
            stats.matches,
            stats.dropped_blocks,
            stats.discarded_blocks
        );
        (outcome, stats)
    }

    /// One drain pass on the blocking pool.
    async fn drain(&self, stop: &CancellationToken) -> Drained {
        if self.feed.queue.is_empty() {
            return Drained::Empty;
        }
        let consumer = Arc::clone(&self.consumer);
        let stop = stop.clone();
        match tokio::task::spawn_blocking(move || lock(&consumer).drain(&stop)).await {
            Ok(drained) => drained,
            Err(e) => match e.try_into_panic() {
                Ok(payload) => std::panic::resume_unwind(payload),
                Err(e) => {
                    log::error!("detector: drain task did not run: {e}");
                    Drained::Interrupted
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
