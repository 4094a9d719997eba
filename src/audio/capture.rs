//! Capture source: a dedicated OS thread that reads fixed-size blocks from an
//! input device and pushes them onto a [`BlockQueue`].
//!
//! The device is opened *inside* the capture thread so the handle never
//! crosses threads (cpal streams are not `Send` on every platform).  The open
//! result is sent back before [`CaptureSource::start`] returns, so a device
//! failure surfaces synchronously to the caller.
//!
//! ```text
//! start() ──spawn──▶ [audio-capture thread]
//!    ▲                 open device ──Err──▶ DeviceError back to start()
//!    └──── Ok ─────────┘
//!                      loop until stop token cancelled:
//!                        read_block ─Ok──────▶ queue.push
//!                                   ─Overrun─▶ warn, continue
//!                                   ─Stalled─▶ trace, continue
//!                                   ─Disconnected─▶ Terminated, exit
//! ```

use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::queue::{BlockQueue, SampleBlock};
use crate::config::DetectorConfig;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The input device could not be opened.  Fatal to the capture source.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device {0:?} not found")]
    DeviceNotFound(String),

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query supported input configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("input device unavailable: {0}")]
    Unavailable(String),

    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Outcome of a single failed read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    /// The device reported lost samples; the stream is still usable.
    #[error("input overrun: {0}")]
    Overrun(String),

    /// No data arrived within the read timeout.
    #[error("no audio received within the read timeout")]
    Stalled,

    /// The device is gone; capture cannot continue.
    #[error("input device disconnected: {0}")]
    Disconnected(String),
}

impl ReadError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReadError::Disconnected(_))
    }
}

// ---------------------------------------------------------------------------
// Device traits
// ---------------------------------------------------------------------------

/// An open input device.  Closed when dropped.
pub trait InputDevice {
    /// Block until `buf.len()` samples have been read into `buf`.
    ///
    /// Implementations must return within a bounded time (returning
    /// [`ReadError::Stalled`] if need be) so the capture loop can observe a
    /// stop request.
    fn read_block(&mut self, buf: &mut [i16]) -> Result<(), ReadError>;
}

/// Factory for [`InputDevice`]s, invoked on the capture thread.
pub trait DeviceOpener: Send + Sync + 'static {
    type Device: InputDevice;

    /// Open the device for mono i16 capture at `config.sample_rate` with
    /// `config.chunk_size`-sample reads.
    fn open(&self, config: &DetectorConfig) -> Result<Self::Device, DeviceError>;
}

// ---------------------------------------------------------------------------
// CaptureState / CaptureFeed
// ---------------------------------------------------------------------------

/// Lifecycle of the capture thread as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Running,
    /// Stopped on request.
    Stopped,
    /// The read loop hit a fatal device fault.
    Terminated(String),
}

impl CaptureState {
    pub fn is_running(&self) -> bool {
        matches!(self, CaptureState::Running)
    }
}

/// Consumer-side view of a running capture: the queue to drain and a
/// receiver for state changes.  Cheap to clone.
#[derive(Clone)]
pub struct CaptureFeed {
    pub queue: Arc<BlockQueue>,
    pub state: watch::Receiver<CaptureState>,
}

impl CaptureFeed {
    pub fn is_running(&self) -> bool {
        self.state.borrow().is_running()
    }

    pub fn current_state(&self) -> CaptureState {
        self.state.borrow().clone()
    }
}

// ---------------------------------------------------------------------------
// CaptureSource
// ---------------------------------------------------------------------------

struct Running {
    stop: CancellationToken,
    thread: JoinHandle<()>,
    feed: CaptureFeed,
}

/// Owns the capture thread and, through it, the input device.
pub struct CaptureSource<O: DeviceOpener> {
    opener: Arc<O>,
    config: DetectorConfig,
    state_tx: watch::Sender<CaptureState>,
    running: Option<Running>,
}

impl<O: DeviceOpener> CaptureSource<O> {
    pub fn new(opener: O, config: DetectorConfig) -> Self {
        let (state_tx, _) = watch::channel(CaptureState::Idle);
        Self {
            opener: Arc::new(opener),
            config,
            state_tx,
            running: None,
        }
    }

    /// Subscribe to state changes, including `Terminated`.
    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.state_tx.subscribe()
    }

    /// `true` while the capture thread is reading.
    pub fn is_running(&self) -> bool {
        self.state_tx.borrow().is_running()
    }

    /// Open the device and start the capture thread.
    ///
    /// A fresh queue is created for every run.  Calling `start` while already
    /// running logs a warning and returns the existing feed.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] when the device cannot be opened; no thread
    /// is left behind in that case.
    pub fn start(&mut self) -> Result<CaptureFeed, DeviceError> {
        if let Some(running) = &self.running {
            if !running.thread.is_finished() {
                log::warn!("capture: start() called while already running");
                return Ok(running.feed.clone());
            }
        }
        // A previous run ended on its own (device fault); reap it first.
        self.reap();

        let queue = Arc::new(BlockQueue::new(self.config.queue_capacity));
        let stop = CancellationToken::new();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), DeviceError>>(1);

        let worker = CaptureWorker {
            opener: Arc::clone(&self.opener),
            config: self.config.clone(),
            queue: Arc::clone(&queue),
            stop: stop.clone(),
            state_tx: self.state_tx.clone(),
        };

        let thread = std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || worker.run(ready_tx))
            .map_err(DeviceError::Spawn)?;

        let opened = ready_rx.recv().unwrap_or_else(|_| {
            Err(DeviceError::Unavailable(
                "capture thread exited before opening the device".into(),
            ))
        });

        if let Err(e) = opened {
            let _ = thread.join();
            return Err(e);
        }

        log::info!(
            "capture: listening ({} Hz, {} ch, {} samples/block, queue {})",
            self.config.sample_rate,
            DetectorConfig::CHANNELS,
            self.config.chunk_size,
            self.config.queue_capacity
        );

        let feed = CaptureFeed {
            queue,
            state: self.state_tx.subscribe(),
        };
        self.running = Some(Running {
            stop,
            thread,
            feed: feed.clone(),
        });
        Ok(feed)
    }

    /// Signal the capture thread, wait for it, and release the device.
    ///
    /// No-op when not running.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.stop.cancel();
        if running.thread.join().is_err() {
            log::error!("capture: capture thread panicked");
        }
        if self.state_tx.borrow().is_running() {
            self.state_tx.send_replace(CaptureState::Stopped);
        }
        log::info!(
            "capture: stopped ({} blocks dropped on overflow)",
            running.feed.queue.evicted()
        );
    }

    fn reap(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.thread.join();
        }
    }
}

impl<O: DeviceOpener> Drop for CaptureSource<O> {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// CaptureWorker (thread body)
// ---------------------------------------------------------------------------

struct CaptureWorker<O: DeviceOpener> {
    opener: Arc<O>,
    config: DetectorConfig,
    queue: Arc<BlockQueue>,
    stop: CancellationToken,
    state_tx: watch::Sender<CaptureState>,
}

impl<O: DeviceOpener> CaptureWorker<O> {
    fn run(self, ready_tx: mpsc::SyncSender<Result<(), DeviceError>>) {
        let mut device = match self.opener.open(&self.config) {
            Ok(device) => device,
            Err(e) => {
                log::error!("capture: failed to open input device: {e}");
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        self.state_tx.send_replace(CaptureState::Running);
        let _ = ready_tx.send(Ok(()));

        let mut buf = vec![0_i16; self.config.chunk_size];
        let mut sequence = 0_u64;

        while !self.stop.is_cancelled() {
            match device.read_block(&mut buf) {
                Ok(()) => {
                    self.queue.push(SampleBlock::new(sequence, buf.clone()));
                    sequence += 1;
                }
                Err(ReadError::Stalled) => {
                    log::trace!("capture: read timed out");
                }
                Err(e) if e.is_fatal() => {
                    log::error!("capture: {e}; capture terminated");
                    self.state_tx
                        .send_replace(CaptureState::Terminated(e.to_string()));
                    return;
                }
                Err(e) => {
                    log::warn!("capture: {e}; continuing");
                }
            }
        }

        drop(device);
        self.state_tx.send_replace(CaptureState::Stopped);
        log::debug!("capture: read loop exited after {sequence} blocks");
    }
}

// ---------------------------------------------------------------------------
// MockOpener  (test-only)
// ---------------------------------------------------------------------------

/// What a [`MockDevice`] does once its script is exhausted.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhenExhausted {
    /// Report a disconnect, ending the capture.
    Disconnect,
    /// Keep returning [`ReadError::Stalled`] until stopped.
    Idle,
}

/// Scripted device opener for tests: replays a fixed list of read results.
#[cfg(test)]
#[derive(Clone)]
pub struct MockOpener {
    script: Arc<std::sync::Mutex<std::collections::VecDeque<Result<Vec<i16>, ReadError>>>>,
    open_error: Option<String>,
    when_exhausted: WhenExhausted,
    pub opens: Arc<std::sync::atomic::AtomicUsize>,
    pub closes: Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
impl MockOpener {
    /// Replays `blocks`, then disconnects.
    pub fn blocks(blocks: Vec<Vec<i16>>) -> Self {
        Self::script(blocks.into_iter().map(Ok).collect(), WhenExhausted::Disconnect)
    }

    pub fn script(reads: Vec<Result<Vec<i16>, ReadError>>, when_exhausted: WhenExhausted) -> Self {
        Self {
            script: Arc::new(std::sync::Mutex::new(reads.into())),
            open_error: None,
            when_exhausted,
            opens: Default::default(),
            closes: Default::default(),
        }
    }

    /// An opener whose `open` always fails.
    pub fn failing(reason: &str) -> Self {
        Self {
            open_error: Some(reason.to_string()),
            ..Self::blocks(Vec::new())
        }
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
pub struct MockDevice {
    source: MockOpener,
}

#[cfg(test)]
impl DeviceOpener for MockOpener {
    type Device = MockDevice;

    fn open(&self, _config: &DetectorConfig) -> Result<MockDevice, DeviceError> {
        self.opens.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        match &self.open_error {
            Some(reason) => Err(DeviceError::Unavailable(reason.clone())),
            None => Ok(MockDevice {
                source: self.clone(),
            }),
        }
    }
}

#[cfg(test)]
impl InputDevice for MockDevice {
    fn read_block(&mut self, buf: &mut [i16]) -> Result<(), ReadError> {
        let next = self.source.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(samples)) => {
                buf.fill(0);
                let n = samples.len().min(buf.len());
                buf[..n].copy_from_slice(&samples[..n]);
                Ok(())
            }
            Some(Err(e)) => Err(e),
            None => match self.source.when_exhausted {
                WhenExhausted::Disconnect => Err(ReadError::Disconnected("script exhausted".into())),
                WhenExhausted::Idle => {
                    std::thread::sleep(std::time::Duration::from_millis(1));
                    Err(ReadError::Stalled)
                }
            },
        }
    }
}

#[cfg(test)]
impl Drop for MockDevice {
    fn drop(&mut self) {
        self.source
            .closes
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn config() -> DetectorConfig {
        DetectorConfig {
            chunk_size: 4,
            queue_capacity: 8,
            ..DetectorConfig::default()
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn sample_block_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<SampleBlock>();
        assert_send::<CaptureFeed>();
    }

    #[test]
    fn open_failure_is_reported_and_not_running() {
        let opener = MockOpener::failing("permission denied");
        let mut capture = CaptureSource::new(opener.clone(), config());

        let err = capture.start().err().expect("start should fail");
        assert!(matches!(err, DeviceError::Unavailable(ref r) if r == "permission denied"));
        assert!(!capture.is_running());
        assert_eq!(opener.open_count(), 1);
    }

    #[test]
    fn blocks_arrive_in_order_then_capture_terminates() {
        let opener = MockOpener::blocks(vec![vec![1, 1, 1, 1], vec![2, 2, 2, 2], vec![3, 3]]);
        let mut capture = CaptureSource::new(opener.clone(), config());
        let feed = capture.start().expect("start");

        wait_until(|| !feed.is_running());
        assert!(matches!(feed.current_state(), CaptureState::Terminated(_)));

        let blocks: Vec<SampleBlock> = std::iter::from_fn(|| feed.queue.pop()).collect();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].samples, vec![1, 1, 1, 1]);
        assert_eq!(blocks[1].sequence, 1);
        // Short reads are zero-padded to chunk_size.
        assert_eq!(blocks[2].samples, vec![3, 3, 0, 0]);
        assert_eq!(opener.close_count(), 1);
    }

    #[test]
    fn transient_faults_do_not_stop_capture() {
        let opener = MockOpener::script(
            vec![
                Ok(vec![1; 4]),
                Err(ReadError::Overrun("overflow".into())),
                Err(ReadError::Stalled),
                Ok(vec![2; 4]),
            ],
            WhenExhausted::Disconnect,
        );
        let mut capture = CaptureSource::new(opener, config());
        let feed = capture.start().expect("start");

        wait_until(|| !feed.is_running());
        let seqs: Vec<u64> = std::iter::from_fn(|| feed.queue.pop())
            .map(|b| b.sequence)
            .collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[test]
    fn stop_joins_thread_and_closes_device() {
        let opener = MockOpener::script(Vec::new(), WhenExhausted::Idle);
        let mut capture = CaptureSource::new(opener.clone(), config());
        let mut state = capture.subscribe();

        capture.start().expect("start");
        assert!(capture.is_running());
        assert_eq!(*state.borrow_and_update(), CaptureState::Running);

        capture.stop();
        assert!(!capture.is_running());
        assert_eq!(*state.borrow(), CaptureState::Stopped);
        assert_eq!(opener.close_count(), 1);

        // Second stop is a no-op.
        capture.stop();
        assert_eq!(opener.close_count(), 1);
    }

    #[test]
    fn start_while_running_is_a_no_op() {
        let opener = MockOpener::script(Vec::new(), WhenExhausted::Idle);
        let mut capture = CaptureSource::new(opener.clone(), config());

        let first = capture.start().expect("start");
        let second = capture.start().expect("second start");
        assert!(Arc::ptr_eq(&first.queue, &second.queue));
        assert_eq!(opener.open_count(), 1);
        capture.stop();
    }

    #[test]
    fn stop_without_start_is_a_no_op() {
        let opener = MockOpener::blocks(Vec::new());
        let mut capture = CaptureSource::new(opener.clone(), config());
        capture.stop();
        assert_eq!(opener.open_count(), 0);
    }

    #[test]
    fn restart_after_termination_uses_fresh_queue() {
        let opener = MockOpener::blocks(vec![vec![1; 4]]);
        let mut capture = CaptureSource::new(opener.clone(), config());

        let first = capture.start().expect("start");
        wait_until(|| !first.is_running());

        let second = capture.start().expect("restart");
        assert!(!Arc::ptr_eq(&first.queue, &second.queue));
        assert_eq!(opener.open_count(), 2);
        capture.stop();
    }

    #[test]
    fn read_error_fatality() {
        assert!(ReadError::Disconnected("gone".into()).is_fatal());
        assert!(!ReadError::Overrun("x".into()).is_fatal());
        assert!(!ReadError::Stalled.is_fatal());
    }
}
