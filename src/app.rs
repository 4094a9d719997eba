//! Application wiring: startup ordering around one detector run.
//!
//! # Startup sequence
//!
//! 1. Load the etalon and build the [`StreamMatcher`].  Failure here is
//!    fatal and the input device is never touched.
//! 2. If `action.exit_if_running` is set and the target process is already
//!    up, return [`RunOutcome::TargetAlreadyActive`] without capturing.
//! 3. Start the [`CaptureSource`].  Failure is fatal and no consumer runs.
//! 4. Run the [`Detector`] until it reports a [`RunOutcome`].
//! 5. Stop the capture (joins the thread and closes the device).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::action::{LaunchAction, MatchAction, ProcessCheck};
use crate::audio::{CaptureSource, DeviceError, DeviceOpener};
use crate::config::AppConfig;
use crate::matcher::{Reference, ReferenceError, StreamMatcher};
use crate::pipeline::{Detector, RunOutcome, RunStats};

// ---------------------------------------------------------------------------
// StartupError
// ---------------------------------------------------------------------------

/// Failures that prevent a run from starting at all.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("cannot load etalon: {0}")]
    Reference(#[from] ReferenceError),

    #[error("cannot open audio input: {0}")]
    Device(#[from] DeviceError),
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// One configured detector, ready to run.
pub struct App<O: DeviceOpener> {
    config: AppConfig,
    opener: O,
    processes: Arc<dyn ProcessCheck>,
    action: Box<dyn MatchAction>,
}

impl<O: DeviceOpener> App<O> {
    pub fn new(
        config: AppConfig,
        opener: O,
        processes: Arc<dyn ProcessCheck>,
        action: Box<dyn MatchAction>,
    ) -> Self {
        Self {
            config,
            opener,
            processes,
            action,
        }
    }

    /// An app whose action launches `config.action.executable`.
    pub fn with_launch_action(
        config: AppConfig,
        opener: O,
        processes: Arc<dyn ProcessCheck>,
    ) -> Self {
        let action = LaunchAction::new(&config.action, Arc::clone(&processes));
        Self::new(config, opener, processes, Box::new(action))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run the startup sequence and the detector.
    ///
    /// # Errors
    ///
    /// [`StartupError`] when the etalon cannot be loaded or the input device
    /// cannot be opened.  Everything after startup is reported through the
    /// returned [`RunOutcome`].
    pub async fn run(self, stop: CancellationToken) -> Result<(RunOutcome, RunStats), StartupError> {
        let Self {
            config,
            opener,
            processes,
            action,
        } = self;

        let reference = Reference::load(&config.detector.etalon_file)?;
        let matcher = StreamMatcher::new(reference, &config.detector, action)?;

        if config.action.exit_if_running && processes.is_running(&config.action.target_process) {
            log::info!(
                "app: {} is already running, nothing to listen for",
                config.action.target_process
            );
            return Ok((RunOutcome::TargetAlreadyActive, RunStats::default()));
        }

        let mut capture = CaptureSource::new(opener, config.detector.clone());
        let feed = capture.start()?;

        let detector = Detector::new(
            matcher,
            feed,
            &config.detector,
            config.action.stop_on_handled,
        );
        let (outcome, stats) = detector.run(stop).await;

        capture.stop();
        log::info!(
            "app: run finished after {:.1} s of audio",
            stats.audio_secs(config.detector.sample_rate)
        );
        Ok((outcome, stats))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tempfile::tempdir;

    use crate::action::ActionOutcome;
    use crate::audio::MockOpener;

    struct StaticCheck(bool);

    impl ProcessCheck for StaticCheck {
        fn is_running(&self, _name: &str) -> bool {
            self.0
        }
    }

    fn etalon() -> Vec<f32> {
        (0..200)
            .map(|i| 0.4 * (2.0 * std::f32::consts::PI * i as f32 / 16.0).sin())
            .collect()
    }

    fn write_etalon(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("etalon.json");
        let json = serde_json::to_string(&etalon()).expect("serialize");
        std::fs::write(&path, json).expect("write etalon");
        path
    }

    fn config(etalon_file: std::path::PathBuf) -> AppConfig {
        let mut config = AppConfig::default();
        config.detector.sample_rate = 8_000;
        config.detector.chunk_size = 128;
        config.detector.poll_interval_ms = 2;
        config.detector.etalon_file = etalon_file;
        config
    }

    fn counting_action(count: &Arc<AtomicUsize>) -> Box<dyn MatchAction> {
        let count = Arc::clone(count);
        Box::new(move |_score: f32| {
            count.fetch_add(1, Ordering::SeqCst);
            ActionOutcome::Handled
        })
    }

    fn blocks_with_etalon() -> Vec<Vec<i16>> {
        let mut stream = vec![0_i16; 4_000];
        for (i, s) in etalon().iter().enumerate() {
            stream[1_000 + i] = (s * 32_768.0).round() as i16;
        }
        stream.chunks(128).map(<[i16]>::to_vec).collect()
    }

    async fn run(app: App<MockOpener>) -> Result<(RunOutcome, RunStats), StartupError> {
        tokio::time::timeout(Duration::from_secs(20), app.run(CancellationToken::new()))
            .await
            .expect("app did not finish in time")
    }

    #[tokio::test]
    async fn missing_etalon_never_opens_device() {
        let dir = tempdir().expect("temp dir");
        let opener = MockOpener::blocks(Vec::new());
        let count = Arc::new(AtomicUsize::new(0));
        let app = App::new(
            config(dir.path().join("missing.json")),
            opener.clone(),
            Arc::new(StaticCheck(false)),
            counting_action(&count),
        );

        let err = run(app).await.expect_err("startup must fail");
        assert!(matches!(err, StartupError::Reference(ReferenceError::NotFound(_))));
        assert_eq!(opener.open_count(), 0);
    }

    #[tokio::test]
    async fn etalon_longer_than_window_is_rejected() {
        let dir = tempdir().expect("temp dir");
        let mut cfg = config(write_etalon(dir.path()));
        cfg.detector.sample_rate = 50;
        cfg.detector.window_secs = 1;
        let opener = MockOpener::blocks(Vec::new());
        let app = App::new(
            cfg,
            opener.clone(),
            Arc::new(StaticCheck(false)),
            Box::new(|_: f32| ActionOutcome::Handled),
        );

        let err = run(app).await.expect_err("startup must fail");
        assert!(matches!(err, StartupError::Reference(ReferenceError::TooLong { .. })));
        assert_eq!(opener.open_count(), 0);
    }

    #[tokio::test]
    async fn device_failure_never_runs_consumer() {
        let dir = tempdir().expect("temp dir");
        let opener = MockOpener::failing("unplugged");
        let count = Arc::new(AtomicUsize::new(0));
        let app = App::new(
            config(write_etalon(dir.path())),
            opener.clone(),
            Arc::new(StaticCheck(false)),
            counting_action(&count),
        );

        let err = run(app).await.expect_err("startup must fail");
        assert!(matches!(err, StartupError::Device(_)));
        assert!(err.to_string().contains("unplugged"));
        assert_eq!(opener.open_count(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn running_target_skips_capture() {
        let dir = tempdir().expect("temp dir");
        let opener = MockOpener::blocks(blocks_with_etalon());
        let app = App::new(
            config(write_etalon(dir.path())),
            opener.clone(),
            Arc::new(StaticCheck(true)),
            Box::new(|_: f32| ActionOutcome::Handled),
        );

        let (outcome, _) = run(app).await.expect("startup succeeds");
        assert_eq!(outcome, RunOutcome::TargetAlreadyActive);
        assert_eq!(opener.open_count(), 0);
    }

    #[tokio::test]
    async fn running_target_is_ignored_when_not_configured() {
        let dir = tempdir().expect("temp dir");
        let mut cfg = config(write_etalon(dir.path()));
        cfg.action.exit_if_running = false;
        let opener = MockOpener::blocks(Vec::new());
        let app = App::new(
            cfg,
            opener.clone(),
            Arc::new(StaticCheck(true)),
            Box::new(|_: f32| ActionOutcome::AlreadyActive),
        );

        let (outcome, _) = run(app).await.expect("startup succeeds");
        assert!(matches!(outcome, RunOutcome::CaptureEnded(_)));
        assert_eq!(opener.open_count(), 1);
    }

    #[tokio::test]
    async fn end_to_end_detection_closes_device() {
        let dir = tempdir().expect("temp dir");
        let opener = MockOpener::blocks(blocks_with_etalon());
        let count = Arc::new(AtomicUsize::new(0));
        let app = App::new(
            config(write_etalon(dir.path())),
            opener.clone(),
            Arc::new(StaticCheck(false)),
            counting_action(&count),
        );

        let (outcome, stats) = run(app).await.expect("startup succeeds");
        match outcome {
            RunOutcome::ActionHandled { score } => assert!(score > 0.8),
            other => panic!("expected ActionHandled, got {other:?}"),
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(stats.matches, 1);
        assert_eq!(opener.close_count(), 1);
    }

    #[tokio::test]
    async fn launch_action_reports_missing_executable() {
        let dir = tempdir().expect("temp dir");
        let mut cfg = config(write_etalon(dir.path()));
        cfg.action.executable = dir.path().join("no-such-launcher");
        cfg.action.fallback_executables.clear();
        let opener = MockOpener::blocks(blocks_with_etalon());
        let app = App::with_launch_action(cfg, opener.clone(), Arc::new(StaticCheck(false)));

        let (outcome, stats) = run(app).await.expect("startup succeeds");
        assert!(matches!(outcome, RunOutcome::CaptureEnded(_)));
        assert_eq!(stats.matches, 1);
    }
}
