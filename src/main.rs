//! Application entry point.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load and validate [`AppConfig`] (defaults when no file exists).
//! 3. Create the [`tokio`] runtime.
//! 4. Install Ctrl-C as the stop token.
//! 5. Build the cpal input, the process check and the launch action.
//! 6. Run the [`App`] on the runtime until it reports an outcome.

use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use sound_trigger::{
    action::CommandCheck,
    app::App,
    audio::CpalInput,
    config::{AppConfig, AppPaths},
};

fn main() -> ExitCode {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("sound-trigger starting up");

    // 2. Configuration
    let mut config = match AppConfig::load().and_then(|c| c.validate().map(|()| c)) {
        Ok(config) => config,
        Err(e) => {
            log::error!("configuration error: {e:#}");
            eprintln!("sound-trigger: configuration error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    config.detector.etalon_file = AppPaths::new().resolve_data_file(&config.detector.etalon_file);
    log::info!("etalon file: {}", config.detector.etalon_file.display());

    // 3. Tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("sound-trigger: failed to create tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    // 4. Ctrl-C → stop token
    let stop = CancellationToken::new();
    {
        let stop = stop.clone();
        rt.spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    log::info!("Ctrl-C received, stopping");
                    stop.cancel();
                }
                Err(e) => log::warn!("cannot listen for Ctrl-C: {e}"),
            }
        });
    }

    // 5. Collaborators
    let opener = CpalInput::new(config.capture.device.clone());
    let app = App::with_launch_action(config, opener, Arc::new(CommandCheck));

    // 6. Run
    match rt.block_on(app.run(stop)) {
        Ok((outcome, stats)) => {
            log::info!(
                "sound-trigger finished: {outcome} (best score {})",
                stats
                    .best_score
                    .map_or_else(|| "n/a".to_string(), |s| format!("{s:.3}"))
            );
            if outcome.is_clean() {
                ExitCode::SUCCESS
            } else {
                eprintln!("sound-trigger: {outcome}");
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            log::error!("startup failed: {e}");
            eprintln!("sound-trigger: {e}");
            ExitCode::FAILURE
        }
    }
}
