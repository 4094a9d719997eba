//! Launch an application when the etalon is heard, unless it already runs.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
use std::sync::Arc;
use std::thread::JoinHandle;

use super::{ActionOutcome, MatchAction, ProcessCheck};
use crate::config::ActionConfig;

/// Starts `target_process` from the first executable path that exists.
pub struct LaunchAction {
    processes: Arc<dyn ProcessCheck>,
    target_process: String,
    candidates: Vec<PathBuf>,
    args: Vec<String>,
}

impl LaunchAction {
    pub fn new(config: &ActionConfig, processes: Arc<dyn ProcessCheck>) -> Self {
        let mut candidates = Vec::with_capacity(1 + config.fallback_executables.len());
        candidates.push(config.executable.clone());
        candidates.extend(config.fallback_executables.iter().cloned());

        Self {
            processes,
            target_process: config.target_process.clone(),
            candidates,
            args: config.args.clone(),
        }
    }

    /// First candidate that exists on disk.
    pub fn resolve_executable(&self) -> Option<&Path> {
        self.candidates
            .iter()
            .map(PathBuf::as_path)
            .find(|p| p.is_file())
    }
}

impl MatchAction for LaunchAction {
    fn trigger(&mut self, score: f32) -> ActionOutcome {
        if self.processes.is_running(&self.target_process) {
            log::info!(
                "action: {} is already running, nothing to launch",
                self.target_process
            );
            return ActionOutcome::AlreadyActive;
        }

        let Some(executable) = self.resolve_executable() else {
            let tried: Vec<String> = self
                .candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            log::error!(
                "action: no executable found for {} (tried: {})",
                self.target_process,
                tried.join(", ")
            );
            return ActionOutcome::Failed(format!(
                "executable not found; set action.executable in the settings file (tried {})",
                tried.join(", ")
            ));
        };

        match Command::new(executable).args(&self.args).spawn() {
            Ok(child) => {
                log::info!(
                    "action: launched {} (pid {}, score {score:.3})",
                    executable.display(),
                    child.id()
                );
                reap_in_background(child);
                ActionOutcome::Handled
            }
            Err(e) => {
                log::error!("action: failed to launch {}: {e}", executable.display());
                ActionOutcome::Failed(format!("failed to launch {}: {e}", executable.display()))
            }
        }
    }
}

/// Wait for `child` on a detached thread so it is reaped when it exits,
/// however long it outlives the detector.
fn reap_in_background(mut child: Child) -> Option<JoinHandle<io::Result<ExitStatus>>> {
    let pid = child.id();
    let spawned = std::thread::Builder::new()
        .name("launch-reaper".into())
        .spawn(move || {
            let status = child.wait();
            match &status {
                Ok(status) => log::debug!("action: launched process {pid} exited ({status})"),
                Err(e) => log::warn!("action: cannot wait for launched process {pid}: {e}"),
            }
            status
        });

    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::warn!("action: no reaper thread for process {pid}, it stays a zombie on exit: {e}");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
