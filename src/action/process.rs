//! "Is this process running?" queries.

use std::process::{Command, Stdio};

/// Object-safe, thread-safe process-state query.
pub trait ProcessCheck: Send + Sync {
    fn is_running(&self, name: &str) -> bool;
}

/// Asks the OS process tools: `pgrep -x` on Unix, `tasklist` on Windows.
///
/// Any failure to run the tool is logged and reported as "not running".
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandCheck;

impl ProcessCheck for CommandCheck {
    #[cfg(unix)]
    fn is_running(&self, name: &str) -> bool {
        match Command::new("pgrep")
            .arg("-x")
            .arg(name)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) => status.success(),
            Err(e) => {
                log::warn!("process check: cannot run pgrep: {e}");
                false
            }
        }
    }

    #[cfg(windows)]
    fn is_running(&self, name: &str) -> bool {
        let filter = format!("IMAGENAME eq {name}");
        match Command::new("tasklist")
            .args(["/FI", &filter, "/NH", "/FO", "CSV"])
            .stderr(Stdio::null())
            .output()
        {
            Ok(output) => String::from_utf8_lossy(&output.stdout)
                .to_ascii_lowercase()
                .contains(&format!("\"{}\"", name.to_ascii_lowercase())),
            Err(e) => {
                log::warn!("process check: cannot run tasklist: {e}");
                false
            }
        }
    }
}
