use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

const SIDECAR_FILE: &str = "eqlauncher.txt";

/// Collects every user-facing line of a patch session so diagnostics survive
/// the console window closing, or the process replacing itself during a
/// self-update.
///
/// Lines go to the console immediately through `log`; the buffered copy is
/// written to the sidecar file at defined checkpoints via [`flush`].
///
/// [`flush`]: SessionLog::flush
#[derive(Default)]
pub struct SessionLog {
    buffer: String,
}

impl SessionLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an informational line.
    pub fn record(&mut self, line: impl Into<String>) {
        let line = line.into();
        info!("{line}");
        self.push(&line);
    }

    /// Record a warning line.
    pub fn warn(&mut self, line: impl Into<String>) {
        let line = line.into();
        warn!("{line}");
        self.push(&line);
    }

    fn push(&mut self, line: &str) {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        self.buffer.push_str(&format!("[{stamp}] {line}\n"));
    }

    /// Write the buffered session to the sidecar file in `dir`, replacing
    /// any previous session's file.
    pub fn flush(&self, dir: &Path) -> Result<PathBuf, String> {
        let path = dir.join(SIDECAR_FILE);
        fs::write(&path, self.buffer.as_bytes())
            .map_err(|e| format!("write {}: {e}", path.display()))?;
        Ok(path)
    }
}
