//! Write-log sink for rendered output bytes.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use crate::config::env_config;

/// Appends every rendered byte to a log file for debugging sessions.
///
/// Failures latch: after the first append error the log goes silent so a
/// broken log file cannot interfere with rendering.
#[derive(Debug)]
pub struct WriteLog {
    path: PathBuf,
    failed: bool,
}

impl WriteLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            failed: false,
        }
    }

    /// Log configured by `MODAL_TUI_WRITE_LOG`, if any.
    pub fn from_env() -> Option<Self> {
        env_config().write_log.as_deref().map(|path| Self::new(path))
    }

    pub fn append(&mut self, bytes: &[u8]) {
        if self.failed {
            return;
        }
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(bytes));
        if result.is_err() {
            self.failed = true;
        }
    }
}
