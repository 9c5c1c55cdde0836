//! Persistent run log.
//!
//! Progress, skip reasons and the final status go to a plain-text log in
//! the output directory in addition to the `tracing` console stream, so a
//! finished (or aborted) run leaves a durable record next to its
//! artifacts. Logging is best-effort: a failing log write never fails the
//! run.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use tracing::warn;

const LOG_FILE_NAME: &str = "run.log";

/// Append-only run log; lines are stamped with seconds since run start.
pub struct RunLog {
    writer: Option<BufWriter<File>>,
    started: Instant,
}

impl RunLog {
    /// Open (truncate) the log in the output directory. A directory that
    /// rejects the log file downgrades to console-only logging.
    #[must_use]
    pub fn create(directory: &Path) -> Self {
        let path = directory.join(LOG_FILE_NAME);
        let writer = match File::create(&path) {
            Ok(file) => Some(BufWriter::new(file)),
            Err(e) => {
                warn!("run log {path:?} unavailable, console only: {e}");
                None
            }
        };
        Self {
            writer,
            started: Instant::now(),
        }
    }

    /// Append one line, best effort.
    pub fn line(&mut self, message: &str) {
        if let Some(writer) = &mut self.writer {
            let elapsed = self.started.elapsed().as_secs_f64();
            let _ = writeln!(writer, "[{elapsed:10.1}s] {message}");
            let _ = writer.flush();
        }
    }

    /// Separator + banner, written once at run start.
    pub fn header(&mut self, banner: &str) {
        self.line(&"-".repeat(78));
        self.line(banner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_lines_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = RunLog::create(dir.path());
        log.header("test run");
        log.line("situation 1: computed");
        drop(log);

        let text = std::fs::read_to_string(dir.path().join(LOG_FILE_NAME)).unwrap();
        assert!(text.contains("test run"));
        assert!(text.contains("situation 1: computed"));
    }

    #[test]
    fn missing_directory_downgrades_quietly() {
        let mut log = RunLog::create(Path::new("/nonexistent/place/for/logs"));
        log.line("still fine");
    }
}
