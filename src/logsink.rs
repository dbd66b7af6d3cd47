//! Shared progress/failure log for unattended batch runs.
//!
//! Workers never contend on a console lock: each holds a cloneable
//! [`LogHandle`] that sends lines over a channel to one aggregator thread,
//! which owns the append-mode log file and mirrors every line through
//! `tracing`. Ordering within the file is the aggregator's arrival order,
//! which keeps lines whole across workers.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;

use crate::error::PrepError;

pub struct LogSink {
    thread: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct LogHandle {
    tx: Sender<String>,
}

impl LogHandle {
    pub fn log(&self, line: impl Into<String>) {
        // A dead aggregator only loses console mirroring; never panic here.
        let _ = self.tx.send(line.into());
    }
}

impl LogSink {
    /// Open `path` for append and start the aggregator thread.
    pub fn create(path: &Path) -> Result<(Self, LogHandle), PrepError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| PrepError::io("open log file", e))?;

        let (tx, rx) = mpsc::channel::<String>();
        let thread = std::thread::spawn(move || {
            for line in rx {
                let stamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
                let _ = writeln!(file, "[{stamp}] {line}");
                let _ = file.flush();
                tracing::info!("{line}");
            }
        });

        Ok((
            Self {
                thread: Some(thread),
            },
            LogHandle { tx },
        ))
    }

    /// Join the aggregator. All `LogHandle` clones must be dropped first or
    /// this blocks until they are.
    pub fn finish(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for LogSink {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_from_many_threads_stay_whole_and_are_timestamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stage.log");
        let (sink, handle) = LogSink::create(&path).unwrap();

        std::thread::scope(|scope| {
            for w in 0..4 {
                let handle = handle.clone();
                scope.spawn(move || {
                    for i in 0..25 {
                        handle.log(format!("worker-{w} line-{i}"));
                    }
                });
            }
        });
        drop(handle);
        sink.finish();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 100);
        for line in lines {
            assert!(line.starts_with('['), "missing timestamp: {line}");
            assert!(line.contains("worker-"), "broken line: {line}");
        }
    }

    #[test]
    fn append_mode_preserves_previous_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stage.log");

        for run in 0..2 {
            let (sink, handle) = LogSink::create(&path).unwrap();
            handle.log(format!("run-{run}"));
            drop(handle);
            sink.finish();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("run-0"));
        assert!(contents.contains("run-1"));
    }
}
