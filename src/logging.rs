//! Log sinks handed to the assembler.
//!
//! Every run writes human-readable progress lines to a [`LogSink`]. The sink
//! is passed in explicitly so a CLI, an HTTP job and a test can each watch the
//! same run in their own way.

use std::sync::{Arc, Mutex};
use chrono::Local;
use env_logger::Env;

use crate::assembler::RunPhase;

pub trait LogSink: Send + Sync {
    fn log(&self, line: &str);

    /// Called on every run state transition.
    fn phase(&self, _phase: RunPhase) {}
}

/// Installs the process-wide `log` backend. Safe to call more than once.
pub fn init_logger() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .try_init();
}

/// Forwards lines to the `log` facade.
#[derive(Debug, Default)]
pub struct FacadeSink;

impl LogSink for FacadeSink {
    fn log(&self, line: &str) {
        log::info!("{}", line);
    }

    fn phase(&self, phase: RunPhase) {
        log::debug!("Run phase: {:?}", phase);
    }
}

/// Keeps timestamped lines in memory for later display.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
    phase: Mutex<Option<RunPhase>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn current_phase(&self) -> Option<RunPhase> {
        self.phase.lock().ok().and_then(|p| p.clone())
    }

    /// True if any line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines
            .lock()
            .map(|l| l.iter().any(|line| line.contains(needle)))
            .unwrap_or(false)
    }
}

impl LogSink for MemorySink {
    fn log(&self, line: &str) {
        let stamped = format!("[{}] {}", Local::now().format("%H:%M:%S"), line);
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(stamped);
        }
    }

    fn phase(&self, phase: RunPhase) {
        if let Ok(mut current) = self.phase.lock() {
            *current = Some(phase);
        }
    }
}

/// Fans every line out to several sinks.
pub struct TeeSink {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl TeeSink {
    pub fn new(sinks: Vec<Arc<dyn LogSink>>) -> Self {
        Self { sinks }
    }
}

impl LogSink for TeeSink {
    fn log(&self, line: &str) {
        for sink in &self.sinks {
            sink.log(line);
        }
    }

    fn phase(&self, phase: RunPhase) {
        for sink in &self.sinks {
            sink.phase(phase.clone());
        }
    }
}
