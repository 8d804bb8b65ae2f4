//! Lightweight progress reporting for the question pipeline.
//!
//! Use `NoopProgress` for headless runs (default) and `IndicatifProgress`
//! for a CLI/TTY.

use std::sync::{Mutex, MutexGuard};

use indicatif::{ProgressBar, ProgressStyle};

/// Minimal progress interface used inside the answer pipeline.
pub trait Progress: Send + Sync {
    /// Advance by one step and show a short message.
    fn step(&self, _msg: &str) {}
    /// Replace current message without advancing.
    fn message(&self, _msg: &str) {}
    /// Remove the indicator, e.g. before streamed output is printed.
    fn finish(&self, _msg: &str) {}
}

/// No-op reporter for headless runs.
#[derive(Default, Clone, Copy)]
pub struct NoopProgress;
impl Progress for NoopProgress {}

/// Indicatif spinner, recreated on the first step after each `finish`.
#[derive(Default)]
pub struct IndicatifProgress {
    pb: Mutex<Option<ProgressBar>>,
}

impl IndicatifProgress {
    pub fn spinner() -> Self {
        Self::default()
    }

    fn bar(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.pb.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        let mut guard = self.bar();
        let pb = guard.get_or_insert_with(|| {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
                pb.set_style(style.tick_chars("-\\|/ "));
            }
            pb.enable_steady_tick(std::time::Duration::from_millis(80));
            pb
        });
        f(pb);
    }
}

impl Progress for IndicatifProgress {
    fn step(&self, msg: &str) {
        self.with_bar(|pb| {
            pb.inc(1);
            pb.set_message(msg.to_string());
        });
    }
    fn message(&self, msg: &str) {
        self.with_bar(|pb| pb.set_message(msg.to_string()));
    }
    fn finish(&self, msg: &str) {
        if let Some(pb) = self.bar().take() {
            pb.finish_and_clear();
            tracing::debug!(status = msg, "progress finished");
        }
    }
}
