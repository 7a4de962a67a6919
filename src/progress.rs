//! Per-chunk progress reporting for long memory transfers.

use indicatif::{ProgressBar, ProgressStyle};

/// Receives one call per completed chunk.
pub trait Progress {
    /// Called before the first chunk.
    fn start(&mut self, _total: usize) {}

    /// Called after each chunk, skipped chunks included.
    fn step(&mut self, completed: usize, total: usize);

    /// Called after the last chunk.
    fn finish(&mut self) {}
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn step(&mut self, _completed: usize, _total: usize) {}
}

/// Terminal progress bar
pub struct IndicatifProgress {
    phase: &'static str,
    bar: Option<ProgressBar>,
}

impl IndicatifProgress {
    pub fn new(phase: &'static str) -> Self {
        Self { phase, bar: None }
    }
}

impl Progress for IndicatifProgress {
    fn start(&mut self, total: usize) {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(&format!(
                    "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} chunks ({{eta}}) {}",
                    self.phase
                ))
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        self.bar = Some(pb);
    }

    fn step(&mut self, completed: usize, _total: usize) {
        if let Some(pb) = &self.bar {
            pb.set_position(completed as u64);
        }
    }

    fn finish(&mut self) {
        if let Some(pb) = self.bar.take() {
            pb.finish_with_message(self.phase);
        }
    }
}
