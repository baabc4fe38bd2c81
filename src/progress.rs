//! Progress reporting for the classification pass.
//!
//! The classifier calls [`ProgressObserver::report`] with the completed
//! fraction after every row. Observers are advisory and cannot affect the
//! result.

use indicatif::{ProgressBar, ProgressStyle};

/// Resolution of the terminal bar; fractions are mapped onto this many steps.
const BAR_STEPS: u64 = 1000;

pub trait ProgressObserver {
    /// `fraction` is in `[0, 1]` and never decreases within one pass.
    fn report(&mut self, fraction: f64);

    fn finish(&mut self) {}
}

impl<F: FnMut(f64)> ProgressObserver for F {
    fn report(&mut self, fraction: f64) {
        self(fraction)
    }
}

/// Discards all progress updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn report(&mut self, _fraction: f64) {}
}

/// Terminal progress bar.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(message: &str) -> Self {
        let bar = ProgressBar::new(BAR_STEPS);
        let style = ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {percent:>3}%")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        bar.set_message(message.to_string());
        Self { bar }
    }
}

impl ProgressObserver for BarProgress {
    fn report(&mut self, fraction: f64) {
        let position = (fraction.clamp(0.0, 1.0) * BAR_STEPS as f64).round() as u64;
        self.bar.set_position(position);
    }

    fn finish(&mut self) {
        self.bar.finish_and_clear();
    }
}
