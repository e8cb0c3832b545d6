//! Progress display for the catalog and download loops.
//!
//! On a terminal a bar is drawn. In log-only mode the bar is hidden and the
//! same progress is reported through `tracing` every [`LOG_EVERY`] steps, so
//! the output stays readable with `tail -f`.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

static LOG_ONLY: AtomicBool = AtomicBool::new(false);

/// Steps between two progress log lines in log-only mode.
pub const LOG_EVERY: u64 = 10;

const BAR_TEMPLATE: &str = "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})";

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

fn styled(bar: ProgressBar, style: Result<ProgressStyle, indicatif::style::TemplateError>) -> ProgressBar {
    if is_log_only() {
        bar.set_draw_target(ProgressDrawTarget::hidden());
        return bar;
    }
    match style {
        Ok(style) => bar.set_style(style.progress_chars("=> ")),
        Err(e) => tracing::debug!("Bad progress template: {}", e),
    }
    bar
}

/// Progress over a fixed number of steps (listing pages, songs of a category).
pub struct StepProgress {
    phase: &'static str,
    bar: ProgressBar,
    total: u64,
}

impl StepProgress {
    pub fn new(phase: &'static str, total: u64) -> Self {
        let bar = styled(ProgressBar::new(total), ProgressStyle::default_bar().template(BAR_TEMPLATE));
        bar.set_message(phase);
        Self { phase, bar, total }
    }

    /// Advance one step, logging in log-only mode every [`LOG_EVERY`] steps
    /// and on the last one.
    pub fn step(&self) {
        self.bar.inc(1);
        let done = self.bar.position();
        if is_log_only() && self.total > 0 && (done % LOG_EVERY == 0 || done == self.total) {
            let pct = 100.0 * done as f64 / self.total as f64;
            info!("[{}] {}/{} ({:.1}%)", self.phase, done, self.total, pct);
        }
    }

    /// Show what the current step is working on.
    pub fn working_on(&self, item: &str) {
        self.bar.set_message(format!("{}: {}", self.phase, item));
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(self, summary: String) {
        if is_log_only() {
            info!("[{}] {}", self.phase, summary);
        }
        self.bar.finish_with_message(summary);
    }
}

/// Spinner for a single step of unknown length, such as logging in.
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = styled(
        ProgressBar::new_spinner(),
        ProgressStyle::default_spinner().template("{msg} {spinner} [{elapsed_precise}]"),
    );
    if !is_log_only() {
        pb.enable_steady_tick(Duration::from_millis(100));
    }
    pb.set_message(msg.to_string());
    pb
}
