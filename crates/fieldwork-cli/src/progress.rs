use std::time::Duration;

use fieldwork_pipeline::ProgressSink;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Terminal progress bar fed with applied-operation counts.
pub struct BarSink {
    bar: ProgressBar,
}

impl BarSink {
    pub fn new(job: &str) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} [{elapsed_precise}] {prefix} {pos}/{len} ({per_sec}, {eta}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix(job.to_string());
        bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
        Self { bar }
    }
}

impl ProgressSink for BarSink {
    fn start(&self, total: Option<u64>) {
        if let Some(total) = total {
            self.bar.set_length(total);
        }
        self.bar.enable_steady_tick(Duration::from_millis(120));
    }

    fn advance(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn finish(&self, processed: u64) {
        self.bar.finish_with_message(format!("{processed} applied"));
    }
}
