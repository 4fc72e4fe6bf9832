use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives progress updates, typically to drive a terminal progress bar.
pub trait ProgressSink: Send + Sync {
    /// Called once the expected total is known, `None` if it was not counted.
    fn start(&self, _total: Option<u64>) {}

    fn advance(&self, delta: u64);

    fn finish(&self, _processed: u64) {}
}

/// Running total of applied operations, shared by every worker.
#[derive(Default)]
pub struct ProgressAggregator {
    processed: AtomicU64,
    sink: Option<Arc<dyn ProgressSink>>,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            processed: AtomicU64::new(0),
            sink: Some(sink),
        }
    }

    pub fn start(&self, total: Option<u64>) {
        if let Some(sink) = &self.sink {
            sink.start(total);
        }
    }

    pub fn record(&self, delta: u64) {
        if delta == 0 {
            return;
        }
        self.processed.fetch_add(delta, Ordering::Relaxed);
        if let Some(sink) = &self.sink {
            sink.advance(delta);
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Final total. Call once every worker has been joined.
    pub fn finish(&self) -> u64 {
        let processed = self.processed();
        if let Some(sink) = &self.sink {
            sink.finish(processed);
        }
        processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ProgressSink for Recorder {
        fn start(&self, total: Option<u64>) {
            self.events.lock().unwrap().push(format!("start {total:?}"));
        }

        fn advance(&self, delta: u64) {
            self.events.lock().unwrap().push(format!("advance {delta}"));
        }

        fn finish(&self, processed: u64) {
            self.events.lock().unwrap().push(format!("finish {processed}"));
        }
    }

    #[test]
    fn concurrent_records_sum_exactly() {
        let progress = ProgressAggregator::new();
        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        progress.record(3);
                    }
                });
            }
        });
        assert_eq!(progress.finish(), 24_000);
    }

    #[test]
    fn sink_sees_every_nonzero_delta() {
        let recorder = Arc::new(Recorder::default());
        let progress = ProgressAggregator::with_sink(recorder.clone());
        progress.start(Some(10));
        progress.record(4);
        progress.record(0);
        progress.record(2);
        assert_eq!(progress.finish(), 6);
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec!["start Some(10)", "advance 4", "advance 2", "finish 6"]
        );
    }
}
