/*!
 * Progress aggregation for multipart uploads
 *
 * Every chunk reports its own fraction through a reporter handed out by
 * [`ProgressAggregator::reporter_for`]. The aggregator keeps the latest value
 * per chunk and forwards the unweighted mean to a single upstream sink.
 */

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

pub use crate::types::ProgressInfo;

/// Callback receiving progress updates
pub type ProgressSink = Arc<dyn Fn(ProgressInfo) + Send + Sync>;

/// Wrap a closure as a [`ProgressSink`]
pub fn progress_sink<F>(f: F) -> ProgressSink
where
    F: Fn(ProgressInfo) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Sink that drops every update
pub fn noop_sink() -> ProgressSink {
    Arc::new(|_| {})
}

/// Combines per-chunk progress into one overall value
///
/// Each chunk carries equal weight regardless of its byte length, so a short
/// final chunk moves the aggregate as much as a full one.
#[derive(Clone)]
pub struct ProgressAggregator {
    values: Arc<Mutex<Vec<f64>>>,
    sink: ProgressSink,
}

impl ProgressAggregator {
    /// Create an aggregator for `total_chunks` chunks, all starting at zero
    pub fn new(total_chunks: usize, sink: ProgressSink) -> Self {
        Self {
            values: Arc::new(Mutex::new(vec![0.0; total_chunks])),
            sink,
        }
    }

    /// Number of tracked chunks
    pub fn total_chunks(&self) -> usize {
        self.lock().len()
    }

    /// Reporter that records progress for chunk `index`
    ///
    /// Unknown reports and indices past the end are ignored.
    pub fn reporter_for(&self, index: usize) -> ProgressSink {
        let aggregator = self.clone();
        Arc::new(move |info: ProgressInfo| aggregator.report(index, info))
    }

    /// Current aggregate in `[0, 1]`
    pub fn aggregate(&self) -> f64 {
        mean(&self.lock())
    }

    fn report(&self, index: usize, info: ProgressInfo) {
        let Some(value) = info.value() else {
            return;
        };

        let aggregate = {
            let mut values = self.lock();
            let Some(slot) = values.get_mut(index) else {
                return;
            };
            *slot = value.clamp(0.0, 1.0);
            mean(&values)
        };

        // Lock released before calling out so the sink may query us
        (self.sink)(ProgressInfo::Computable { value: aggregate });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<f64>> {
        // A poisoned vector still holds valid floats
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ProgressAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressAggregator")
            .field("values", &*self.lock())
            .finish_non_exhaustive()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 1.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_sink() -> (ProgressSink, Arc<Mutex<Vec<f64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink = progress_sink(move |info| {
            if let Some(value) = info.value() {
                sink_seen.lock().unwrap().push(value);
            }
        });
        (sink, seen)
    }

    #[test]
    fn test_single_chunk_half_done() {
        let (sink, seen) = recording_sink();
        let aggregator = ProgressAggregator::new(4, sink);

        aggregator.reporter_for(0)(ProgressInfo::Computable { value: 0.5 });

        assert_eq!(aggregator.aggregate(), 0.125);
        assert_eq!(*seen.lock().unwrap(), vec![0.125]);
    }

    #[test]
    fn test_all_chunks_done() {
        let (sink, seen) = recording_sink();
        let aggregator = ProgressAggregator::new(4, sink);

        for i in 0..4 {
            aggregator.reporter_for(i)(ProgressInfo::Computable { value: 1.0 });
        }

        assert_eq!(aggregator.aggregate(), 1.0);
        assert_eq!(seen.lock().unwrap().last(), Some(&1.0));
    }

    #[test]
    fn test_unknown_reports_ignored() {
        let (sink, seen) = recording_sink();
        let aggregator = ProgressAggregator::new(2, sink);

        aggregator.reporter_for(1)(ProgressInfo::Unknown);
        aggregator.reporter_for(5)(ProgressInfo::Computable { value: 1.0 });

        assert_eq!(aggregator.aggregate(), 0.0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_latest_value_wins_and_clamps() {
        let aggregator = ProgressAggregator::new(2, noop_sink());
        let reporter = aggregator.reporter_for(0);

        reporter(ProgressInfo::Computable { value: 0.4 });
        reporter(ProgressInfo::Computable { value: 1.7 });

        assert_eq!(aggregator.aggregate(), 0.5);
        assert_eq!(aggregator.total_chunks(), 2);
    }

    #[test]
    fn test_reporters_are_send() {
        let aggregator = ProgressAggregator::new(8, noop_sink());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let reporter = aggregator.reporter_for(i);
                std::thread::spawn(move || reporter(ProgressInfo::Computable { value: 1.0 }))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(aggregator.aggregate(), 1.0);
    }
}
