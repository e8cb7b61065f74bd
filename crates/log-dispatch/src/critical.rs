use parking_lot::Mutex;

/// A process-wide (or per-dispatcher, when not using the default singleton)
/// broadcaster for sink faults and other failures the worker cannot recover
/// from on its own (spec.md §6's "critical-error collector", §4.1 step 5).
#[derive(Default)]
pub struct CriticalErrorCollector {
    subscribers: Mutex<Vec<Box<dyn Fn(&anyhow::Error) + Send>>>,
}

impl CriticalErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, f: impl Fn(&anyhow::Error) + Send + 'static) {
        self.subscribers.lock().push(Box::new(f));
    }

    pub fn report(&self, err: &anyhow::Error) {
        for subscriber in self.subscribers.lock().iter() {
            subscriber(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    #[test]
    fn every_subscriber_observes_a_reported_error() {
        let collector = CriticalErrorCollector::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        collector.subscribe(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });
        collector.subscribe(move |_| {});

        collector.report(&anyhow::anyhow!("boom"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
