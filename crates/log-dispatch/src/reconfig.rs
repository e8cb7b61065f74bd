use std::sync::Arc;

use crate::{
    client::MonitorClient,
    config::SinkDescriptor,
    critical::CriticalErrorCollector,
    sink::{Sink, SinkFactory},
};

/// The worker-side handler reconciliation algorithm (spec.md §4.2): probe
/// every active sink in registration order with each desired descriptor;
/// the first sink that accepts it is kept and the descriptor is consumed.
/// Sinks left unconsumed are deactivated; descriptors left unconsumed are
/// built fresh and activated. Registration order of the survivors is
/// preserved — reused sinks keep their original position, new sinks are
/// appended in the order their descriptors appeared in `desired`.
pub(crate) fn reconcile(
    active: Vec<Box<dyn Sink>>,
    desired: Vec<SinkDescriptor>,
    worker_monitor: &Arc<MonitorClient>,
    factory: &SinkFactory,
    critical_errors: &CriticalErrorCollector,
) -> Vec<Box<dyn Sink>> {
    let mut remaining: Vec<Option<SinkDescriptor>> = desired.into_iter().map(Some).collect();
    let mut kept: Vec<Box<dyn Sink>> = Vec::new();
    let mut stale: Vec<Box<dyn Sink>> = Vec::new();

    'sinks: for mut sink in active {
        for slot in remaining.iter_mut() {
            let Some(desc) = slot else { continue };
            match sink.apply_configuration(desc) {
                Ok(true) => {
                    *slot = None;
                    kept.push(sink);
                    continue 'sinks;
                },
                Ok(false) => continue,
                Err(e) => {
                    tracing::error!(error = %e, "sink faulted while probing a new configuration; quarantining");
                    critical_errors.report(&e);
                    stale.push(sink);
                    continue 'sinks;
                },
            }
        }
        stale.push(sink);
    }

    for mut sink in stale {
        if let Err(e) = sink.deactivate(worker_monitor) {
            tracing::warn!(error = %e, "sink faulted while deactivating during reconfiguration");
            critical_errors.report(&e);
        }
    }

    for desc in remaining.into_iter().flatten() {
        match factory(&desc) {
            Ok(mut sink) => match sink.activate(worker_monitor) {
                Ok(true) => kept.push(sink),
                Ok(false) => tracing::info!(?desc, "sink declined activation"),
                Err(e) => {
                    tracing::error!(error = %e, ?desc, "sink faulted during activation");
                    critical_errors.report(&e);
                },
            },
            Err(e) => {
                tracing::error!(error = %e, ?desc, "sink factory failed; descriptor skipped");
            },
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, AtomicU32},
        Arc,
    };

    use parking_lot::RwLock;
    use uuid::Uuid;

    use super::*;
    use crate::{client::MonitorClient, config::TextFileConfig};

    struct RecordingSink {
        path: String,
        activated: Arc<AtomicU32>,
        deactivated: Arc<AtomicU32>,
    }

    impl Sink for RecordingSink {
        fn activate(&mut self, _: &Arc<MonitorClient>) -> anyhow::Result<bool> {
            self.activated.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(true)
        }

        fn apply_configuration(&mut self, desc: &SinkDescriptor) -> anyhow::Result<bool> {
            match desc {
                SinkDescriptor::TextFile(cfg) => Ok(cfg.path == self.path),
                _ => Ok(false),
            }
        }

        fn handle(&mut self, _: &Arc<MonitorClient>, _: &activity_log_model::MulticastEntry) -> anyhow::Result<()> {
            Ok(())
        }

        fn on_timer(&mut self, _: &Arc<MonitorClient>, _: std::time::Duration) -> anyhow::Result<()> {
            Ok(())
        }

        fn deactivate(&mut self, _: &Arc<MonitorClient>) -> anyhow::Result<()> {
            self.deactivated.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    fn worker_monitor() -> Arc<MonitorClient> {
        let (tx, _rx) = crossbeam_channel::unbounded();
        Arc::new(MonitorClient::new(
            Uuid::new_v4(),
            tx,
            Arc::new(AtomicBool::new(true)),
            Arc::new(RwLock::new(crate::config::FilterPair::default())),
        ))
    }

    #[test]
    fn reused_sink_is_not_reactivated_or_deactivated() {
        let activated = Arc::new(AtomicU32::new(0));
        let deactivated = Arc::new(AtomicU32::new(0));
        let sink = Box::new(RecordingSink {
            path: "A".to_string(),
            activated: activated.clone(),
            deactivated: deactivated.clone(),
        });
        let monitor = worker_monitor();
        let collector = CriticalErrorCollector::new();
        let factory: SinkFactory = Arc::new(|_| anyhow::bail!("should not be called"));

        let result = reconcile(
            vec![sink],
            vec![SinkDescriptor::TextFile(TextFileConfig { path: "A".to_string() })],
            &monitor,
            &factory,
            &collector,
        );

        assert_eq!(result.len(), 1);
        assert_eq!(activated.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(deactivated.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn unmatched_sink_is_deactivated_and_new_one_built() {
        let activated = Arc::new(AtomicU32::new(0));
        let deactivated = Arc::new(AtomicU32::new(0));
        let sink = Box::new(RecordingSink {
            path: "A".to_string(),
            activated: activated.clone(),
            deactivated: deactivated.clone(),
        });
        let monitor = worker_monitor();
        let collector = CriticalErrorCollector::new();
        let built = Arc::new(AtomicU32::new(0));
        let built_clone = built.clone();
        let factory: SinkFactory = Arc::new(move |desc| {
            built_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            match desc {
                SinkDescriptor::TextFile(cfg) => Ok(Box::new(RecordingSink {
                    path: cfg.path.clone(),
                    activated: Arc::new(AtomicU32::new(0)),
                    deactivated: Arc::new(AtomicU32::new(0)),
                }) as Box<dyn Sink>),
                _ => unreachable!(),
            }
        });

        let result = reconcile(
            vec![sink],
            vec![SinkDescriptor::TextFile(TextFileConfig { path: "B".to_string() })],
            &monitor,
            &factory,
            &collector,
        );

        assert_eq!(result.len(), 1);
        assert_eq!(deactivated.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(built.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
