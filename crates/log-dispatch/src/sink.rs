use std::{sync::Arc, time::Duration};

use activity_log_model::MulticastEntry;

use crate::{client::MonitorClient, config::SinkDescriptor};

/// The contract every dispatcher sink implements (spec.md §4.3). The worker
/// owns every active sink exclusively once `activate` returns `true`;
/// producers never see a `Sink` directly.
pub trait Sink: Send {
    /// Called once when the sink is added. Returning `false` tells the
    /// worker "do not add me" — the sink is dropped without `deactivate`
    /// being called. `worker_monitor` lets the sink log its own
    /// self-diagnostics, which re-enter the queue like any other producer.
    fn activate(&mut self, worker_monitor: &Arc<MonitorClient>) -> anyhow::Result<bool>;

    /// Returns `true` iff this sink absorbed `desc` in place (reconfigured
    /// itself to match) and should be kept. Must be idempotent when it
    /// returns `false` — probing must not have side effects the sink can't
    /// undo.
    fn apply_configuration(&mut self, desc: &SinkDescriptor) -> anyhow::Result<bool>;

    /// Consumes one event. May buffer internally, but must not block the
    /// worker indefinitely — the worker is monopolised for the duration of
    /// this call (spec.md §5).
    fn handle(&mut self, worker_monitor: &Arc<MonitorClient>, event: &MulticastEntry) -> anyhow::Result<()>;

    /// Periodic flush/rotate hook, fired once per `period` while active.
    fn on_timer(&mut self, worker_monitor: &Arc<MonitorClient>, period: Duration) -> anyhow::Result<()>;

    /// Releases resources. Called on normal shutdown, reconfiguration
    /// replacement, and quarantine after a fault.
    fn deactivate(&mut self, worker_monitor: &Arc<MonitorClient>) -> anyhow::Result<()>;
}

/// Builds a runtime [`Sink`] from a [`SinkDescriptor`]. The re-architecture
/// note in spec.md §9 replaces the source's reflection-based type lookup
/// with this explicit, closed mapping — concrete sink crates provide one of
/// these rather than the dispatcher discovering sink types dynamically.
pub type SinkFactory = Arc<dyn Fn(&SinkDescriptor) -> anyhow::Result<Box<dyn Sink>> + Send + Sync>;
