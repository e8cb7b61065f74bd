use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};

use activity_log_dispatch::{CriticalErrorCollector, Dispatcher, DispatcherConfig, ExternalClient, MonitorClient};
use activity_log_model::{Level, LogLevel, Tag, TagSet};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::{error::ActivityLogError, registry::ClientRegistry};

/// The ambient process-wide dispatcher (spec.md §6's "process-level
/// singleton"). Every [`MonitorClient`] it hands out is tracked by a weak-
/// reference registry that the dispatcher's external timer periodically
/// sweeps, and every critical error it observes is re-emitted through its
/// own external-log path tagged `CriticalError`.
pub struct DefaultDispatcher {
    dispatcher: Dispatcher,
    registry: Arc<ClientRegistry>,
}

impl DefaultDispatcher {
    pub fn new_monitor_client(&self, monitor_id: Option<Uuid>) -> Arc<MonitorClient> {
        let client = self.dispatcher.new_monitor_client(monitor_id);
        self.registry.track(&client);
        client
    }

    pub fn external_client(&self) -> ExternalClient {
        self.dispatcher.external_client()
    }

    pub fn critical_errors(&self) -> Arc<CriticalErrorCollector> {
        self.dispatcher.critical_errors()
    }

    pub fn apply_config(&self, config: DispatcherConfig, wait: bool) {
        self.dispatcher.apply_config(config, wait);
    }

    /// The number of monitor clients this dispatcher has handed out whose
    /// strong owner hasn't dropped them yet, as of the last GC sweep.
    pub fn live_monitor_count(&self) -> usize {
        self.registry.live_count()
    }
}

static DEFAULT: OnceLock<Mutex<Option<Arc<DefaultDispatcher>>>> = OnceLock::new();

fn slot() -> &'static Mutex<Option<Arc<DefaultDispatcher>>> {
    DEFAULT.get_or_init(|| Mutex::new(None))
}

/// Creates the ambient default dispatcher if none is active, or applies
/// `config` to the existing one. Either way returns a handle to it.
pub fn ensure_active_default(config: DispatcherConfig) -> Arc<DefaultDispatcher> {
    let mut guard = slot().lock();
    if let Some(existing) = guard.as_ref() {
        existing.dispatcher.apply_config(config, false);
        return existing.clone();
    }

    let registry = Arc::new(ClientRegistry::new());
    let gc_registry = registry.clone();
    let factory = activity_log_sinks::default_registry();
    let dispatcher = Dispatcher::spawn(config, factory, Some(Box::new(move || gc_registry.gc())));

    let external = dispatcher.external_client();
    let critical_tag = TagSet::from_iter_dedup(std::iter::once(Tag::new("CriticalError")));
    dispatcher.critical_errors().subscribe(move |err| {
        external.log_tagged(Level::new(LogLevel::Error, true), err.to_string(), Some(critical_tag.clone()));
    });

    let created = Arc::new(DefaultDispatcher { dispatcher, registry });
    *guard = Some(created.clone());
    created
}

/// The active default, if one exists and hasn't been disposed.
pub fn current_default() -> Option<Arc<DefaultDispatcher>> {
    slot().lock().clone()
}

/// Resets the ambient slot to empty, waiting up to `deadline` for the
/// worker to drain before forcing it closed. A no-op if no default is
/// active.
pub fn dispose(deadline: Duration) {
    let existing = slot().lock().take();
    if let Some(active) = existing {
        active.dispatcher.finalize(deadline);
    }
}

/// The lifecycle hook named in spec.md §6: auto-attaches a client to a
/// newly created producer-monitor while the default exists. Fails with
/// [`ActivityLogError::Disposed`] if there is no active default.
pub fn ensure_default_monitor_client(monitor_id: Option<Uuid>) -> Result<Arc<MonitorClient>, ActivityLogError> {
    match slot().lock().as_ref() {
        Some(active) => Ok(active.new_monitor_client(monitor_id)),
        None => Err(ActivityLogError::Disposed),
    }
}
