use std::sync::{Arc, Weak};

use activity_log_dispatch::MonitorClient;
use parking_lot::Mutex;

/// Weak references to every [`MonitorClient`] the default dispatcher has
/// handed out, so the external timer can periodically drop entries for
/// monitors that have since been garbage-collected (spec.md §5's "client
/// registry... protected by a short mutex; the external timer periodically
/// GCs dead entries").
#[derive(Default)]
pub(crate) struct ClientRegistry {
    clients: Mutex<Vec<Weak<MonitorClient>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, client: &Arc<MonitorClient>) {
        self.clients.lock().push(Arc::downgrade(client));
    }

    pub fn gc(&self) {
        self.clients.lock().retain(|weak| weak.strong_count() > 0);
    }

    pub fn live_count(&self) -> usize {
        self.clients.lock().iter().filter(|weak| weak.strong_count() > 0).count()
    }
}
