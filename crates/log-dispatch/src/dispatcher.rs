use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use activity_log_model::{Level, LogLevel, MulticastEntry};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex, RwLock};
use uuid::Uuid;

use crate::{
    client::MonitorClient,
    config::{DispatcherConfig, FilterPair},
    critical::CriticalErrorCollector,
    external::ExternalClient,
    reconfig::reconcile,
    sink::{Sink, SinkFactory},
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct PendingConfig {
    config: DispatcherConfig,
    consumed: Arc<(Mutex<bool>, Condvar)>,
}

/// The single-consumer dispatcher queue and worker (spec.md §4.1): owns all
/// sinks, applies reconfigurations atomically, drives the timer loop, and
/// guarantees bounded-time shutdown via [`finalize`](Self::finalize).
pub struct Dispatcher {
    sender: Sender<MulticastEntry>,
    accepting: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    force_close: Arc<AtomicBool>,
    worker_done: Arc<AtomicBool>,
    pending: Arc<Mutex<Vec<PendingConfig>>>,
    filter: Arc<RwLock<FilterPair>>,
    external_filter: Arc<RwLock<Option<LogLevel>>>,
    critical_errors: Arc<CriticalErrorCollector>,
    worker_monitor: Arc<MonitorClient>,
    worker_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawns the worker thread and applies `initial_config` as its first
    /// authoritative configuration. `factory` builds a runtime [`Sink`] from
    /// each [`SinkDescriptor`](crate::SinkDescriptor) named in a config's
    /// `handlers`. `external_timer_callback`, if given, fires on the
    /// `ExternalTimerDuration` cadence (spec.md §4.1 step 4) — intended for
    /// dead-client GC in the producer registry.
    pub fn spawn(
        initial_config: DispatcherConfig,
        factory: SinkFactory,
        external_timer_callback: Option<Box<dyn Fn() + Send>>,
    ) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let accepting = Arc::new(AtomicBool::new(true));
        let stop_requested = Arc::new(AtomicBool::new(false));
        let force_close = Arc::new(AtomicBool::new(false));
        let worker_done = Arc::new(AtomicBool::new(false));
        let pending = Arc::new(Mutex::new(Vec::new()));
        let filter = Arc::new(RwLock::new(initial_config.minimal_filter));
        let external_filter = Arc::new(RwLock::new(initial_config.external_log_level_filter));
        let critical_errors = Arc::new(CriticalErrorCollector::new());

        let worker_monitor = Arc::new(MonitorClient::new(
            Uuid::new_v4(),
            sender.clone(),
            accepting.clone(),
            filter.clone(),
        ));

        let worker = Worker {
            receiver,
            pending: pending.clone(),
            filter: filter.clone(),
            external_filter: external_filter.clone(),
            active_sinks: Vec::new(),
            factory,
            critical_errors: critical_errors.clone(),
            worker_monitor: worker_monitor.clone(),
            stop_requested: stop_requested.clone(),
            force_close: force_close.clone(),
            worker_done: worker_done.clone(),
            timer_period: initial_config.timer_duration,
            external_timer_period: initial_config.external_timer_duration,
            external_timer_callback,
        };

        pending.lock().push(PendingConfig {
            config: initial_config,
            consumed: Arc::new((Mutex::new(false), Condvar::new())),
        });

        let worker_handle = thread::Builder::new()
            .name("activity-log-dispatcher".to_string())
            .spawn(move || worker.run())
            .expect("failed to spawn dispatcher worker thread");

        Self {
            sender,
            accepting,
            stop_requested,
            force_close,
            worker_done,
            pending,
            filter,
            external_filter,
            critical_errors,
            worker_monitor,
            worker_handle: Mutex::new(Some(worker_handle)),
        }
    }

    /// Submits one entry directly, bypassing the per-monitor depth/back-
    /// pointer bookkeeping a [`MonitorClient`] provides. Non-blocking,
    /// best-effort: dropped silently once the dispatcher has been stopped.
    pub fn submit(&self, entry: MulticastEntry) {
        if self.accepting.load(Ordering::Relaxed) {
            let _ = self.sender.send(entry);
        }
    }

    /// Creates a new producer-side client sharing this dispatcher's queue
    /// and `MinimalFilter`. `monitor_id` defaults to a fresh random id if
    /// `None`.
    pub fn new_monitor_client(&self, monitor_id: Option<Uuid>) -> Arc<MonitorClient> {
        Arc::new(MonitorClient::new(
            monitor_id.unwrap_or_else(Uuid::new_v4),
            self.sender.clone(),
            self.accepting.clone(),
            self.filter.clone(),
        ))
    }

    /// The contextless external-log path (spec.md §4.8): a single shared
    /// monotone source feeding this same queue, gated by
    /// `ExternalLogLevelFilter` rather than `MinimalFilter`.
    pub fn external_client(&self) -> ExternalClient {
        ExternalClient::new(self.sender.clone(), self.accepting.clone(), self.external_filter.clone())
    }

    pub fn critical_errors(&self) -> Arc<CriticalErrorCollector> {
        self.critical_errors.clone()
    }

    /// The worker's own private monitor, visible so a host can subscribe to
    /// its self-diagnostic stream the same way it would any other monitor.
    pub fn worker_monitor(&self) -> Arc<MonitorClient> {
        self.worker_monitor.clone()
    }

    /// Appends `config` to the pending list. If `wait`, blocks until the
    /// worker has consumed it as part of an authoritative batch (it may
    /// have been superseded by a later config queued in the same batch —
    /// spec.md §4.2's ordering guarantee only promises it was *observed*).
    pub fn apply_config(&self, config: DispatcherConfig, wait: bool) {
        let consumed = Arc::new((Mutex::new(false), Condvar::new()));
        self.pending.lock().push(PendingConfig {
            config,
            consumed: consumed.clone(),
        });
        if wait {
            let (lock, cvar) = &*consumed;
            let mut done = lock.lock();
            while !*done {
                cvar.wait(&mut done);
            }
        }
    }

    /// A token that observes `stop()`: readable from any thread, `true`
    /// once this dispatcher has begun shutting down.
    pub fn stopped_token(&self) -> Arc<AtomicBool> {
        self.stop_requested.clone()
    }

    /// Closes the queue to new submissions. Returns `true` iff this call
    /// performed the transition — only the first caller gets `true`.
    pub fn stop(&self) -> bool {
        let performed = !self.stop_requested.swap(true, Ordering::SeqCst);
        if performed {
            self.accepting.store(false, Ordering::SeqCst);
        }
        performed
    }

    /// Calls [`stop`](Self::stop), then waits up to `deadline` for the
    /// worker to drain the queue and exit. If the deadline elapses first,
    /// sets force-close and gives the worker one more poll cycle
    /// (`POLL_INTERVAL`) to notice it and exit. Bounded-time means bounded:
    /// if a sink call is still in flight past that grace period (spec.md §5
    /// warns the worker is monopolised for the duration of a sink call),
    /// `finalize` does not keep blocking on it — the worker thread is joined
    /// in the background instead, so a slow or hung sink can never make
    /// `finalize` itself run unbounded.
    pub fn finalize(&self, deadline: Duration) {
        self.stop();
        let start = Instant::now();
        while !self.worker_done.load(Ordering::Acquire) && start.elapsed() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        if !self.worker_done.load(Ordering::Acquire) {
            self.force_close.store(true, Ordering::SeqCst);
            let grace_start = Instant::now();
            while !self.worker_done.load(Ordering::Acquire) && grace_start.elapsed() < POLL_INTERVAL {
                thread::sleep(Duration::from_millis(5));
            }
        }

        let Some(handle) = self.worker_handle.lock().take() else {
            return;
        };
        if self.worker_done.load(Ordering::Acquire) {
            let _ = handle.join();
        } else {
            // Still inside an in-flight sink call past the grace period:
            // reap it off the caller's thread rather than block on it.
            let _ = thread::Builder::new()
                .name("activity-log-dispatcher-reaper".to_string())
                .spawn(move || {
                    let _ = handle.join();
                });
        }
    }
}

struct Worker {
    receiver: Receiver<MulticastEntry>,
    pending: Arc<Mutex<Vec<PendingConfig>>>,
    filter: Arc<RwLock<FilterPair>>,
    external_filter: Arc<RwLock<Option<LogLevel>>>,
    active_sinks: Vec<Box<dyn Sink>>,
    factory: SinkFactory,
    critical_errors: Arc<CriticalErrorCollector>,
    worker_monitor: Arc<MonitorClient>,
    stop_requested: Arc<AtomicBool>,
    force_close: Arc<AtomicBool>,
    worker_done: Arc<AtomicBool>,
    timer_period: Duration,
    external_timer_period: Duration,
    external_timer_callback: Option<Box<dyn Fn() + Send>>,
}

impl Worker {
    fn run(mut self) {
        let mut next_timer = Instant::now() + self.timer_period;
        let mut next_external = Instant::now() + self.external_timer_period;

        loop {
            if self.force_close.load(Ordering::Acquire) {
                break;
            }

            let took = match self.receiver.recv_timeout(POLL_INTERVAL) {
                Ok(entry) => Some(entry),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => None,
            };

            self.drain_pending();

            if let Some(entry) = &took {
                self.dispatch_one(entry);
            }

            let now = Instant::now();
            if now >= next_timer {
                self.fire_timer();
                next_timer = now + self.timer_period;
            }
            if now >= next_external {
                if let Some(cb) = &self.external_timer_callback {
                    cb();
                }
                next_external = now + self.external_timer_period;
            }

            if self.stop_requested.load(Ordering::Acquire) && self.receiver.is_empty() {
                break;
            }
        }

        for mut sink in self.active_sinks.drain(..) {
            let _ = sink.deactivate(&self.worker_monitor);
        }
        self.worker_done.store(true, Ordering::Release);
    }

    fn drain_pending(&mut self) {
        let batch: Vec<PendingConfig> = {
            let mut pending = self.pending.lock();
            std::mem::take(&mut *pending)
        };
        if batch.is_empty() {
            return;
        }
        if let Some(last) = batch.last() {
            self.apply_authoritative(last.config.clone());
        }
        for pc in batch {
            let (lock, cvar) = &*pc.consumed;
            *lock.lock() = true;
            cvar.notify_all();
        }
    }

    fn apply_authoritative(&mut self, config: DispatcherConfig) {
        *self.filter.write() = config.minimal_filter;
        *self.external_filter.write() = config.external_log_level_filter;
        self.timer_period = config.timer_duration;
        self.external_timer_period = config.external_timer_duration;
        let active = std::mem::take(&mut self.active_sinks);
        self.active_sinks = reconcile(
            active,
            config.handlers,
            &self.worker_monitor,
            &self.factory,
            &self.critical_errors,
        );
    }

    fn dispatch_one(&mut self, entry: &MulticastEntry) {
        let mut faulty = Vec::new();
        for (i, sink) in self.active_sinks.iter_mut().enumerate() {
            if let Err(e) = sink.handle(&self.worker_monitor, entry) {
                self.report_fault(i, "handle", &e);
                faulty.push(i);
            }
        }
        self.quarantine(faulty);
    }

    fn fire_timer(&mut self) {
        let period = self.timer_period;
        let mut faulty = Vec::new();
        for (i, sink) in self.active_sinks.iter_mut().enumerate() {
            if let Err(e) = sink.on_timer(&self.worker_monitor, period) {
                self.report_fault(i, "on_timer", &e);
                faulty.push(i);
            }
        }
        self.quarantine(faulty);
    }

    fn report_fault(&self, sink_index: usize, phase: &str, err: &anyhow::Error) {
        tracing::error!(error = %err, sink_index, phase, "sink faulted; quarantining");
        self.critical_errors.report(err);
        self.worker_monitor.log_line(
            Level::new(LogLevel::Error, true),
            format!("sink {sink_index} faulted during {phase}: {err}"),
        );
    }

    fn quarantine(&mut self, mut indices: Vec<usize>) {
        indices.sort_unstable();
        indices.dedup();
        for i in indices.into_iter().rev() {
            let mut sink = self.active_sinks.remove(i);
            let _ = sink.deactivate(&self.worker_monitor);
        }
    }
}
