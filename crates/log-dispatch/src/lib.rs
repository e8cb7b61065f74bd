//! The single-consumer dispatcher queue and worker thread (spec.md §4):
//! producers hand entries to a [`MonitorClient`] or the process-wide
//! [`ExternalClient`], the [`Dispatcher`] worker fans them out to configured
//! [`Sink`]s, and reconfiguration, quarantine, and shutdown are all handled
//! on the worker side so producers never block on sink I/O.

mod client;
mod config;
mod critical;
mod dispatcher;
mod external;
mod reconfig;
mod sink;

pub use client::{GroupGuard, MonitorClient};
pub use config::{
    BinaryFileConfig,
    ConsoleConfig,
    DispatcherConfig,
    FilterPair,
    PipeConfig,
    SinkDescriptor,
    TextFileConfig,
    DEFAULT_EXTERNAL_LOG_LEVEL,
};
pub use critical::CriticalErrorCollector;
pub use dispatcher::Dispatcher;
pub use external::ExternalClient;
pub use sink::{Sink, SinkFactory};
