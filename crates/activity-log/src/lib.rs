//! The structured activity-logging pipeline, assembled: the log-entry data
//! model, the dispatcher queue and its sinks, the persistence format, and
//! the readers that reconstruct activity maps from files it wrote. This
//! crate is the one-stop entry point; the subsystem crates it wraps can
//! also be used independently.

mod default;
mod error;
mod registry;

pub use activity_log_codec::{CodecError, CodecResult, Frame, CURRENT_STREAM_VERSION};
pub use activity_log_dispatch::{
    BinaryFileConfig,
    ConsoleConfig,
    CriticalErrorCollector,
    Dispatcher,
    DispatcherConfig,
    ExternalClient,
    FilterPair,
    GroupGuard,
    MonitorClient,
    PipeConfig,
    Sink,
    SinkDescriptor,
    SinkFactory,
    TextFileConfig,
    DEFAULT_EXTERNAL_LOG_LEVEL,
};
pub use activity_log_model::{
    external_monitor_id,
    EntryBody,
    EntryCommon,
    EntryKind,
    ExceptionData,
    Level,
    LogEntry,
    LogLevel,
    MulticastEntry,
    Tag,
    TagSet,
    Timestamp,
    TimestampSource,
};
pub use activity_log_multireader::{FileSegment, MonitorActivity, MultiFileReader, MultiReaderError, MultiReaderResult};
pub use activity_log_reader::LogReader;
pub use activity_log_sinks::{default_registry, BinaryFileSink, ConsoleSink, TextFileSink};
#[cfg(unix)]
pub use activity_log_sinks::PipeSink;

pub use default::{current_default, dispose, ensure_active_default, ensure_default_monitor_client, DefaultDispatcher};
pub use error::ActivityLogError;
