use std::time::Duration;

use activity_log_model::LogLevel;
use serde::{Deserialize, Serialize};

/// The lower-bound filter pair applied to producer clients: one threshold
/// for group open/close events, one for plain lines (spec.md §6's
/// `MinimalFilter`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPair {
    pub group: LogLevel,
    pub line: LogLevel,
}

impl Default for FilterPair {
    fn default() -> Self {
        Self {
            group: LogLevel::Debug,
            line: LogLevel::Debug,
        }
    }
}

/// A text file sink's options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFileConfig {
    pub path: String,
}

/// A binary file sink's options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryFileConfig {
    pub path: String,
    pub use_gzip_compression: bool,
}

/// The console sink has no per-instance options; it is a singleton by
/// construction (there is only one process stdout).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleConfig;

/// An inter-process pipe sink's options: the path of the Unix-domain socket
/// it connects to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeConfig {
    pub path: String,
}

/// An opaque handler configuration plus the implicit factory mapping to a
/// runtime sink (spec.md §3's "sink descriptor"). The re-architecture note
/// in spec.md §9 replaces the source's reflection-based factory lookup with
/// this closed, explicit enum: [`crate::SinkFactory`] matches on the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SinkDescriptor {
    TextFile(TextFileConfig),
    BinaryFile(BinaryFileConfig),
    Console(ConsoleConfig),
    Pipe(PipeConfig),
}

/// The full reconfigurable surface named in spec.md §6.
///
/// Notably absent: the source's `InternalClone` flag, which exists there to
/// tell the dispatcher "this config is already owned, don't copy it before
/// storing it". `apply_config` here takes `DispatcherConfig` by value, so
/// that distinction collapses to the only state Rust's move semantics ever
/// allow — there is nothing left for the flag to disambiguate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub timer_duration: Duration,
    pub external_timer_duration: Duration,
    pub minimal_filter: FilterPair,
    pub external_log_level_filter: Option<LogLevel>,
    pub handlers: Vec<SinkDescriptor>,
}

/// The external-log path's effective threshold when no explicit
/// `external_log_level_filter` has been configured (spec.md §4.8's "falling
/// back to a global default if none").
pub const DEFAULT_EXTERNAL_LOG_LEVEL: LogLevel = LogLevel::Info;

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timer_duration: Duration::from_millis(500),
            external_timer_duration: Duration::from_secs(5 * 60),
            minimal_filter: FilterPair::default(),
            external_log_level_filter: None,
            handlers: Vec::new(),
        }
    }
}
