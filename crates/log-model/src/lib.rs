//! The hierarchical log entry data model: timestamps with a monotone
//! discipline, levels, interned tags, exception records, and the entry
//! variants (`Line`/`OpenGroup`/`CloseGroup`) plus their multicast wrapper.

mod entry;
mod exception;
mod level;
mod tags;
mod timestamp;

pub use entry::{
    external_monitor_id,
    EntryBody,
    EntryCommon,
    EntryKind,
    LogEntry,
    MulticastEntry,
};
pub use exception::ExceptionData;
pub use level::{
    Level,
    LogLevel,
};
pub use tags::{
    Tag,
    TagSet,
};
pub use timestamp::{
    Timestamp,
    TimestampSource,
};
