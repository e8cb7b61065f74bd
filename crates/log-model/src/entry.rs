use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    exception::ExceptionData,
    level::Level,
    tags::TagSet,
    timestamp::Timestamp,
};

/// Fields shared by every entry variant.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryCommon {
    pub timestamp: Timestamp,
    pub level: Level,
    pub text: Option<String>,
    pub tags: Option<TagSet>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub exception: Option<ExceptionData>,
}

impl EntryCommon {
    pub fn new(timestamp: Timestamp, level: Level) -> Self {
        Self {
            timestamp,
            level,
            text: None,
            tags: None,
            file: None,
            line: None,
            exception: None,
        }
    }
}

/// The variant-specific payload of a [`LogEntry`].
#[derive(Debug, Clone, PartialEq)]
pub enum EntryBody {
    /// A standalone log line.
    Line,
    /// Opens a nested scope.
    OpenGroup,
    /// Closes a scope. Carries the conclusion strings collected while the
    /// group was open.
    CloseGroup { conclusions: Vec<String> },
}

/// The discriminant of an [`EntryBody`], with no payload. Used as the
/// multicast back-pointer's "previous entry kind of this monitor".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Line,
    OpenGroup,
    CloseGroup,
}

impl From<&EntryBody> for EntryKind {
    fn from(body: &EntryBody) -> Self {
        match body {
            EntryBody::Line => EntryKind::Line,
            EntryBody::OpenGroup => EntryKind::OpenGroup,
            EntryBody::CloseGroup { .. } => EntryKind::CloseGroup,
        }
    }
}

/// One unicast log entry: a `Line`, `OpenGroup`, or `CloseGroup`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub common: EntryCommon,
    pub body: EntryBody,
}

impl LogEntry {
    pub fn new(common: EntryCommon, body: EntryBody) -> Self {
        Self { common, body }
    }

    pub fn kind(&self) -> EntryKind {
        EntryKind::from(&self.body)
    }
}

/// Zero GUID used for the process-wide external (contextless) log source.
pub fn external_monitor_id() -> Uuid {
    Uuid::nil()
}

/// A [`LogEntry`] enriched with per-monitor linkage so that a single
/// interleaved stream remains self-descriptive: `previous_timestamp` and
/// `previous_entry_kind` let a reader walk one monitor's entries by following
/// back-pointers, without needing to have seen every earlier entry for that
/// monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct MulticastEntry {
    pub monitor_id: Uuid,
    pub group_depth_at_entry: u32,
    pub previous_timestamp: Option<Timestamp>,
    pub previous_entry_kind: Option<EntryKind>,
    pub entry: LogEntry,
}

impl MulticastEntry {
    pub fn is_external(&self) -> bool {
        self.monitor_id == external_monitor_id()
    }
}
