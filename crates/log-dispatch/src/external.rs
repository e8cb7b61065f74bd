use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use activity_log_model::{
    external_monitor_id,
    EntryBody,
    EntryCommon,
    EntryKind,
    Level,
    LogEntry,
    LogLevel,
    MulticastEntry,
    TagSet,
    Timestamp,
    TimestampSource,
};
use chrono::Utc;
use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};

use crate::config::DEFAULT_EXTERNAL_LOG_LEVEL;

struct PreviousEntry {
    timestamp: Timestamp,
    kind: EntryKind,
}

/// The contextless logging path (spec.md §4.8): a process-wide source with
/// no monitor, no group nesting, and its own filter threshold rather than a
/// per-monitor [`FilterPair`](crate::config::FilterPair). Always reports
/// [`external_monitor_id`] at depth zero.
pub struct ExternalClient {
    sender: Sender<MulticastEntry>,
    accepting: Arc<AtomicBool>,
    filter: Arc<RwLock<Option<LogLevel>>>,
    timestamps: TimestampSource,
    previous: Mutex<Option<PreviousEntry>>,
}

impl ExternalClient {
    pub(crate) fn new(
        sender: Sender<MulticastEntry>,
        accepting: Arc<AtomicBool>,
        filter: Arc<RwLock<Option<LogLevel>>>,
    ) -> Self {
        Self {
            sender,
            accepting,
            filter,
            timestamps: TimestampSource::new(),
            previous: Mutex::new(None),
        }
    }

    /// Emits a standalone line. If `level.is_filtered` is set the entry is
    /// emitted unconditionally; otherwise it is compared against
    /// `external_log_level_filter`, falling back to
    /// [`DEFAULT_EXTERNAL_LOG_LEVEL`] when unset.
    pub fn log(&self, level: Level, text: impl Into<String>) {
        self.log_tagged(level, text, None);
    }

    /// As [`log`](Self::log), additionally attaching `tags` to the entry —
    /// used by the default dispatcher to mark re-emitted critical errors
    /// with a fixed tag (spec.md §6's "critical-error sink").
    pub fn log_tagged(&self, level: Level, text: impl Into<String>, tags: Option<TagSet>) {
        let threshold = (*self.filter.read()).unwrap_or(DEFAULT_EXTERNAL_LOG_LEVEL);
        if !level.passes(threshold) {
            return;
        }

        let timestamp = self.timestamps.next(Utc::now());
        let mut common = EntryCommon::new(timestamp, level);
        common.text = Some(text.into());
        common.tags = tags;
        let entry = LogEntry::new(common, EntryBody::Line);
        let kind = entry.kind();

        let mut previous = self.previous.lock();
        let (previous_timestamp, previous_entry_kind) = previous
            .as_ref()
            .map(|p| (Some(p.timestamp), Some(p.kind)))
            .unwrap_or((None, None));
        *previous = Some(PreviousEntry { timestamp, kind });
        drop(previous);

        let multicast = MulticastEntry {
            monitor_id: external_monitor_id(),
            group_depth_at_entry: 0,
            previous_timestamp,
            previous_entry_kind,
            entry,
        };

        if self.accepting.load(Ordering::Relaxed) {
            let _ = self.sender.send(multicast);
        }
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::unbounded;

    use super::*;

    fn client() -> (ExternalClient, crossbeam_channel::Receiver<MulticastEntry>) {
        let (tx, rx) = unbounded();
        let client = ExternalClient::new(tx, Arc::new(AtomicBool::new(true)), Arc::new(RwLock::new(None)));
        (client, rx)
    }

    #[test]
    fn falls_back_to_the_default_level_when_unset() {
        let (client, rx) = client();
        client.log(Level::unfiltered(LogLevel::Debug), "too quiet for the default");
        assert!(rx.try_recv().is_err());
        client.log(Level::unfiltered(LogLevel::Info), "meets the default");
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn filtered_bit_bypasses_the_external_filter() {
        let (tx, rx) = unbounded();
        let client = ExternalClient::new(
            tx,
            Arc::new(AtomicBool::new(true)),
            Arc::new(RwLock::new(Some(LogLevel::Fatal))),
        );
        client.log(Level::new(LogLevel::Trace, true), "bypasses the gate");
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn entries_report_the_nil_monitor_at_depth_zero() {
        let (client, rx) = client();
        client.log(Level::unfiltered(LogLevel::Info), "hello");
        let entry = rx.recv().unwrap();
        assert_eq!(entry.monitor_id, external_monitor_id());
        assert_eq!(entry.group_depth_at_entry, 0);
    }
}
