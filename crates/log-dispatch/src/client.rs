use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc,
};

use activity_log_model::{
    EntryBody,
    EntryCommon,
    EntryKind,
    ExceptionData,
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
use uuid::Uuid;

use crate::config::FilterPair;

struct PreviousEntry {
    timestamp: Timestamp,
    kind: EntryKind,
}

/// A single producer's view of the dispatcher: per-monitor group-depth
/// tracking and the previous-entry back-pointer that makes single-pass
/// indexing possible (spec.md §4.7). Cheap to clone and share across
/// threads — `open_group`/`log_line`/`log_exception` are all that a
/// producer needs.
pub struct MonitorClient {
    monitor_id: Uuid,
    sender: Sender<MulticastEntry>,
    accepting: Arc<AtomicBool>,
    timestamps: TimestampSource,
    filter: Arc<RwLock<FilterPair>>,
    depth: AtomicU32,
    previous: Mutex<Option<PreviousEntry>>,
}

impl MonitorClient {
    pub(crate) fn new(
        monitor_id: Uuid,
        sender: Sender<MulticastEntry>,
        accepting: Arc<AtomicBool>,
        filter: Arc<RwLock<FilterPair>>,
    ) -> Self {
        Self {
            monitor_id,
            sender,
            accepting,
            timestamps: TimestampSource::new(),
            filter,
            depth: AtomicU32::new(0),
            previous: Mutex::new(None),
        }
    }

    pub fn monitor_id(&self) -> Uuid {
        self.monitor_id
    }

    pub fn depth(&self) -> u32 {
        self.depth.load(Ordering::Relaxed)
    }

    /// Emits a standalone log line at `level`.
    pub fn log_line(&self, level: Level, text: impl Into<String>) {
        self.emit(self.depth(), level, EntryBody::Line, Some(text.into()), None, None, None);
    }

    /// Emits a line carrying tags, source location, and/or an exception, for
    /// producers that have more than a bare message to report.
    pub fn log_detailed(
        &self,
        level: Level,
        text: Option<String>,
        tags: Option<TagSet>,
        file: Option<String>,
        line: Option<u32>,
        exception: Option<ExceptionData>,
    ) {
        self.emit(self.depth(), level, EntryBody::Line, text, tags, file.zip(line), exception);
    }

    /// Opens a nested scope. The returned [`GroupGuard`] closes it (with an
    /// empty conclusion list) on drop if the caller never calls
    /// [`GroupGuard::close`] explicitly — the RAII realization of spec.md
    /// §9's "coroutine-like open group scope" re-architecture note.
    pub fn open_group(self: &Arc<Self>, text: impl Into<String>) -> GroupGuard {
        let depth_after = self.depth.fetch_add(1, Ordering::AcqRel) + 1;
        self.emit(depth_after, Level::unfiltered(LogLevel::Info), EntryBody::OpenGroup, Some(text.into()), None, None, None);
        GroupGuard {
            client: self.clone(),
            depth_at_entry: depth_after,
            closed: false,
        }
    }

    /// Closes the group this guard opened, at the depth it was opened at —
    /// not whatever the client's depth counter happens to read now. A caller
    /// that closes an outer guard before an inner one is still open (valid,
    /// if unusual, usage) must not have its `CloseGroup` stamped with the
    /// inner group's depth.
    fn close_group(&self, depth_at_entry: u32, conclusions: Vec<String>) {
        self.emit(
            depth_at_entry,
            Level::unfiltered(LogLevel::Info),
            EntryBody::CloseGroup { conclusions },
            None,
            None,
            None,
            None,
        );
        self.depth.fetch_sub(1, Ordering::AcqRel);
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &self,
        depth: u32,
        level: Level,
        body: EntryBody,
        text: Option<String>,
        tags: Option<TagSet>,
        file_line: Option<(String, u32)>,
        exception: Option<ExceptionData>,
    ) {
        let threshold = {
            let filter = self.filter.read();
            match &body {
                EntryBody::Line => filter.line,
                EntryBody::OpenGroup | EntryBody::CloseGroup { .. } => filter.group,
            }
        };
        if !level.passes(threshold) {
            return;
        }

        let timestamp = self.timestamps.next(Utc::now());
        let mut common = EntryCommon::new(timestamp, level);
        common.text = text;
        common.tags = tags;
        if let Some((file, line)) = file_line {
            common.file = Some(file);
            common.line = Some(line);
        }
        common.exception = exception;
        let entry = LogEntry::new(common, body);
        let kind = entry.kind();

        let mut previous = self.previous.lock();
        let (previous_timestamp, previous_entry_kind) = previous
            .as_ref()
            .map(|p| (Some(p.timestamp), Some(p.kind)))
            .unwrap_or((None, None));
        *previous = Some(PreviousEntry { timestamp, kind });
        drop(previous);

        let multicast = MulticastEntry {
            monitor_id: self.monitor_id,
            group_depth_at_entry: depth,
            previous_timestamp,
            previous_entry_kind,
            entry,
        };

        if self.accepting.load(Ordering::Relaxed) {
            let _ = self.sender.send(multicast);
        }
    }
}

/// An open group scope. Dropping it without calling [`close`](Self::close)
/// emits a `CloseGroup` with no conclusions, keeping the per-monitor depth
/// balanced even if the caller unwinds through a panic or an early return.
pub struct GroupGuard {
    client: Arc<MonitorClient>,
    depth_at_entry: u32,
    closed: bool,
}

impl GroupGuard {
    pub fn close(mut self, conclusions: Vec<String>) {
        self.client.close_group(self.depth_at_entry, conclusions);
        self.closed = true;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if !self.closed {
            self.client.close_group(self.depth_at_entry, Vec::new());
        }
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::unbounded;

    use super::*;

    fn client() -> (Arc<MonitorClient>, crossbeam_channel::Receiver<MulticastEntry>) {
        let (tx, rx) = unbounded();
        let client = Arc::new(MonitorClient::new(
            Uuid::new_v4(),
            tx,
            Arc::new(AtomicBool::new(true)),
            Arc::new(RwLock::new(FilterPair::default())),
        ));
        (client, rx)
    }

    #[test]
    fn open_and_close_group_balances_depth() {
        let (client, rx) = client();
        assert_eq!(client.depth(), 0);
        let guard = client.open_group("scope");
        assert_eq!(client.depth(), 1);
        guard.close(vec!["done".to_string()]);
        assert_eq!(client.depth(), 0);

        let opened = rx.recv().unwrap();
        assert!(matches!(opened.entry.body, EntryBody::OpenGroup));
        assert_eq!(opened.group_depth_at_entry, 1);
        let closed = rx.recv().unwrap();
        assert!(matches!(closed.entry.body, EntryBody::CloseGroup { .. }));
        assert_eq!(closed.group_depth_at_entry, 1);
    }

    #[test]
    fn closing_outer_guard_before_inner_stamps_its_own_depth() {
        let (client, rx) = client();
        let outer = client.open_group("outer");
        let inner = client.open_group("inner");
        assert_eq!(client.depth(), 2);

        // Out-of-LIFO: close the outer scope while the inner one is still open.
        outer.close(Vec::new());
        assert_eq!(client.depth(), 1);

        let opened_outer = rx.recv().unwrap();
        assert_eq!(opened_outer.group_depth_at_entry, 1);
        let opened_inner = rx.recv().unwrap();
        assert_eq!(opened_inner.group_depth_at_entry, 2);
        let closed_outer = rx.recv().unwrap();
        assert!(matches!(closed_outer.entry.body, EntryBody::CloseGroup { .. }));
        assert_eq!(
            closed_outer.group_depth_at_entry, 1,
            "the close record must carry the depth the outer guard was opened at, not the inner guard's"
        );

        drop(inner);
        let closed_inner = rx.recv().unwrap();
        assert_eq!(closed_inner.group_depth_at_entry, 2);
    }

    #[test]
    fn dropped_guard_emits_close_group_with_no_conclusions() {
        let (client, rx) = client();
        {
            let _guard = client.open_group("scope");
        }
        let _opened = rx.recv().unwrap();
        let closed = rx.recv().unwrap();
        match closed.entry.body {
            EntryBody::CloseGroup { conclusions } => assert!(conclusions.is_empty()),
            _ => panic!("expected a CloseGroup"),
        }
        assert_eq!(client.depth(), 0);
    }

    #[test]
    fn previous_timestamp_chains_successive_emissions() {
        let (client, rx) = client();
        client.log_line(Level::unfiltered(LogLevel::Info), "first");
        client.log_line(Level::unfiltered(LogLevel::Info), "second");
        let first = rx.recv().unwrap();
        let second = rx.recv().unwrap();
        assert_eq!(second.previous_timestamp, Some(first.entry.common.timestamp));
        assert_eq!(second.previous_entry_kind, Some(EntryKind::Line));
    }

    #[test]
    fn below_threshold_lines_are_not_emitted() {
        let (tx, rx) = unbounded();
        let client = MonitorClient::new(
            Uuid::new_v4(),
            tx,
            Arc::new(AtomicBool::new(true)),
            Arc::new(RwLock::new(FilterPair {
                group: LogLevel::Debug,
                line: LogLevel::Warn,
            })),
        );
        client.log_line(Level::unfiltered(LogLevel::Info), "too quiet");
        client.log_line(Level::unfiltered(LogLevel::Error), "loud enough");
        let only = rx.try_recv().unwrap();
        assert_eq!(only.entry.common.text.as_deref(), Some("loud enough"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn filtered_bit_bypasses_the_minimal_filter() {
        let (tx, rx) = unbounded();
        let client = MonitorClient::new(
            Uuid::new_v4(),
            tx,
            Arc::new(AtomicBool::new(true)),
            Arc::new(RwLock::new(FilterPair {
                group: LogLevel::Debug,
                line: LogLevel::Fatal,
            })),
        );
        client.log_line(Level::new(LogLevel::Trace, true), "bypasses the gate");
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn stopped_dispatcher_silently_drops_emissions() {
        let (tx, rx) = unbounded();
        let accepting = Arc::new(AtomicBool::new(false));
        let client = MonitorClient::new(
            Uuid::new_v4(),
            tx,
            accepting,
            Arc::new(RwLock::new(FilterPair::default())),
        );
        client.log_line(Level::unfiltered(LogLevel::Info), "dropped");
        assert!(rx.try_recv().is_err());
    }
}
