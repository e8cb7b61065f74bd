use std::{
    collections::BTreeSet,
    sync::Arc,
};

use activity_log_model::{
    MulticastEntry,
    Timestamp,
};
use uuid::Uuid;

/// One monitor's footprint within a single file: the span of entries seen
/// for it in that file, plus the union of tags attached to any of them.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSegment {
    pub file_id: usize,
    pub first_offset: u64,
    pub last_offset: u64,
    pub first_depth: u32,
    pub last_depth: u32,
    pub first_time: Timestamp,
    pub last_time: Timestamp,
    pub tags: BTreeSet<Arc<str>>,
}

impl FileSegment {
    fn starting(file_id: usize, offset: u64, entry: &MulticastEntry) -> Self {
        let mut tags = BTreeSet::new();
        if let Some(tag_set) = &entry.entry.common.tags {
            for tag in tag_set.iter() {
                tags.insert(Arc::from(tag.as_str()));
            }
        }
        Self {
            file_id,
            first_offset: offset,
            last_offset: offset,
            first_depth: entry.group_depth_at_entry,
            last_depth: entry.group_depth_at_entry,
            first_time: entry.entry.common.timestamp,
            last_time: entry.entry.common.timestamp,
            tags,
        }
    }

    fn absorb(&mut self, offset: u64, entry: &MulticastEntry) {
        let time = entry.entry.common.timestamp;
        if time < self.first_time {
            self.first_time = time;
            self.first_offset = offset;
            self.first_depth = entry.group_depth_at_entry;
        }
        if time > self.last_time {
            self.last_time = time;
            self.last_offset = offset;
            self.last_depth = entry.group_depth_at_entry;
        }
        if let Some(tag_set) = &entry.entry.common.tags {
            for tag in tag_set.iter() {
                self.tags.insert(Arc::from(tag.as_str()));
            }
        }
    }

    /// The 5-tuple spec.md §4.6 compares to detect a gzip/raw duplicate pair:
    /// everything but `file_id` and the tag union.
    fn dedup_key(&self) -> (u64, u64, Timestamp, Timestamp) {
        (self.first_offset, self.last_offset, self.first_time, self.last_time)
    }
}

/// Accumulates, file by file, the [`FileSegment`]s observed for every
/// monitor.
#[derive(Debug, Default)]
pub(crate) struct SegmentIndex {
    by_monitor: std::collections::BTreeMap<Uuid, std::collections::BTreeMap<usize, FileSegment>>,
}

impl SegmentIndex {
    pub fn record(&mut self, file_id: usize, offset: u64, entry: &MulticastEntry) {
        let per_file = self.by_monitor.entry(entry.monitor_id).or_default();
        match per_file.get_mut(&file_id) {
            Some(segment) => segment.absorb(offset, entry),
            None => {
                per_file.insert(file_id, FileSegment::starting(file_id, offset, entry));
            },
        }
    }

    /// True if every monitor's segment in `file_id` is byte-for-byte
    /// identical (by dedup key) to a segment already recorded for
    /// `existing_file_id` — the gzip/raw duplicate-pair case.
    pub fn file_duplicates(&self, file_id: usize, existing_file_id: usize) -> bool {
        let mut any = false;
        for segments in self.by_monitor.values() {
            let Some(candidate) = segments.get(&file_id) else {
                continue;
            };
            any = true;
            match segments.get(&existing_file_id) {
                Some(existing) if existing.dedup_key() == candidate.dedup_key() => {},
                _ => return false,
            }
        }
        any
    }

    pub fn monitors(&self) -> impl Iterator<Item = (&Uuid, &std::collections::BTreeMap<usize, FileSegment>)> {
        self.by_monitor.iter()
    }
}

/// One monitor's full activity, as returned by
/// [`crate::MultiFileReader::get_activity_map`]: its segments across every
/// non-duplicate file that contains it, ordered by `first_time`.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorActivity {
    pub monitor_id: Uuid,
    pub segments: Vec<FileSegment>,
}

impl MonitorActivity {
    pub fn first_time(&self) -> Timestamp {
        self.segments
            .first()
            .map(|s| s.first_time)
            .expect("a MonitorActivity always has at least one segment")
    }

    pub fn last_time(&self) -> Timestamp {
        self.segments
            .iter()
            .map(|s| s.last_time)
            .max()
            .expect("a MonitorActivity always has at least one segment")
    }
}
