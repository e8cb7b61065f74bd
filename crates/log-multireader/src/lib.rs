//! Merges one or more activity-log files into per-monitor activity maps
//! (spec.md §4.6), and hands out a filtered reader that replays a single
//! monitor's entries by following the multicast back-pointers.

mod activity;
mod counting;
mod error;

use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

use activity_log_codec::{
    self as codec,
    Frame,
    ReadOutcome,
};
use activity_log_model::{
    MulticastEntry,
    Timestamp,
};
use uuid::Uuid;

pub use activity::{
    FileSegment,
    MonitorActivity,
};
pub use error::{
    MultiReaderError,
    MultiReaderResult,
};

use crate::{
    activity::SegmentIndex,
    counting::{
        skip_bytes,
        CountingReader,
    },
};

#[derive(Debug, Clone)]
struct FileRecord {
    path: PathBuf,
    size: u64,
    duplicate_of: Option<usize>,
}

/// Indexes files added via [`add`](MultiFileReader::add) and answers queries
/// over the resulting per-monitor activity map.
#[derive(Debug, Default)]
pub struct MultiFileReader {
    files: Vec<FileRecord>,
    segments: SegmentIndex,
}

impl MultiFileReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes each path in `paths`, skipping any already added (by
    /// canonical absolute path and file size — spec.md §4.6's dedup probe).
    /// Returns, per input path, whether it was newly indexed.
    pub fn add(&mut self, paths: &[PathBuf]) -> MultiReaderResult<Vec<bool>> {
        let mut newly_indexed = Vec::with_capacity(paths.len());
        for path in paths {
            let canonical = fs::canonicalize(path)?;
            let size = fs::metadata(path)?.len();
            if self
                .files
                .iter()
                .any(|f| f.path == canonical && f.size == size)
            {
                newly_indexed.push(false);
                continue;
            }

            let file_id = self.files.len();
            self.files.push(FileRecord {
                path: canonical,
                size,
                duplicate_of: None,
            });
            self.index_file(file_id)?;
            self.files[file_id].duplicate_of = self.find_duplicate(file_id);
            newly_indexed.push(true);
        }
        Ok(newly_indexed)
    }

    fn index_file(&mut self, file_id: usize) -> MultiReaderResult<()> {
        let path = self.files[file_id].path.clone();
        let mut reader = CountingReader::new(codec::open_reader(&path)?);
        codec::read_stream_version(&mut reader)?;
        loop {
            let offset = reader.position();
            match codec::read_frame(&mut reader) {
                Ok(ReadOutcome::Frame(Frame::Multicast(entry))) => {
                    self.segments.record(file_id, offset, &entry);
                },
                Ok(ReadOutcome::Frame(Frame::Unicast(_))) => {
                    // Unicast entries (e.g. a pipe producer's own stream) carry no
                    // monitor id and are not part of the per-monitor activity map.
                },
                Ok(ReadOutcome::Eof) => break,
                Err(e) if e.is_truncation() => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Finds an earlier, non-duplicate file whose segments are identical to
    /// `file_id`'s for every monitor `file_id` contains — the gzip/raw
    /// duplicate-pair case from spec.md §4.6.
    fn find_duplicate(&self, file_id: usize) -> Option<usize> {
        self.files
            .iter()
            .enumerate()
            .take(file_id)
            .filter(|(_, f)| f.duplicate_of.is_none())
            .find(|(other_id, _)| self.segments.file_duplicates(file_id, *other_id))
            .map(|(other_id, _)| other_id)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn is_duplicate(&self, file_id: usize) -> bool {
        self.files
            .get(file_id)
            .map(|f| f.duplicate_of.is_some())
            .unwrap_or(false)
    }

    pub fn file_path(&self, file_id: usize) -> Option<&Path> {
        self.files.get(file_id).map(|f| f.path.as_path())
    }

    /// A snapshot of every monitor's activity, sorted by each monitor's
    /// earliest `first_time`. Segments from files marked duplicate are
    /// excluded, so a monitor whose only file was a duplicate pair's second
    /// copy does not appear twice.
    pub fn get_activity_map(&self) -> Vec<MonitorActivity> {
        let mut result: Vec<MonitorActivity> = self
            .segments
            .monitors()
            .filter_map(|(monitor_id, by_file)| {
                let mut segments: Vec<FileSegment> = by_file
                    .iter()
                    .filter(|(file_id, _)| !self.is_duplicate(**file_id))
                    .map(|(_, segment)| segment.clone())
                    .collect();
                if segments.is_empty() {
                    return None;
                }
                segments.sort_by_key(|s| s.first_time);
                Some(MonitorActivity {
                    monitor_id: *monitor_id,
                    segments,
                })
            })
            .collect();
        result.sort_by_key(|m| m.first_time());
        result
    }

    /// The earliest and latest entry timestamps across every non-duplicate
    /// file, if any monitor has been indexed.
    pub fn global_time_range(&self) -> Option<(Timestamp, Timestamp)> {
        let map = self.get_activity_map();
        let first = map.iter().map(|m| m.first_time()).min()?;
        let last = map.iter().map(|m| m.last_time()).max()?;
        Some((first, last))
    }

    /// Opens a reader positioned at `offset` within `file_id`, yielding only
    /// entries for `monitor_id`. `offset` must land exactly on a multicast
    /// entry's tag byte for that monitor (as recorded in a [`FileSegment`]);
    /// anything else is rejected rather than silently resynchronising.
    pub fn monitor_reader(
        &self,
        monitor_id: Uuid,
        file_id: usize,
        offset: u64,
    ) -> MultiReaderResult<MonitorReader> {
        let path = self
            .files
            .get(file_id)
            .ok_or(MultiReaderError::UnknownFile(file_id))?
            .path
            .clone();
        let mut inner = codec::open_reader(&path)?;
        skip_bytes(&mut inner, offset)?;
        let first = match codec::read_frame(&mut inner)? {
            ReadOutcome::Frame(Frame::Multicast(entry)) if entry.monitor_id == monitor_id => entry,
            _ => {
                return Err(MultiReaderError::OffsetMismatch {
                    file_id,
                    offset,
                    expected: monitor_id,
                })
            },
        };
        Ok(MonitorReader {
            inner,
            monitor_id,
            pending: Some(first),
        })
    }
}

/// Replays one monitor's entries from a single file, skipping entries that
/// belong to other monitors (per spec.md §4.6).
pub struct MonitorReader {
    inner: Box<dyn std::io::Read>,
    monitor_id: Uuid,
    pending: Option<MulticastEntry>,
}

impl MonitorReader {
    pub fn next(&mut self) -> MultiReaderResult<Option<MulticastEntry>> {
        if let Some(entry) = self.pending.take() {
            return Ok(Some(entry));
        }
        loop {
            match codec::read_frame(&mut self.inner) {
                Ok(ReadOutcome::Frame(Frame::Multicast(entry))) if entry.monitor_id == self.monitor_id => {
                    return Ok(Some(entry));
                },
                Ok(ReadOutcome::Frame(_)) => continue,
                Ok(ReadOutcome::Eof) => return Ok(None),
                Err(e) if e.is_truncation() => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use activity_log_model::{
        EntryBody,
        EntryCommon,
        EntryKind,
        Level,
        LogEntry,
        LogLevel,
    };
    use chrono::Utc;
    use tempfile::tempdir;

    use super::*;

    fn multicast(monitor_id: Uuid, depth: u32, prev: Option<Timestamp>) -> MulticastEntry {
        let timestamp = Timestamp::new(Utc::now(), 0);
        let common = EntryCommon::new(timestamp, Level::unfiltered(LogLevel::Info));
        MulticastEntry {
            monitor_id,
            group_depth_at_entry: depth,
            previous_timestamp: prev,
            previous_entry_kind: prev.map(|_| EntryKind::Line),
            entry: LogEntry::new(common, EntryBody::Line),
        }
    }

    fn write_stream(path: &Path, entries: &[MulticastEntry]) {
        let mut buf = Vec::new();
        codec::write_stream_version(&mut buf, codec::CURRENT_STREAM_VERSION).unwrap();
        for entry in entries {
            codec::write_frame(&mut buf, &Frame::Multicast(entry.clone())).unwrap();
        }
        codec::write_eof_sentinel(&mut buf).unwrap();
        fs::write(path, buf).unwrap();
    }

    #[test]
    fn indexes_a_single_file_and_builds_the_activity_map() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.alog");
        let monitor = Uuid::new_v4();
        let e1 = multicast(monitor, 0, None);
        let e2 = multicast(monitor, 1, Some(e1.entry.common.timestamp));
        write_stream(&path, &[e1.clone(), e2.clone()]);

        let mut reader = MultiFileReader::new();
        let newly = reader.add(&[path.clone()]).unwrap();
        assert_eq!(newly, vec![true]);

        let map = reader.get_activity_map();
        assert_eq!(map.len(), 1);
        let activity = &map[0];
        assert_eq!(activity.monitor_id, monitor);
        assert_eq!(activity.segments.len(), 1);
        assert_eq!(activity.segments[0].first_depth, 0);
        assert_eq!(activity.segments[0].last_depth, 1);
    }

    #[test]
    fn adding_the_same_path_twice_is_not_reindexed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.alog");
        write_stream(&path, &[multicast(Uuid::new_v4(), 0, None)]);

        let mut reader = MultiFileReader::new();
        assert_eq!(reader.add(&[path.clone()]).unwrap(), vec![true]);
        assert_eq!(reader.add(&[path]).unwrap(), vec![false]);
        assert_eq!(reader.file_count(), 1);
    }

    #[test]
    fn gzip_and_raw_duplicate_pair_collapse_to_one_record() {
        let dir = tempdir().unwrap();
        let raw_path = dir.path().join("a.alog");
        let gz_path = dir.path().join("a.alog.gz");
        let monitor = Uuid::new_v4();
        let entries = vec![multicast(monitor, 0, None)];

        let mut buf = Vec::new();
        codec::write_stream_version(&mut buf, codec::CURRENT_STREAM_VERSION).unwrap();
        for entry in &entries {
            codec::write_frame(&mut buf, &Frame::Multicast(entry.clone())).unwrap();
        }
        codec::write_eof_sentinel(&mut buf).unwrap();
        fs::write(&raw_path, &buf).unwrap();

        let mut gz_buf = Vec::new();
        {
            let mut enc = codec::gzip_writer(&mut gz_buf);
            enc.write_all(&buf).unwrap();
            enc.finish().unwrap();
        }
        fs::write(&gz_path, &gz_buf).unwrap();

        let mut reader = MultiFileReader::new();
        reader.add(&[raw_path, gz_path]).unwrap();
        assert!(reader.is_duplicate(1));
        assert_eq!(reader.get_activity_map().len(), 1);
    }

    #[test]
    fn monitor_reader_skips_entries_from_other_monitors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.alog");
        let target = Uuid::new_v4();
        let other = Uuid::new_v4();
        let e1 = multicast(target, 0, None);
        let e2 = multicast(other, 0, None);
        let e3 = multicast(target, 0, Some(e1.entry.common.timestamp));
        write_stream(&path, &[e1.clone(), e2, e3.clone()]);

        let mut reader = MultiFileReader::new();
        reader.add(&[path]).unwrap();
        let map = reader.get_activity_map();
        let segment = &map
            .iter()
            .find(|m| m.monitor_id == target)
            .unwrap()
            .segments[0];

        let mut monitor_reader = reader
            .monitor_reader(target, segment.file_id, segment.first_offset)
            .unwrap();
        let first = monitor_reader.next().unwrap().unwrap();
        assert_eq!(first.monitor_id, target);
        let second = monitor_reader.next().unwrap().unwrap();
        assert_eq!(second.monitor_id, target);
        assert_eq!(second.entry.common.timestamp, e3.entry.common.timestamp);
        assert!(monitor_reader.next().unwrap().is_none());
    }

    #[test]
    fn monitor_reader_rejects_an_offset_for_the_wrong_monitor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.alog");
        let monitor = Uuid::new_v4();
        write_stream(&path, &[multicast(monitor, 0, None)]);

        let mut reader = MultiFileReader::new();
        reader.add(&[path]).unwrap();
        let err = reader.monitor_reader(Uuid::new_v4(), 0, 4).unwrap_err();
        assert!(matches!(err, MultiReaderError::OffsetMismatch { .. }));
    }
}
