use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use activity_log_codec::{
    gzip_writer,
    write_eof_sentinel,
    write_frame,
    write_stream_version,
    Frame,
    CURRENT_STREAM_VERSION,
};
use activity_log_dispatch::{MonitorClient, Sink, SinkDescriptor};
use activity_log_model::MulticastEntry;
use anyhow::Context;
use flate2::write::GzEncoder;

enum FileWriter {
    Raw(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            FileWriter::Raw(w) => w.write(buf),
            FileWriter::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            FileWriter::Raw(w) => w.flush(),
            FileWriter::Gzip(w) => w.flush(),
        }
    }
}

impl FileWriter {
    fn finish(self) -> io::Result<()> {
        match self {
            FileWriter::Raw(mut w) => w.flush(),
            FileWriter::Gzip(w) => w.finish().map(drop),
        }
    }

    /// Flushes buffered bytes to disk periodically without disturbing the
    /// deflate stream: `GzEncoder::flush` would emit a `Z_SYNC_FLUSH`
    /// boundary, which makes the file diverge byte-for-byte from a
    /// single-pass recompression of the same entries (spec.md §8). The raw
    /// variant has no such stream to protect, so it flushes on every tick.
    fn periodic_flush(&mut self) -> io::Result<()> {
        match self {
            FileWriter::Raw(w) => w.flush(),
            FileWriter::Gzip(_) => Ok(()),
        }
    }
}

/// Writes the versioned binary format (spec.md §4.4/§6), optionally gzip-
/// wrapped. Writes go to a `.tmp` sibling file and are renamed into place
/// only once the EOF sentinel has been written and the stream finalized, so
/// a crash mid-write never leaves a file at the configured path that looks
/// complete but isn't (spec.md §8 scenario 1: "no `.tmp` files remain on
/// disk" after a clean disposal).
pub struct BinaryFileSink {
    path: PathBuf,
    use_gzip: bool,
    writer: Option<FileWriter>,
}

impl BinaryFileSink {
    pub fn new(path: impl Into<PathBuf>, use_gzip: bool) -> Self {
        Self {
            path: path.into(),
            use_gzip,
            writer: None,
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl Sink for BinaryFileSink {
    fn activate(&mut self, _worker_monitor: &Arc<MonitorClient>) -> anyhow::Result<bool> {
        let tmp = self.tmp_path();
        let file = File::create(&tmp).with_context(|| format!("creating binary file sink at {}", tmp.display()))?;
        let buffered = BufWriter::new(file);
        let mut writer = if self.use_gzip {
            FileWriter::Gzip(gzip_writer(buffered))
        } else {
            FileWriter::Raw(buffered)
        };
        write_stream_version(&mut writer, CURRENT_STREAM_VERSION)?;
        self.writer = Some(writer);
        Ok(true)
    }

    fn apply_configuration(&mut self, desc: &SinkDescriptor) -> anyhow::Result<bool> {
        match desc {
            SinkDescriptor::BinaryFile(cfg) => {
                Ok(Path::new(&cfg.path) == self.path && cfg.use_gzip_compression == self.use_gzip)
            },
            _ => Ok(false),
        }
    }

    fn handle(&mut self, _worker_monitor: &Arc<MonitorClient>, event: &MulticastEntry) -> anyhow::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .context("binary file sink handled an event before activation")?;
        write_frame(writer, &Frame::Multicast(event.clone()))?;
        Ok(())
    }

    fn on_timer(&mut self, _worker_monitor: &Arc<MonitorClient>, _period: Duration) -> anyhow::Result<()> {
        if let Some(writer) = &mut self.writer {
            writer.periodic_flush()?;
        }
        Ok(())
    }

    fn deactivate(&mut self, _worker_monitor: &Arc<MonitorClient>) -> anyhow::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            write_eof_sentinel(&mut writer)?;
            writer.finish()?;
            fs::rename(self.tmp_path(), &self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use activity_log_codec::{read_frame, ReadOutcome};
    use activity_log_model::{EntryBody, EntryCommon, Level, LogEntry, LogLevel, Timestamp};
    use chrono::Utc;
    use tempfile::tempdir;
    use uuid::Uuid;

    use super::*;

    fn worker_monitor() -> Arc<MonitorClient> {
        activity_log_dispatch::Dispatcher::spawn(
            activity_log_dispatch::DispatcherConfig::default(),
            Arc::new(|_| anyhow::bail!("no sinks configured")),
            None,
        )
        .worker_monitor()
    }

    fn multicast(text: &str) -> MulticastEntry {
        let mut common = EntryCommon::new(Timestamp::new(Utc::now(), 0), Level::unfiltered(LogLevel::Info));
        common.text = Some(text.to_string());
        MulticastEntry {
            monitor_id: Uuid::new_v4(),
            group_depth_at_entry: 0,
            previous_timestamp: None,
            previous_entry_kind: None,
            entry: LogEntry::new(common, EntryBody::Line),
        }
    }

    /// A fully fixed entry (timestamp, monitor id) so two sinks fed the same
    /// sequence of these produce byte-identical output regardless of when
    /// the test runs.
    fn deterministic_multicast(text: &str, monitor_id: Uuid) -> MulticastEntry {
        let instant = chrono::DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let mut common = EntryCommon::new(Timestamp::new(instant, 0), Level::unfiltered(LogLevel::Info));
        common.text = Some(text.to_string());
        MulticastEntry {
            monitor_id,
            group_depth_at_entry: 0,
            previous_timestamp: None,
            previous_entry_kind: None,
            entry: LogEntry::new(common, EntryBody::Line),
        }
    }

    #[test]
    fn writes_a_valid_file_with_header_and_sentinel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("activity.bin");
        let monitor = worker_monitor();
        let mut sink = BinaryFileSink::new(&path, false);
        assert!(sink.activate(&monitor).unwrap());
        sink.handle(&monitor, &multicast("one")).unwrap();
        sink.handle(&monitor, &multicast("two")).unwrap();
        sink.deactivate(&monitor).unwrap();

        assert!(!dir.path().join("activity.bin.tmp").exists());
        let mut reader = activity_log_codec::open_reader(&path).unwrap();
        let version = activity_log_codec::read_stream_version(&mut reader).unwrap();
        assert_eq!(version, CURRENT_STREAM_VERSION);
        let mut count = 0;
        loop {
            match read_frame(&mut reader).unwrap() {
                ReadOutcome::Frame(_) => count += 1,
                ReadOutcome::Eof => break,
            }
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn apply_configuration_checks_both_path_and_gzip_flag() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bin");
        let mut sink = BinaryFileSink::new(&path, true);
        assert!(sink
            .apply_configuration(&SinkDescriptor::BinaryFile(activity_log_dispatch::BinaryFileConfig {
                path: path.to_string_lossy().into_owned(),
                use_gzip_compression: true,
            }))
            .unwrap());
        assert!(!sink
            .apply_configuration(&SinkDescriptor::BinaryFile(activity_log_dispatch::BinaryFileConfig {
                path: path.to_string_lossy().into_owned(),
                use_gzip_compression: false,
            }))
            .unwrap());
    }

    #[test]
    fn gzip_ticks_do_not_perturb_the_compressed_bytes() {
        let dir = tempdir().unwrap();
        let monitor = worker_monitor();
        let monitor_id = Uuid::new_v4();

        let ticked_path = dir.path().join("ticked.bin.gz");
        let mut ticked = BinaryFileSink::new(&ticked_path, true);
        ticked.activate(&monitor).unwrap();
        ticked.handle(&monitor, &deterministic_multicast("one", monitor_id)).unwrap();
        ticked.on_timer(&monitor, Duration::from_millis(500)).unwrap();
        ticked.handle(&monitor, &deterministic_multicast("two", monitor_id)).unwrap();
        ticked.on_timer(&monitor, Duration::from_millis(500)).unwrap();
        ticked.on_timer(&monitor, Duration::from_millis(500)).unwrap();
        ticked.deactivate(&monitor).unwrap();

        let untouched_path = dir.path().join("untouched.bin.gz");
        let mut untouched = BinaryFileSink::new(&untouched_path, true);
        untouched.activate(&monitor).unwrap();
        untouched.handle(&monitor, &deterministic_multicast("one", monitor_id)).unwrap();
        untouched.handle(&monitor, &deterministic_multicast("two", monitor_id)).unwrap();
        untouched.deactivate(&monitor).unwrap();

        let ticked_bytes = fs::read(&ticked_path).unwrap();
        let untouched_bytes = fs::read(&untouched_path).unwrap();
        assert_eq!(
            ticked_bytes, untouched_bytes,
            "mid-stream on_timer ticks must not add sync-flush boundaries to the gzip stream"
        );
    }
}
