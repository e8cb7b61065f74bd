//! The binary on-wire format: a 4-byte stream-version header, a sequence of
//! tag-prefixed entry frames, and a single trailing EOF sentinel byte. See
//! [`wire`] for the frame layout and [`gzip`] for the deterministic gzip
//! wrapper.

mod error;
mod frame;
mod gzip;
mod header;
mod varint;
mod wire;

pub use error::{
    CodecError,
    CodecResult,
};
pub use frame::{
    Frame,
    EOF_SENTINEL,
};
pub use gzip::{
    compression_level,
    gzip_writer,
    open_reader,
    GZIP_MAGIC,
};
pub use header::{
    read_stream_version,
    write_stream_version,
    CURRENT_STREAM_VERSION,
};
pub use varint::{
    read_uvarint,
    write_uvarint,
};
pub use wire::{
    read_frame,
    write_eof_sentinel,
    write_frame,
    ReadOutcome,
};

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use activity_log_model::{
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
    };
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn sample_timestamp() -> Timestamp {
        // Millisecond-truncate: the wire format only carries millisecond
        // precision, so round-tripping a value with sub-ms jitter wouldn't
        // compare equal.
        let now = Utc::now().timestamp_millis();
        Timestamp::new(chrono::DateTime::from_timestamp_millis(now).unwrap(), 3)
    }

    #[test]
    fn unicast_line_roundtrips() {
        let mut common = EntryCommon::new(sample_timestamp(), Level::unfiltered(LogLevel::Info));
        common.text = Some("hello world".to_string());
        common.tags = Some(TagSet::from_iter_dedup(
            ["a", "b"].into_iter().map(Tag::new),
        ));
        common.file = Some("main.rs".to_string());
        common.line = Some(42);
        common.exception = Some(ExceptionData::new("boom", "Oops"));
        let entry = LogEntry::new(common, EntryBody::Line);

        let mut buf = Vec::new();
        write_frame(&mut buf, &Frame::Unicast(entry.clone())).unwrap();
        let mut cursor = Cursor::new(buf);
        match read_frame(&mut cursor).unwrap() {
            ReadOutcome::Frame(Frame::Unicast(decoded)) => assert_eq!(decoded, entry),
            _ => panic!("expected a decoded unicast frame"),
        }
    }

    #[test]
    fn file_without_line_roundtrips_without_inventing_a_line_number() {
        let mut common = EntryCommon::new(sample_timestamp(), Level::unfiltered(LogLevel::Info));
        common.file = Some("main.rs".to_string());
        common.line = None;
        let entry = LogEntry::new(common, EntryBody::Line);

        let mut buf = Vec::new();
        write_frame(&mut buf, &Frame::Unicast(entry.clone())).unwrap();
        let mut cursor = Cursor::new(buf);
        match read_frame(&mut cursor).unwrap() {
            ReadOutcome::Frame(Frame::Unicast(decoded)) => assert_eq!(decoded, entry),
            _ => panic!("expected a decoded unicast frame"),
        }
    }

    #[test]
    fn line_without_file_roundtrips_without_inventing_an_empty_file() {
        let mut common = EntryCommon::new(sample_timestamp(), Level::unfiltered(LogLevel::Info));
        common.file = None;
        common.line = Some(7);
        let entry = LogEntry::new(common, EntryBody::Line);

        let mut buf = Vec::new();
        write_frame(&mut buf, &Frame::Unicast(entry.clone())).unwrap();
        let mut cursor = Cursor::new(buf);
        match read_frame(&mut cursor).unwrap() {
            ReadOutcome::Frame(Frame::Unicast(decoded)) => assert_eq!(decoded, entry),
            _ => panic!("expected a decoded unicast frame"),
        }
    }

    #[test]
    fn multicast_close_group_roundtrips() {
        let common = EntryCommon::new(sample_timestamp(), Level::new(LogLevel::Warn, true));
        let entry = LogEntry::new(
            common,
            EntryBody::CloseGroup {
                conclusions: vec!["ok".to_string(), "done in 3ms".to_string()],
            },
        );
        let multicast = MulticastEntry {
            monitor_id: Uuid::new_v4(),
            group_depth_at_entry: 2,
            previous_timestamp: Some(sample_timestamp()),
            previous_entry_kind: Some(EntryKind::OpenGroup),
            entry,
        };

        let mut buf = Vec::new();
        write_frame(&mut buf, &Frame::Multicast(multicast.clone())).unwrap();
        let mut cursor = Cursor::new(buf);
        match read_frame(&mut cursor).unwrap() {
            ReadOutcome::Frame(Frame::Multicast(decoded)) => assert_eq!(decoded, multicast),
            _ => panic!("expected a decoded multicast frame"),
        }
    }

    #[test]
    fn multicast_with_no_previous_entry() {
        let common = EntryCommon::new(sample_timestamp(), Level::unfiltered(LogLevel::Debug));
        let multicast = MulticastEntry {
            monitor_id: Uuid::new_v4(),
            group_depth_at_entry: 0,
            previous_timestamp: None,
            previous_entry_kind: None,
            entry: LogEntry::new(common, EntryBody::OpenGroup),
        };

        let mut buf = Vec::new();
        write_frame(&mut buf, &Frame::Multicast(multicast.clone())).unwrap();
        let mut cursor = Cursor::new(buf);
        match read_frame(&mut cursor).unwrap() {
            ReadOutcome::Frame(Frame::Multicast(decoded)) => {
                assert_eq!(decoded.previous_entry_kind, None);
                assert_eq!(decoded.previous_timestamp, None);
            },
            _ => panic!("expected a decoded multicast frame"),
        }
    }

    #[test]
    fn eof_sentinel_is_recognized() {
        let mut buf = Vec::new();
        write_eof_sentinel(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        assert!(matches!(read_frame(&mut cursor).unwrap(), ReadOutcome::Eof));
    }

    #[test]
    fn truncated_stream_is_reported() {
        let common = EntryCommon::new(sample_timestamp(), Level::unfiltered(LogLevel::Info));
        let entry = LogEntry::new(common, EntryBody::Line);
        let mut buf = Vec::new();
        write_frame(&mut buf, &Frame::Unicast(entry)).unwrap();
        buf.truncate(buf.len() - 2);
        let mut cursor = Cursor::new(buf);
        let err = read_frame(&mut cursor).unwrap_err();
        assert!(err.is_truncation());
    }

    #[test]
    fn truncated_right_at_entry_boundary_is_also_reported() {
        let mut buf = Vec::new();
        write_stream_version(&mut buf, CURRENT_STREAM_VERSION).unwrap();
        // No entries, no sentinel: the file just stops.
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let err = read_frame(&mut cursor).unwrap_err();
        assert!(err.is_truncation());
    }

    #[test]
    fn header_roundtrips() {
        let mut buf = Vec::new();
        write_stream_version(&mut buf, CURRENT_STREAM_VERSION).unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_stream_version(&mut cursor).unwrap(), CURRENT_STREAM_VERSION);
    }
}
