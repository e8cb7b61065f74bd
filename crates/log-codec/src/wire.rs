use std::io::{
    Read,
    Write,
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
};
use chrono::{
    DateTime,
    TimeZone,
    Utc,
};
use uuid::Uuid;

use crate::{
    error::{
        CodecError,
        CodecResult,
    },
    frame::{
        Frame,
        EOF_SENTINEL,
    },
    varint::{
        read_uvarint,
        write_uvarint,
    },
};

const VARIANT_UNICAST_LINE: u8 = 1;
const VARIANT_UNICAST_OPEN: u8 = 2;
const VARIANT_UNICAST_CLOSE: u8 = 3;
const VARIANT_MULTICAST_LINE: u8 = 4;
const VARIANT_MULTICAST_OPEN: u8 = 5;
const VARIANT_MULTICAST_CLOSE: u8 = 6;

const PRESENT_TEXT: u8 = 0x1;
const PRESENT_TAGS: u8 = 0x2;
const PRESENT_FILE_LINE: u8 = 0x4;
const PRESENT_EXCEPTION: u8 = 0x8;

// Sub-flags inside the `file`/`line` block's own presence byte, independent
// of the outer nibble (which only says "at least one of the two is set").
const PRESENT_FILE: u8 = 0x1;
const PRESENT_LINE: u8 = 0x2;

const PREV_KIND_LINE: u8 = 0;
const PREV_KIND_OPEN: u8 = 1;
const PREV_KIND_CLOSE: u8 = 2;
const PREV_KIND_NONE: u8 = 3;

/// What a single framed read produced.
pub enum ReadOutcome {
    /// A fully-parsed entry.
    Frame(Frame),
    /// The graceful end-of-file sentinel was read.
    Eof,
}

pub fn write_frame<W: Write>(w: &mut W, frame: &Frame) -> CodecResult<()> {
    match frame {
        Frame::Unicast(entry) => write_unicast(w, entry),
        Frame::Multicast(entry) => write_multicast(w, entry),
    }
}

/// Writes the single trailing sentinel byte. Must be called exactly once, at
/// graceful close.
pub fn write_eof_sentinel<W: Write>(w: &mut W) -> CodecResult<()> {
    w.write_all(&[EOF_SENTINEL])?;
    Ok(())
}

/// Reads one frame. A read that fails because the underlying stream ended
/// mid-field (as opposed to at a clean entry boundary with the sentinel byte)
/// surfaces as `CodecError::Io` with `ErrorKind::UnexpectedEof` — callers
/// that care about spec.md's `bad-end-of-file` distinction (currently
/// `activity-log-reader`) match on that kind rather than treating it as a
/// generic corruption.
pub fn read_frame<R: Read>(r: &mut R) -> CodecResult<ReadOutcome> {
    let mut tag_byte = [0u8; 1];
    r.read_exact(&mut tag_byte)?;
    let tag = tag_byte[0];
    if tag == EOF_SENTINEL {
        return Ok(ReadOutcome::Eof);
    }
    let variant = tag >> 4;
    let present = tag & 0x0f;

    let frame = match variant {
        VARIANT_UNICAST_LINE => Frame::Unicast(LogEntry::new(
            read_common(r, present)?,
            EntryBody::Line,
        )),
        VARIANT_UNICAST_OPEN => Frame::Unicast(LogEntry::new(
            read_common(r, present)?,
            EntryBody::OpenGroup,
        )),
        VARIANT_UNICAST_CLOSE => {
            let common = read_common(r, present)?;
            let conclusions = read_conclusions(r)?;
            Frame::Unicast(LogEntry::new(common, EntryBody::CloseGroup { conclusions }))
        },
        VARIANT_MULTICAST_LINE | VARIANT_MULTICAST_OPEN | VARIANT_MULTICAST_CLOSE => {
            let (monitor_id, previous_entry_kind, previous_timestamp, group_depth_at_entry) =
                read_multicast_prefix(r)?;
            let common = read_common(r, present)?;
            let body = match variant {
                VARIANT_MULTICAST_LINE => EntryBody::Line,
                VARIANT_MULTICAST_OPEN => EntryBody::OpenGroup,
                _ => EntryBody::CloseGroup {
                    conclusions: read_conclusions(r)?,
                },
            };
            Frame::Multicast(MulticastEntry {
                monitor_id,
                group_depth_at_entry,
                previous_timestamp,
                previous_entry_kind,
                entry: LogEntry::new(common, body),
            })
        },
        other => return Err(CodecError::InvalidTagByte((other << 4) | present)),
    };
    Ok(ReadOutcome::Frame(frame))
}

fn write_unicast<W: Write>(w: &mut W, entry: &LogEntry) -> CodecResult<()> {
    let variant = match entry.body {
        EntryBody::Line => VARIANT_UNICAST_LINE,
        EntryBody::OpenGroup => VARIANT_UNICAST_OPEN,
        EntryBody::CloseGroup { .. } => VARIANT_UNICAST_CLOSE,
    };
    let present = present_bits(&entry.common);
    w.write_all(&[(variant << 4) | present])?;
    write_common(w, &entry.common)?;
    if let EntryBody::CloseGroup { conclusions } = &entry.body {
        write_conclusions(w, conclusions)?;
    }
    Ok(())
}

fn write_multicast<W: Write>(w: &mut W, entry: &MulticastEntry) -> CodecResult<()> {
    let variant = match entry.entry.body {
        EntryBody::Line => VARIANT_MULTICAST_LINE,
        EntryBody::OpenGroup => VARIANT_MULTICAST_OPEN,
        EntryBody::CloseGroup { .. } => VARIANT_MULTICAST_CLOSE,
    };
    let present = present_bits(&entry.entry.common);
    w.write_all(&[(variant << 4) | present])?;
    write_multicast_prefix(
        w,
        entry.monitor_id,
        entry.previous_entry_kind,
        entry.previous_timestamp,
        entry.group_depth_at_entry,
    )?;
    write_common(w, &entry.entry.common)?;
    if let EntryBody::CloseGroup { conclusions } = &entry.entry.body {
        write_conclusions(w, conclusions)?;
    }
    Ok(())
}

fn present_bits(common: &EntryCommon) -> u8 {
    let mut bits = 0;
    if common.text.is_some() {
        bits |= PRESENT_TEXT;
    }
    if common.tags.is_some() {
        bits |= PRESENT_TAGS;
    }
    if common.file.is_some() || common.line.is_some() {
        bits |= PRESENT_FILE_LINE;
    }
    if common.exception.is_some() {
        bits |= PRESENT_EXCEPTION;
    }
    bits
}

fn write_multicast_prefix<W: Write>(
    w: &mut W,
    monitor_id: Uuid,
    previous_entry_kind: Option<EntryKind>,
    previous_timestamp: Option<Timestamp>,
    group_depth_at_entry: u32,
) -> CodecResult<()> {
    w.write_all(monitor_id.as_bytes())?;
    let kind_byte = match previous_entry_kind {
        Some(EntryKind::Line) => PREV_KIND_LINE,
        Some(EntryKind::OpenGroup) => PREV_KIND_OPEN,
        Some(EntryKind::CloseGroup) => PREV_KIND_CLOSE,
        None => PREV_KIND_NONE,
    };
    w.write_all(&[kind_byte])?;
    write_timestamp(w, previous_timestamp.unwrap_or(Timestamp::new(epoch(), 0)))?;
    write_uvarint(w, u64::from(group_depth_at_entry))?;
    Ok(())
}

fn read_multicast_prefix<R: Read>(
    r: &mut R,
) -> CodecResult<(Uuid, Option<EntryKind>, Option<Timestamp>, u32)> {
    let mut id_bytes = [0u8; 16];
    r.read_exact(&mut id_bytes)?;
    let monitor_id = Uuid::from_bytes(id_bytes);

    let mut kind_byte = [0u8; 1];
    r.read_exact(&mut kind_byte)?;
    let previous_entry_kind = match kind_byte[0] {
        PREV_KIND_LINE => Some(EntryKind::Line),
        PREV_KIND_OPEN => Some(EntryKind::OpenGroup),
        PREV_KIND_CLOSE => Some(EntryKind::CloseGroup),
        PREV_KIND_NONE => None,
        other => return Err(CodecError::InvalidEntryKind(other)),
    };
    let previous_timestamp_raw = read_timestamp(r)?;
    let previous_timestamp = previous_entry_kind.map(|_| previous_timestamp_raw);

    let group_depth_at_entry = read_uvarint(r)?.try_into().unwrap_or(u32::MAX);
    Ok((
        monitor_id,
        previous_entry_kind,
        previous_timestamp,
        group_depth_at_entry,
    ))
}

fn write_common<W: Write>(w: &mut W, common: &EntryCommon) -> CodecResult<()> {
    write_timestamp(w, common.timestamp)?;
    write_level(w, common.level)?;
    if let Some(text) = &common.text {
        write_string(w, text)?;
    }
    if let Some(tags) = &common.tags {
        write_string(w, &tags.canonical())?;
    }
    if common.file.is_some() || common.line.is_some() {
        let mut sub_present = 0u8;
        if common.file.is_some() {
            sub_present |= PRESENT_FILE;
        }
        if common.line.is_some() {
            sub_present |= PRESENT_LINE;
        }
        w.write_all(&[sub_present])?;
        if let Some(file) = &common.file {
            write_string(w, file)?;
        }
        if let Some(line) = common.line {
            w.write_all(&line.to_le_bytes())?;
        }
    }
    if let Some(exception) = &common.exception {
        w.write_all(&[1])?;
        write_exception(w, exception)?;
    }
    Ok(())
}

fn read_common<R: Read>(r: &mut R, present: u8) -> CodecResult<EntryCommon> {
    let timestamp = read_timestamp(r)?;
    let level = read_level(r)?;
    let text = if present & PRESENT_TEXT != 0 {
        Some(read_string(r)?)
    } else {
        None
    };
    let tags = if present & PRESENT_TAGS != 0 {
        Some(TagSet::from_canonical(&read_string(r)?))
    } else {
        None
    };
    let (file, line) = if present & PRESENT_FILE_LINE != 0 {
        let mut sub_present = [0u8; 1];
        r.read_exact(&mut sub_present)?;
        let file = if sub_present[0] & PRESENT_FILE != 0 {
            Some(read_string(r)?)
        } else {
            None
        };
        let line = if sub_present[0] & PRESENT_LINE != 0 {
            let mut line_bytes = [0u8; 4];
            r.read_exact(&mut line_bytes)?;
            Some(u32::from_le_bytes(line_bytes))
        } else {
            None
        };
        (file, line)
    } else {
        (None, None)
    };
    let exception = if present & PRESENT_EXCEPTION != 0 {
        let mut present_byte = [0u8; 1];
        r.read_exact(&mut present_byte)?;
        Some(read_exception(r)?)
    } else {
        None
    };
    Ok(EntryCommon {
        timestamp,
        level,
        text,
        tags,
        file,
        line,
        exception,
    })
}

fn write_timestamp<W: Write>(w: &mut W, ts: Timestamp) -> CodecResult<()> {
    let millis = ts.instant.timestamp_millis();
    w.write_all(&millis.to_le_bytes())?;
    w.write_all(&[ts.uniquifier])?;
    Ok(())
}

fn read_timestamp<R: Read>(r: &mut R) -> CodecResult<Timestamp> {
    let mut millis_bytes = [0u8; 8];
    r.read_exact(&mut millis_bytes)?;
    let millis = i64::from_le_bytes(millis_bytes);
    let mut uniquifier = [0u8; 1];
    r.read_exact(&mut uniquifier)?;
    let instant = Utc
        .timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(epoch);
    Ok(Timestamp::new(instant, uniquifier[0]))
}

fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().expect("unix epoch is representable")
}

fn write_level<W: Write>(w: &mut W, level: Level) -> CodecResult<()> {
    w.write_all(&[level.level.tag(), u8::from(level.is_filtered)])?;
    Ok(())
}

fn read_level<R: Read>(r: &mut R) -> CodecResult<Level> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    let level = LogLevel::from_tag(buf[0]).ok_or(CodecError::InvalidLevel(buf[0]))?;
    Ok(Level::new(level, buf[1] != 0))
}

fn write_string<W: Write>(w: &mut W, s: &str) -> CodecResult<()> {
    let bytes = s.as_bytes();
    w.write_all(&(bytes.len() as u32).to_le_bytes())?;
    w.write_all(bytes)?;
    Ok(())
}

fn read_string<R: Read>(r: &mut R) -> CodecResult<String> {
    let mut len_bytes = [0u8; 4];
    r.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}

fn write_conclusions<W: Write>(w: &mut W, conclusions: &[String]) -> CodecResult<()> {
    write_uvarint(w, conclusions.len() as u64)?;
    for conclusion in conclusions {
        write_string(w, conclusion)?;
    }
    Ok(())
}

fn read_conclusions<R: Read>(r: &mut R) -> CodecResult<Vec<String>> {
    let count = read_uvarint(r)?;
    let mut conclusions = Vec::with_capacity(count.min(1 << 16) as usize);
    for _ in 0..count {
        conclusions.push(read_string(r)?);
    }
    Ok(conclusions)
}

fn write_exception<W: Write>(w: &mut W, exc: &ExceptionData) -> CodecResult<()> {
    write_string(w, &exc.message)?;
    write_string(w, &exc.type_name)?;
    write_string(w, &exc.stack_text)?;

    match &exc.inner {
        Some(inner) => {
            w.write_all(&[1])?;
            write_exception(w, inner)?;
        },
        None => w.write_all(&[0])?,
    }

    let aggregated = exc.aggregated_inner.as_deref().unwrap_or(&[]);
    write_uvarint(w, aggregated.len() as u64)?;
    for inner in aggregated {
        write_exception(w, inner)?;
    }

    let loader = exc.loader_exceptions.as_deref().unwrap_or(&[]);
    write_uvarint(w, loader.len() as u64)?;
    for inner in loader {
        write_exception(w, inner)?;
    }

    match &exc.fusion_log {
        Some(log) => {
            w.write_all(&[1])?;
            write_string(w, log)?;
        },
        None => w.write_all(&[0])?,
    }
    Ok(())
}

fn read_exception<R: Read>(r: &mut R) -> CodecResult<ExceptionData> {
    let message = read_string(r)?;
    let type_name = read_string(r)?;
    let stack_text = read_string(r)?;

    let mut has_inner = [0u8; 1];
    r.read_exact(&mut has_inner)?;
    let inner = if has_inner[0] != 0 {
        Some(Box::new(read_exception(r)?))
    } else {
        None
    };

    let aggregated_count = read_uvarint(r)?;
    let aggregated_inner = if aggregated_count > 0 {
        let mut v = Vec::with_capacity(aggregated_count.min(1 << 16) as usize);
        for _ in 0..aggregated_count {
            v.push(read_exception(r)?);
        }
        Some(v)
    } else {
        None
    };

    let loader_count = read_uvarint(r)?;
    let loader_exceptions = if loader_count > 0 {
        let mut v = Vec::with_capacity(loader_count.min(1 << 16) as usize);
        for _ in 0..loader_count {
            v.push(read_exception(r)?);
        }
        Some(v)
    } else {
        None
    };

    let mut has_fusion_log = [0u8; 1];
    r.read_exact(&mut has_fusion_log)?;
    let fusion_log = if has_fusion_log[0] != 0 {
        Some(read_string(r)?)
    } else {
        None
    };

    Ok(ExceptionData {
        message,
        type_name,
        stack_text,
        inner,
        aggregated_inner,
        loader_exceptions,
        fusion_log,
    })
}
