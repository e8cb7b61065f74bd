use activity_log_model::{
    LogEntry,
    MulticastEntry,
};

/// A single on-wire record: either a unicast entry (as written by a producer
/// talking directly to a single sink, e.g. the pipe protocol in spec.md
/// §4.9) or a multicast entry (as written by the dispatcher's file sinks,
/// where many monitors interleave into one stream).
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Unicast(LogEntry),
    Multicast(MulticastEntry),
}

/// The trailing byte that marks a gracefully closed stream. Entry tag bytes
/// are always non-zero (the variant nibble starts at 1), so this can never
/// collide with the start of a real entry.
pub const EOF_SENTINEL: u8 = 0x00;
