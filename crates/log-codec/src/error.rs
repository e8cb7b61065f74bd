use std::io;

/// Failures parsing or writing a framed entry. This is the *codec-error*
/// kind named in spec.md §7.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("i/o error reading or writing a frame")]
    Io(#[from] io::Error),

    #[error("unrecognized entry tag byte {0:#x}")]
    InvalidTagByte(u8),

    #[error("unrecognized log level discriminant {0}")]
    InvalidLevel(u8),

    #[error("unrecognized previous-entry-kind discriminant {0}")]
    InvalidEntryKind(u8),

    #[error("string field was not valid utf-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("varint exceeded the maximum supported width")]
    VarintTooLong,
}

impl CodecError {
    /// True if this failure is the stream simply ending mid-field rather
    /// than at a clean entry boundary — spec.md §4.5's `bad-end-of-file`,
    /// as opposed to a genuinely malformed entry.
    pub fn is_truncation(&self) -> bool {
        matches!(self, CodecError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

pub type CodecResult<T> = Result<T, CodecError>;
