//! A sequential forward iterator over one activity-log file (spec.md §4.5).
//!
//! States: `Fresh` (header read, nothing parsed yet) -> `Reading` (at least
//! one entry parsed) -> `End` (graceful EOF sentinel, or a truncated tail) |
//! `Corrupt` (a malformed entry was encountered). Once `End` or `Corrupt` is
//! reached, `move_next` keeps returning `false`; entries parsed before that
//! point remain available via `current` while iterating.

use std::{
    fs::File,
    io::Read,
    path::Path,
};

use activity_log_codec::{
    self as codec,
    CodecError,
    Frame,
    ReadOutcome,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Fresh,
    Reading,
    End,
    Corrupt,
}

pub struct LogReader<R> {
    inner: R,
    state: ReaderState,
    current: Option<Frame>,
    bad_end_of_file: bool,
    read_exception: Option<CodecError>,
    stream_version: u32,
}

impl LogReader<Box<dyn Read>> {
    /// Opens `path` for sequential reading, transparently unwrapping gzip.
    pub fn open(path: &Path) -> Result<Self, CodecError> {
        let reader = codec::open_reader(path)?;
        Self::new(reader)
    }
}

impl<R: Read> LogReader<R> {
    pub fn new(mut inner: R) -> Result<Self, CodecError> {
        let stream_version = codec::read_stream_version(&mut inner)?;
        Ok(Self {
            inner,
            state: ReaderState::Fresh,
            current: None,
            bad_end_of_file: false,
            read_exception: None,
            stream_version,
        })
    }

    pub fn stream_version(&self) -> u32 {
        self.stream_version
    }

    /// Advances to the next entry. Returns `false` once `End` or `Corrupt`
    /// has been reached; check `bad_end_of_file`/`read_exception` to tell
    /// those two apart.
    pub fn move_next(&mut self) -> bool {
        if matches!(self.state, ReaderState::End | ReaderState::Corrupt) {
            return false;
        }
        match codec::read_frame(&mut self.inner) {
            Ok(ReadOutcome::Frame(frame)) => {
                self.current = Some(frame);
                self.state = ReaderState::Reading;
                true
            },
            Ok(ReadOutcome::Eof) => {
                self.current = None;
                self.state = ReaderState::End;
                false
            },
            Err(e) if e.is_truncation() => {
                self.bad_end_of_file = true;
                self.current = None;
                self.state = ReaderState::End;
                false
            },
            Err(e) => {
                self.read_exception = Some(e);
                self.current = None;
                self.state = ReaderState::Corrupt;
                false
            },
        }
    }

    pub fn current(&self) -> Option<&Frame> {
        self.current.as_ref()
    }

    /// True once EOF was reached without the sentinel byte (a truncated
    /// tail), false on a graceful close or before EOF is reached.
    pub fn bad_end_of_file(&self) -> bool {
        self.bad_end_of_file
    }

    /// The captured parse error, if `move_next` ever hit a malformed entry.
    pub fn read_exception(&self) -> Option<&CodecError> {
        self.read_exception.as_ref()
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self.state, ReaderState::Corrupt)
    }

    /// Drains the remaining entries into a `Vec`, stopping at `End` or
    /// `Corrupt` the same way `move_next` does.
    pub fn read_all(&mut self) -> Vec<Frame> {
        let mut out = Vec::new();
        while self.move_next() {
            if let Some(frame) = self.current.take() {
                out.push(frame);
            }
        }
        out
    }
}

impl LogReader<File> {
    pub fn open_raw(path: &Path) -> Result<Self, CodecError> {
        Self::new(File::open(path)?)
    }
}
