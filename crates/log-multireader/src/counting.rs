use std::io::{self, Read};

/// Wraps any `Read` and tracks the total number of bytes yielded so far, so
/// callers can record the byte offset of an entry's tag byte without the
/// underlying stream needing to support `Seek` (it may be a gzip decoder).
pub struct CountingReader<R> {
    inner: R,
    position: u64,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    pub fn position(&self) -> u64 {
        self.position
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

/// Discards exactly `n` bytes from `r`, the way a seek into a possibly
/// gzip-wrapped stream has to: there is no random access, only skip-by-read.
pub fn skip_bytes<R: Read>(r: &mut R, n: u64) -> io::Result<()> {
    io::copy(&mut r.take(n), &mut io::sink())?;
    Ok(())
}
