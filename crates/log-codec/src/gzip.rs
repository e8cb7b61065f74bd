use std::{
    fs::File,
    io::{
        self,
        BufRead,
        BufReader,
        Read,
        Write,
    },
    path::Path,
};

use flate2::{
    bufread::MultiGzDecoder,
    write::GzEncoder,
    Compression,
};

/// The gzip magic bytes. Readers sniff these to decide whether to wrap a
/// file in a decoder, rather than trusting a file extension.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// The single compressor configuration this format commits to, so that
/// recompressing a raw file with the same parameters reproduces the gzip
/// file byte-for-byte (spec.md §8's gzip round-trip property). `GzEncoder`'s
/// plain constructor (as opposed to `GzBuilder`) emits a header with no
/// filename and a zero mtime, which is what makes the output deterministic
/// across runs.
pub fn compression_level() -> Compression {
    Compression::default()
}

pub fn gzip_writer<W: Write>(inner: W) -> GzEncoder<W> {
    GzEncoder::new(inner, compression_level())
}

fn sniff_gzip<R: BufRead>(reader: &mut R) -> io::Result<bool> {
    let buf = reader.fill_buf()?;
    Ok(buf.len() >= 2 && buf[0..2] == GZIP_MAGIC)
}

/// Opens `path` for sequential reading, transparently unwrapping gzip if the
/// file starts with the gzip magic bytes.
pub fn open_reader(path: &Path) -> io::Result<Box<dyn Read>> {
    let file = File::open(path)?;
    let mut buffered = BufReader::new(file);
    if sniff_gzip(&mut buffered)? {
        Ok(Box::new(MultiGzDecoder::new(buffered)))
    } else {
        Ok(Box::new(buffered))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn sniffs_gzip_magic() {
        let mut encoded = Vec::new();
        {
            let mut enc = gzip_writer(&mut encoded);
            enc.write_all(b"hello").unwrap();
            enc.finish().unwrap();
        }
        let mut reader = BufReader::new(Cursor::new(encoded));
        assert!(sniff_gzip(&mut reader).unwrap());
    }

    #[test]
    fn does_not_sniff_raw_bytes() {
        let mut reader = BufReader::new(Cursor::new(b"plain text".to_vec()));
        assert!(!sniff_gzip(&mut reader).unwrap());
    }

    #[test]
    fn recompressing_is_byte_identical() {
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(10);
        let mut first = Vec::new();
        {
            let mut enc = gzip_writer(&mut first);
            enc.write_all(&payload).unwrap();
            enc.finish().unwrap();
        }
        let mut second = Vec::new();
        {
            let mut enc = gzip_writer(&mut second);
            enc.write_all(&payload).unwrap();
            enc.finish().unwrap();
        }
        assert_eq!(first, second);
    }
}
