use std::io::{
    Read,
    Write,
};

use crate::error::CodecResult;

/// The current stream format version. Bumped whenever the wire layout in
/// [`crate::wire`] changes incompatibly; readers don't reject unknown
/// versions (spec.md explicitly scopes schema evolution to "a monotonic
/// stream-version integer" and leaves interpretation to callers), they just
/// surface it via [`read_stream_version`].
pub const CURRENT_STREAM_VERSION: u32 = 1;

pub fn write_stream_version<W: Write>(w: &mut W, version: u32) -> CodecResult<()> {
    w.write_all(&version.to_le_bytes())?;
    Ok(())
}

pub fn read_stream_version<R: Read>(r: &mut R) -> CodecResult<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}
