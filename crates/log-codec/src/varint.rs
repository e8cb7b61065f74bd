use std::io::{
    Read,
    Write,
};

use crate::error::{
    CodecError,
    CodecResult,
};

/// Unsigned LEB128. Used for the multicast group-depth field and the
/// close-group conclusion count, both of which are small in the overwhelming
/// common case but unbounded in principle.
pub fn write_uvarint<W: Write>(w: &mut W, mut value: u64) -> CodecResult<()> {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        w.write_all(&[byte])?;
        if value == 0 {
            break;
        }
    }
    Ok(())
}

pub fn read_uvarint<R: Read>(r: &mut R) -> CodecResult<u64> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    loop {
        if shift >= 64 {
            return Err(CodecError::VarintTooLong);
        }
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)?;
        let byte = byte[0];
        result |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok(result)
}
