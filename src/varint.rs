use std::io::{Read, Write};

use crate::error::{Error, Result};

// decoded as unsigned LEB128, not zig-zag; the delta stream reinterprets
// the u64 as a two's-complement i64 itself
pub fn read_varint<R: Read>(reader: &mut R) -> Result<u64> {
    leb128::read::unsigned(reader).map_err(|err| match err {
        leb128::read::Error::IoError(_) => Error::Truncated,
        leb128::read::Error::Overflow => Error::VarintOverflow,
    })
}

pub fn write_varint<W: Write>(writer: &mut W, value: u64) -> std::io::Result<()> {
    leb128::write::unsigned(writer, value)?;
    Ok(())
}
