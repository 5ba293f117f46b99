use crate::error::{Error, Result};

/// Decode an unsigned LEB128 value from `data` starting at `offset`.
/// Returns (value, bytes_consumed).
pub fn decode_uleb128(data: &[u8], offset: usize) -> Result<(u64, usize)> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    let mut pos = offset;

    loop {
        let Some(&byte) = data.get(pos) else {
            return Err(Error::InvalidLeb128(offset));
        };
        pos += 1;

        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok((result, pos - offset));
        }
        shift += 7;
        if shift >= 64 {
            return Err(Error::InvalidLeb128(offset));
        }
    }
}

/// Decode an unsigned LEB128 value that must fit in 32 bits.
pub fn decode_uleb128_u32(data: &[u8], offset: usize) -> Result<(u32, usize)> {
    let (value, consumed) = decode_uleb128(data, offset)?;
    let value = u32::try_from(value).map_err(|_| Error::InvalidLeb128(offset))?;
    Ok((value, consumed))
}

/// Append the unsigned LEB128 encoding of `value` to `out`.
pub fn encode_uleb128(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}
