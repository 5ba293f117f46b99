//! Bit-level field extraction and insertion.
//!
//! Fields are addressed by bit offset from the start of an instruction and
//! stored little-endian. A field may straddle byte boundaries; only the
//! minimal covering byte span is read before shifting and masking.

// Sign extension below relies on `>>` being arithmetic for signed integers.
const _: () = assert!((-8i64 >> 1) == -4 && (i64::MIN >> 63) == -1);

/// Read an unsigned field of `width` bits (1..=64) starting at `bit_offset`.
///
/// Bytes past the end of `bytes` read as zero; callers that need a hard
/// bound check the instruction size before extracting fields.
pub fn read_bits(bytes: &[u8], bit_offset: u32, width: u32) -> u64 {
    debug_assert!((1..=64).contains(&width));
    let first = (bit_offset / 8) as usize;
    let last = ((bit_offset + width - 1) / 8) as usize;
    let shift = bit_offset % 8;

    // At most 9 bytes are covered (64-bit field at a non-zero bit position).
    let mut acc: u128 = 0;
    for (i, pos) in (first..=last).enumerate() {
        let byte = bytes.get(pos).copied().unwrap_or(0) as u128;
        acc |= byte << (i * 8);
    }
    let value = acc >> shift;
    (value & mask(width) as u128) as u64
}

/// Read a signed field, sign-extending from bit `width - 1`.
pub fn read_signed_bits(bytes: &[u8], bit_offset: u32, width: u32) -> i64 {
    sign_extend(read_bits(bytes, bit_offset, width), width)
}

/// Sign-extend the low `width` bits of `value`.
#[inline]
pub const fn sign_extend(value: u64, width: u32) -> i64 {
    let shift = 64 - width;
    ((value << shift) as i64) >> shift
}

/// Write the low `width` bits of `value` at `bit_offset`.
///
/// `bytes` must already be long enough to hold the field.
pub fn write_bits(bytes: &mut [u8], bit_offset: u32, width: u32, value: u64) {
    debug_assert!((1..=64).contains(&width));
    let m = mask(width);
    let value = value & m;
    for bit in 0..width {
        let pos = bit_offset + bit;
        let byte = (pos / 8) as usize;
        let shift = pos % 8;
        if (value >> bit) & 1 == 1 {
            bytes[byte] |= 1 << shift;
        } else {
            bytes[byte] &= !(1 << shift);
        }
    }
}

/// Whether `value` survives a round trip through a signed `width`-bit field.
pub const fn fits_signed(value: i64, width: u32) -> bool {
    width >= 64 || sign_extend(value as u64 & mask(width), width) == value
}

/// Whether `value` fits an unsigned `width`-bit field.
pub const fn fits_unsigned(value: u64, width: u32) -> bool {
    width >= 64 || value <= mask(width)
}

#[inline]
const fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}
