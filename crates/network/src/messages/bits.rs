//! Bit addressing shared by outgoing and incoming messages.
//!
//! Bit `n` of a message lives in byte `n / 8` at mask `0x80 >> (n % 8)`,
//! i.e. most significant bit first. Multi-bit fields are stored most
//! significant bit first as well.

/// Number of bytes needed to hold `bits` bits.
#[inline]
pub const fn bytes_to_hold_bits(bits: usize) -> usize {
    (bits + 7) / 8
}

#[inline]
fn mask(bit: usize) -> u8 {
    0x80 >> (bit % 8)
}

/// Writes the low `width` bits of `value` starting at `bit_offset`.
///
/// The caller guarantees `buf` holds `bit_offset + width` bits.
pub(crate) fn write_bits(buf: &mut [u8], bit_offset: usize, value: u32, width: u32) {
    for i in 0..width {
        let bit = bit_offset + i as usize;
        if (value >> (width - 1 - i)) & 1 == 1 {
            buf[bit / 8] |= mask(bit);
        } else {
            buf[bit / 8] &= !mask(bit);
        }
    }
}

/// Reads `width` bits starting at `bit_offset`.
///
/// The caller guarantees `buf` holds `bit_offset + width` bits.
pub(crate) fn read_bits(buf: &[u8], bit_offset: usize, width: u32) -> u32 {
    let mut value = 0u32;
    for i in 0..width as usize {
        let bit = bit_offset + i;
        value = (value << 1) | u32::from(buf[bit / 8] & mask(bit) != 0);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_hold_bits() {
        assert_eq!(bytes_to_hold_bits(0), 0);
        assert_eq!(bytes_to_hold_bits(1), 1);
        assert_eq!(bytes_to_hold_bits(8), 1);
        assert_eq!(bytes_to_hold_bits(9), 2);
        assert_eq!(bytes_to_hold_bits((1 << 23) - 1), 1 << 20);
    }

    #[test]
    fn test_msb_first_layout() {
        let mut buf = [0u8; 3];
        write_bits(&mut buf, 0, 1, 1);
        write_bits(&mut buf, 1, 0x12345, 23);
        assert_eq!(buf, [0x81, 0x23, 0x45]);
        assert_eq!(read_bits(&buf, 1, 23), 0x12345);
    }

    #[test]
    fn test_unaligned_overwrite_clears_stale_bits() {
        let mut buf = [0xFFu8; 2];
        write_bits(&mut buf, 3, 0, 6);
        assert_eq!(buf, [0b1110_0000, 0b0111_1111]);
        assert_eq!(read_bits(&buf, 3, 6), 0);
        assert_eq!(read_bits(&buf, 0, 3), 0b111);
    }
}
