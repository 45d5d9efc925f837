use std::mem;

use super::bits::{bytes_to_hold_bits, read_bits, write_bits};
use super::IncomingMessage;
use crate::pool::{BufferPool, PoolError};

/// Initial buffer size for messages created without a size hint
const DEFAULT_CAPACITY: usize = 16;

/// A message being written for sending.
///
/// The bit length doubles as the write pointer. A freshly constructed
/// message already holds the reserved `false` compression flag at bit 0.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    data: Vec<u8>,
    bit_length: usize,
}

impl OutgoingMessage {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self::from_buffer(vec![0; bytes.max(1)])
    }

    /// Create a message whose initial buffer is taken from `pool`.
    pub fn from_pool<P: BufferPool + ?Sized>(pool: &P, bytes: usize) -> Result<Self, PoolError> {
        let buffer = pool.acquire(bytes.max(1))?;
        Ok(Self::from_buffer(buffer))
    }

    fn from_buffer(data: Vec<u8>) -> Self {
        let mut msg = Self { data, bit_length: 0 };
        msg.write_bool(false);
        msg
    }

    /// Number of significant bits.
    pub fn bit_length(&self) -> usize {
        self.bit_length
    }

    /// Number of bytes needed to carry the significant bits.
    pub fn byte_length(&self) -> usize {
        bytes_to_hold_bits(self.bit_length)
    }

    /// Truncate or extend the message to exactly `bytes` bytes.
    pub fn set_byte_length(&mut self, bytes: usize) {
        self.set_bit_length(bytes * 8);
    }

    /// Truncate or extend the message to exactly `bits` bits. Bits added by
    /// extending read as zero.
    pub fn set_bit_length(&mut self, bits: usize) {
        if bits > self.bit_length {
            self.ensure_bits(bits);
            self.clear_bits(self.bit_length, bits);
        }
        self.bit_length = bits;
    }

    /// Allocated size of the underlying buffer.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// The significant bytes of the message.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.byte_length()]
    }

    /// Whether bit 0 marks the content as compressed.
    pub fn is_flagged_compressed(&self) -> bool {
        self.bit_length > 0 && read_bits(&self.data, 0, 1) == 1
    }

    pub fn write_bit(&mut self, bit: bool) {
        self.write_uint(u32::from(bit), 1);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_bit(value);
    }

    /// Append the low `bits` bits of `value`, most significant bit first.
    ///
    /// # Panics
    ///
    /// Panics if `bits` is not in `1..=32`.
    pub fn write_uint(&mut self, value: u32, bits: u32) {
        assert!((1..=32).contains(&bits), "bit width must be 1..=32, got {bits}");
        let end = self.bit_length + bits as usize;
        self.ensure_bits(end);
        write_bits(&mut self.data, self.bit_length, value, bits);
        self.bit_length = end;
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write_uint(u32::from(value), 8);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.bit_length % 8 == 0 {
            let start = self.bit_length / 8;
            self.ensure_bits(self.bit_length + bytes.len() * 8);
            self.data[start..start + bytes.len()].copy_from_slice(bytes);
            self.bit_length += bytes.len() * 8;
        } else {
            for &byte in bytes {
                self.write_u8(byte);
            }
        }
    }

    /// Swap in a new buffer carrying `bit_length` significant bits and
    /// hand back the previous one.
    ///
    /// `bit_length` is clamped to what `data` can hold.
    pub fn replace_buffer(&mut self, data: Vec<u8>, bit_length: usize) -> Vec<u8> {
        debug_assert!(bit_length <= data.len() * 8, "bit length exceeds new buffer");
        self.bit_length = bit_length.min(data.len() * 8);
        mem::replace(&mut self.data, data)
    }

    /// Consume the message, returning its buffer.
    pub fn into_buffer(self) -> Vec<u8> {
        self.data
    }

    /// Hand the finished byte stream to the receiving side, as a transport
    /// delivering exactly these bits would.
    pub fn into_incoming(self) -> IncomingMessage {
        IncomingMessage::from_parts(self.data, self.bit_length)
    }

    // Pooled buffers carry stale bytes past the written length.
    fn clear_bits(&mut self, from: usize, to: usize) {
        let mut bit = from;
        while bit < to && bit % 8 != 0 {
            write_bits(&mut self.data, bit, 0, 1);
            bit += 1;
        }
        if bit < to {
            let end = bytes_to_hold_bits(to);
            self.data[bit / 8..end].fill(0);
        }
    }

    fn ensure_bits(&mut self, bits: usize) {
        let needed = bytes_to_hold_bits(bits);
        if self.data.len() < needed {
            let grown = needed.max(self.data.len() * 2);
            self.data.resize(grown, 0);
        }
    }
}

impl Default for OutgoingMessage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::StoragePool;

    #[test]
    fn test_new_message_reserves_flag_bit() {
        let msg = OutgoingMessage::new();
        assert_eq!(msg.bit_length(), 1);
        assert_eq!(msg.byte_length(), 1);
        assert!(!msg.is_flagged_compressed());
    }

    #[test]
    fn test_writes_grow_buffer() {
        let mut msg = OutgoingMessage::with_capacity(1);
        msg.write_bytes(&[0xAB; 40]);
        assert_eq!(msg.bit_length(), 1 + 40 * 8);
        assert!(msg.capacity() >= msg.byte_length());
    }

    #[test]
    fn test_unaligned_bytes_follow_flag() {
        let mut msg = OutgoingMessage::new();
        msg.write_bytes(&[0xFF, 0x01]);
        // flag bit 0, then 0xFF shifted right by one bit, then 0x01
        assert_eq!(msg.data(), &[0x7F, 0x80, 0x80]);
    }

    #[test]
    fn test_from_pool_clears_stale_flag() {
        let pool = StoragePool::default();
        pool.release(vec![0xFF; 32]);

        let msg = OutgoingMessage::from_pool(&pool, 32).unwrap();
        assert_eq!(msg.capacity(), 32);
        assert!(!msg.is_flagged_compressed());
    }

    #[test]
    fn test_extending_pooled_buffer_reads_zeros() {
        let pool = StoragePool::default();
        pool.release(vec![0xFF; 8]);

        let mut msg = OutgoingMessage::from_pool(&pool, 8).unwrap();
        msg.write_uint(0b101, 3);
        msg.set_bit_length(40);
        assert_eq!(msg.bit_length(), 40);

        let mut incoming = msg.into_incoming();
        assert!(!incoming.read_bool().unwrap());
        assert_eq!(incoming.read_uint(3).unwrap(), 0b101);
        assert_eq!(incoming.read_uint(4).unwrap(), 0);
        assert_eq!(incoming.read_bytes(4).unwrap(), vec![0; 4]);
    }

    #[test]
    fn test_set_byte_length_truncates_then_extends() {
        let mut msg = OutgoingMessage::new();
        msg.write_bytes(&[0xAA, 0xBB, 0xCC]);

        msg.set_byte_length(2);
        assert_eq!(msg.bit_length(), 16);
        assert_eq!(msg.data(), &[0x55, 0x5D]);

        // the truncated tail must not reappear
        msg.set_byte_length(4);
        assert_eq!(msg.data(), &[0x55, 0x5D, 0x00, 0x00]);
    }

    #[test]
    fn test_replace_buffer_returns_previous() {
        let mut msg = OutgoingMessage::with_capacity(8);
        msg.write_u8(9);

        let old = msg.replace_buffer(vec![0x80, 0, 0, 0], 32);
        assert_eq!(old.len(), 8);
        assert_eq!(msg.byte_length(), 4);
        assert!(msg.is_flagged_compressed());
    }

    #[test]
    #[should_panic(expected = "bit width")]
    fn test_zero_width_write_panics() {
        OutgoingMessage::new().write_uint(0, 0);
    }
}
