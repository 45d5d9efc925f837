use std::mem;

use super::bits::{bytes_to_hold_bits, read_bits};
use super::MessageError;

/// A received message read sequentially through a bit cursor.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    data: Vec<u8>,
    bit_length: usize,
    position: usize,
}

impl IncomingMessage {
    /// Wrap a received buffer holding `bit_length` significant bits.
    pub fn new(data: Vec<u8>, bit_length: usize) -> Result<Self, MessageError> {
        if bit_length > data.len() * 8 {
            return Err(MessageError::LengthExceedsBuffer {
                bit_length,
                buffer_bytes: data.len(),
            });
        }
        Ok(Self::from_parts(data, bit_length))
    }

    /// Copy a received datagram; every byte is significant.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_parts(bytes.to_vec(), bytes.len() * 8)
    }

    pub(crate) fn from_parts(data: Vec<u8>, bit_length: usize) -> Self {
        Self { data, bit_length, position: 0 }
    }

    pub fn bit_length(&self) -> usize {
        self.bit_length
    }

    pub fn byte_length(&self) -> usize {
        bytes_to_hold_bits(self.bit_length)
    }

    /// The significant bytes of the message.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.byte_length()]
    }

    /// Current read cursor, in bits.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, bit: usize) {
        self.position = bit;
    }

    pub fn remaining_bits(&self) -> usize {
        self.bit_length.saturating_sub(self.position)
    }

    pub fn read_bit(&mut self) -> Result<bool, MessageError> {
        Ok(self.read_uint(1)? == 1)
    }

    pub fn read_bool(&mut self) -> Result<bool, MessageError> {
        self.read_bit()
    }

    /// Read a `bits`-wide unsigned field, most significant bit first.
    ///
    /// # Panics
    ///
    /// Panics if `bits` is not in `1..=32`.
    pub fn read_uint(&mut self, bits: u32) -> Result<u32, MessageError> {
        assert!((1..=32).contains(&bits), "bit width must be 1..=32, got {bits}");
        self.check_remaining(bits as usize)?;
        let value = read_bits(&self.data, self.position, bits);
        self.position += bits as usize;
        Ok(value)
    }

    pub fn read_u8(&mut self) -> Result<u8, MessageError> {
        Ok(self.read_uint(8)? as u8)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, MessageError> {
        self.check_remaining(count * 8)?;
        if self.position % 8 == 0 {
            let start = self.position / 8;
            self.position += count * 8;
            return Ok(self.data[start..start + count].to_vec());
        }
        (0..count).map(|_| self.read_u8()).collect()
    }

    /// Swap in a new buffer carrying `bit_length` significant bits and hand
    /// back the previous one. The cursor is rewound to 0.
    ///
    /// `bit_length` is clamped to what `data` can hold.
    pub fn replace_buffer(&mut self, data: Vec<u8>, bit_length: usize) -> Vec<u8> {
        debug_assert!(bit_length <= data.len() * 8, "bit length exceeds new buffer");
        self.bit_length = bit_length.min(data.len() * 8);
        self.position = 0;
        mem::replace(&mut self.data, data)
    }

    /// Consume the message, returning its buffer.
    pub fn into_buffer(self) -> Vec<u8> {
        self.data
    }

    fn check_remaining(&self, requested: usize) -> Result<(), MessageError> {
        if requested > self.remaining_bits() {
            return Err(MessageError::ReadPastEnd {
                requested,
                position: self.position,
                bit_length: self.bit_length,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::OutgoingMessage;

    #[test]
    fn test_reads_mirror_writes() {
        let mut out = OutgoingMessage::new();
        out.write_uint(5, 3);
        out.write_bytes(b"hi");
        out.write_bool(true);

        let mut msg = out.into_incoming();
        assert_eq!(msg.bit_length(), 1 + 3 + 16 + 1);
        assert!(!msg.read_bool().unwrap());
        assert_eq!(msg.read_uint(3).unwrap(), 5);
        assert_eq!(msg.read_bytes(2).unwrap(), b"hi".to_vec());
        assert!(msg.read_bit().unwrap());
        assert_eq!(msg.remaining_bits(), 0);
    }

    #[test]
    fn test_read_past_end() {
        let mut msg = IncomingMessage::new(vec![0xFF], 3).unwrap();
        assert_eq!(msg.read_uint(2).unwrap(), 0b11);
        let err = msg.read_uint(2).unwrap_err();
        assert_eq!(
            err,
            MessageError::ReadPastEnd { requested: 2, position: 2, bit_length: 3 }
        );
        // a failed read does not move the cursor
        assert_eq!(msg.position(), 2);
    }

    #[test]
    fn test_new_rejects_oversized_length() {
        let err = IncomingMessage::new(vec![0; 2], 17).unwrap_err();
        assert_eq!(err, MessageError::LengthExceedsBuffer { bit_length: 17, buffer_bytes: 2 });
    }

    #[test]
    fn test_replace_buffer_rewinds_cursor() {
        let mut msg = IncomingMessage::from_bytes(&[1, 2, 3]);
        msg.read_u8().unwrap();

        let old = msg.replace_buffer(vec![7; 4], 30);
        assert_eq!(old, vec![1, 2, 3]);
        assert_eq!(msg.position(), 0);
        assert_eq!(msg.byte_length(), 4);
    }
}
