//! Bit-addressed network messages.
//!
//! Every message reserves bit 0 as the "is compressed" flag; application
//! payload starts at bit 1. [`OutgoingMessage`] constructors write the
//! default `false` flag so the compression layer can always rely on it.

pub mod bits;
mod incoming;
mod outgoing;

pub use bits::bytes_to_hold_bits;
pub use incoming::IncomingMessage;
pub use outgoing::OutgoingMessage;

use peerwire_common::{NetworkError, PeerwireError};
use thiserror::Error;

/// Errors raised by message bit access
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("read of {requested} bits at position {position} exceeds message length of {bit_length} bits")]
    ReadPastEnd {
        requested: usize,
        position: usize,
        bit_length: usize,
    },

    #[error("bit length {bit_length} exceeds buffer of {buffer_bytes} bytes")]
    LengthExceedsBuffer { bit_length: usize, buffer_bytes: usize },
}

impl From<MessageError> for PeerwireError {
    fn from(err: MessageError) -> Self {
        PeerwireError::Network(NetworkError::MalformedMessage(err.to_string()))
    }
}
