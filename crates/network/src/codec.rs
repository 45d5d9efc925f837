//! Transparent per-message compression.
//!
//! Wire format of a compressed message:
//! ```text
//! ┌──────┬───────────────────────────┬─────────────────────────┐
//! │ flag │ original bit length       │ compressed body         │
//! │ 1 b  │ 23 b, MSB first           │ bytes 3..               │
//! └──────┴───────────────────────────┴─────────────────────────┘
//! ```
//!
//! An uncompressed message only carries the `0` flag bit, followed directly
//! by the application payload. The compressed body is the whole original
//! message, flag bit included, so after decompression the reader skips bit
//! 0 exactly as it would for a message that was never compressed.

use std::sync::Arc;

use peerwire_common::{NetworkError, PeerwireError};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::compression::{build_compressor, ByteCompressor, CodecError};
use crate::config::CompressionConfig;
use crate::messages::{bytes_to_hold_bits, IncomingMessage, OutgoingMessage};
use crate::metrics::CompressionMetrics;
use crate::pool::{BufferPool, PoolError};

/// Compressed header size in bytes
pub const HEADER_LEN: usize = 3;

/// Compressed header size in bits
pub const HEADER_BITS: usize = HEADER_LEN * 8;

/// Width of the original bit length field
pub const LENGTH_BITS: u32 = (HEADER_BITS - 1) as u32;

/// Largest bit length the header can record
pub const MAX_LENGTH_BITS: usize = (1 << LENGTH_BITS) - 1;

/// Header of a compressed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    original_bit_length: u32,
}

impl FrameHeader {
    /// Returns `None` when `original_bit_length` does not fit in the header.
    pub fn new(original_bit_length: usize) -> Option<Self> {
        (original_bit_length <= MAX_LENGTH_BITS).then(|| Self {
            original_bit_length: original_bit_length as u32,
        })
    }

    pub fn original_bit_length(&self) -> usize {
        self.original_bit_length as usize
    }

    pub fn original_byte_length(&self) -> usize {
        bytes_to_hold_bits(self.original_bit_length())
    }

    /// The three header bytes: flag set, then the length field.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let word = (1u32 << LENGTH_BITS) | self.original_bit_length;
        let [_, b0, b1, b2] = word.to_be_bytes();
        [b0, b1, b2]
    }

    /// Parse a header from the start of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, CompressionError> {
        let [b0, b1, b2] = match bytes.get(..HEADER_LEN) {
            Some(&[b0, b1, b2]) => [b0, b1, b2],
            _ => return Err(CompressionError::TruncatedHeader { available_bits: bytes.len() * 8 }),
        };
        let word = u32::from_be_bytes([0, b0, b1, b2]);
        if word >> LENGTH_BITS == 0 {
            return Err(CompressionError::NotCompressed);
        }
        let original_bit_length = word & MAX_LENGTH_BITS as u32;
        if original_bit_length == 0 {
            return Err(CompressionError::ZeroLength);
        }
        Ok(Self { original_bit_length })
    }
}

/// Errors raised while compressing or decompressing a message
#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("message carries no flag bit")]
    Empty,

    #[error("compressed header truncated, only {available_bits} bits present")]
    TruncatedHeader { available_bits: usize },

    #[error("header flag bit is not set")]
    NotCompressed,

    #[error("compressed header declares a zero bit length")]
    ZeroLength,

    #[error("decompressed {actual} bytes, header declared {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("decompressed stream runs past the declared {expected} bytes")]
    LengthOverrun { expected: usize },

    #[error("compressed body rejected by {codec}: {source}")]
    Body {
        codec: &'static str,
        #[source]
        source: CodecError,
    },

    #[error("decompression must start at bit 0, cursor is at {position}")]
    CursorNotAtStart { position: usize },

    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl CompressionError {
    /// Whether the message itself is malformed and must be dropped.
    pub fn is_corrupt(&self) -> bool {
        !matches!(self, Self::CursorNotAtStart { .. } | Self::Pool(_))
    }
}

impl From<CompressionError> for PeerwireError {
    fn from(err: CompressionError) -> Self {
        let net = match err {
            CompressionError::Pool(pool) => return pool.into(),
            CompressionError::CursorNotAtStart { .. } => NetworkError::Protocol(err.to_string()),
            corrupt => NetworkError::MalformedMessage(corrupt.to_string()),
        };
        PeerwireError::Network(net)
    }
}

/// Why an outgoing message was left uncompressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    /// Too few bytes for the header to pay off
    TooShort,
    /// Bit length does not fit the header's length field
    TooLong,
    /// Compressed output did not fit the scratch buffer
    Overflow,
    /// Compressed output saved too little
    NoBenefit,
    CodecFailed,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::TooShort => "too_short",
            Self::TooLong => "too_long",
            Self::Overflow => "overflow",
            Self::NoBenefit => "no_benefit",
            Self::CodecFailed => "codec_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressOutcome {
    Applied { original_bytes: usize, compressed_bytes: usize },
    Skipped(SkipReason),
}

impl CompressOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecompressOutcome {
    NotCompressed,
    Decompressed { compressed_bytes: usize, original_bytes: usize },
}

impl DecompressOutcome {
    pub fn is_decompressed(&self) -> bool {
        matches!(self, Self::Decompressed { .. })
    }
}

/// Compression strategy applied to every message a peer sends or receives.
pub trait MessageCompression: Send + Sync {
    /// Replace the message content with a smaller compressed form.
    ///
    /// A skipped message is left exactly as it was. Only pool failures are
    /// reported as errors.
    fn try_compress(&self, msg: &mut OutgoingMessage) -> Result<CompressOutcome, CompressionError>;

    /// Restore a compressed message. The cursor must be at bit 0 and is left
    /// at bit 1, the first payload bit, on both `Ok` outcomes.
    fn try_decompress(&self, msg: &mut IncomingMessage) -> Result<DecompressOutcome, CompressionError>;
}

/// [`MessageCompression`] that exchanges message buffers through a pool.
pub struct PooledCompression<P> {
    pool: P,
    compressor: Box<dyn ByteCompressor>,
    config: CompressionConfig,
    metrics: Option<Arc<CompressionMetrics>>,
}

impl<P: BufferPool> PooledCompression<P> {
    pub fn new(pool: P, config: CompressionConfig) -> Self {
        let compressor = build_compressor(&config);
        Self::with_compressor(pool, compressor, config)
    }

    pub fn with_compressor(pool: P, compressor: Box<dyn ByteCompressor>, config: CompressionConfig) -> Self {
        Self { pool, compressor, config, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<CompressionMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    fn skip(&self, reason: SkipReason) -> CompressOutcome {
        if let Some(metrics) = &self.metrics {
            metrics.messages_skipped_total.with_label_values(&[reason.as_str()]).inc();
        }
        CompressOutcome::Skipped(reason)
    }

    fn reject(&self, err: CompressionError) -> CompressionError {
        if err.is_corrupt() {
            warn!("Rejecting compressed message: {}", err);
            if let Some(metrics) = &self.metrics {
                metrics.messages_corrupt_total.inc();
            }
        }
        err
    }

    fn worthwhile(&self, original_bytes: usize, final_bytes: usize) -> bool {
        if final_bytes >= original_bytes {
            return false;
        }
        let saved = (original_bytes - final_bytes) as f64 / original_bytes as f64;
        saved >= self.config.savings_ratio()
    }
}

impl<P: BufferPool> MessageCompression for PooledCompression<P> {
    fn try_compress(&self, msg: &mut OutgoingMessage) -> Result<CompressOutcome, CompressionError> {
        if !self.config.enabled {
            return Ok(self.skip(SkipReason::Disabled));
        }

        let original_bytes = msg.byte_length();
        if original_bytes <= HEADER_LEN + 1 {
            trace!("Skipping compression for short message ({} bytes)", original_bytes);
            return Ok(self.skip(SkipReason::TooShort));
        }
        let header = match FrameHeader::new(msg.bit_length()) {
            Some(header) => header,
            None => {
                trace!("Skipping compression, {} bits exceed the length field", msg.bit_length());
                return Ok(self.skip(SkipReason::TooLong));
            }
        };

        // Anything that does not save at least one byte is useless, so the
        // scratch buffer stops one byte short of the original.
        let limit = original_bytes - 1;
        let mut scratch = self.pool.acquire(limit)?;
        if scratch.len() < limit {
            scratch.resize(limit, 0);
        }

        let compressed = match self.compressor.compress_into(msg.data(), &mut scratch[HEADER_LEN..limit]) {
            Ok(written) => written,
            Err(CodecError::Overflow { window }) => {
                trace!("{} bytes did not compress into {} bytes", original_bytes, window);
                self.pool.release(scratch);
                return Ok(self.skip(SkipReason::Overflow));
            }
            Err(e) => {
                debug!("{} compression failed: {}", self.compressor.name(), e);
                self.pool.release(scratch);
                return Ok(self.skip(SkipReason::CodecFailed));
            }
        };

        let final_bytes = compressed + HEADER_LEN;
        if !self.worthwhile(original_bytes, final_bytes) {
            trace!("Compression saved too little: {} -> {} bytes", original_bytes, final_bytes);
            self.pool.release(scratch);
            return Ok(self.skip(SkipReason::NoBenefit));
        }

        scratch[..HEADER_LEN].copy_from_slice(&header.encode());
        let original = msg.replace_buffer(scratch, final_bytes * 8);
        self.pool.release(original);

        debug!(
            "{} compression: {} -> {} bytes (ratio: {:.2}%)",
            self.compressor.name(),
            original_bytes,
            final_bytes,
            (final_bytes as f64 / original_bytes as f64) * 100.0
        );
        if let Some(metrics) = &self.metrics {
            metrics.messages_compressed_total.inc();
            metrics.bytes_saved_total.inc_by((original_bytes - final_bytes) as u64);
        }

        Ok(CompressOutcome::Applied {
            original_bytes,
            compressed_bytes: final_bytes,
        })
    }

    fn try_decompress(&self, msg: &mut IncomingMessage) -> Result<DecompressOutcome, CompressionError> {
        if msg.position() != 0 {
            return Err(CompressionError::CursorNotAtStart { position: msg.position() });
        }

        let is_compressed = match msg.read_bool() {
            Ok(flag) => flag,
            Err(_) => return Err(self.reject(CompressionError::Empty)),
        };
        if !is_compressed {
            return Ok(DecompressOutcome::NotCompressed);
        }

        if msg.bit_length() < HEADER_BITS {
            return Err(self.reject(CompressionError::TruncatedHeader {
                available_bits: msg.bit_length(),
            }));
        }
        let header = FrameHeader::decode(msg.data()).map_err(|e| self.reject(e))?;
        let expected = header.original_byte_length();
        let compressed_bytes = msg.byte_length();

        let mut buffer = self.pool.acquire(expected)?;
        if buffer.len() < expected {
            buffer.resize(expected, 0);
        }

        let body = &msg.data()[HEADER_LEN..];
        let failure = match self.compressor.decompress_into(body, &mut buffer[..expected]) {
            Ok(written) if written == expected => None,
            Ok(written) => Some(CompressionError::LengthMismatch { expected, actual: written }),
            Err(CodecError::OutputOverrun { .. }) => Some(CompressionError::LengthOverrun { expected }),
            Err(source) => Some(CompressionError::Body {
                codec: self.compressor.name(),
                source,
            }),
        };
        if let Some(err) = failure {
            self.pool.release(buffer);
            return Err(self.reject(err));
        }

        let compressed = msg.replace_buffer(buffer, header.original_bit_length());
        self.pool.release(compressed);
        // bit 0 of the restored content is the original, unset, flag
        msg.set_position(1);

        trace!("{} decompression: {} -> {} bytes", self.compressor.name(), compressed_bytes, expected);
        if let Some(metrics) = &self.metrics {
            metrics.messages_decompressed_total.inc();
        }

        Ok(DecompressOutcome::Decompressed {
            compressed_bytes,
            original_bytes: expected,
        })
    }
}
