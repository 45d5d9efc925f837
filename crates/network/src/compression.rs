//! Byte-stream compressors used by the message compression layer.
//!
//! A compressor works on whole byte slices: it compresses a complete input
//! into a caller-supplied window and reports an overflow instead of growing
//! it, and it decompresses into an output slice of the exact expected size.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CompressionConfig;

/// Compression algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// Raw deflate (RFC 1951), no zlib or gzip framing
    #[default]
    Deflate,

    /// Zstandard compression (zstd)
    /// - Better ratio on larger messages
    /// - Frame header overhead makes it a poor fit for tiny messages
    Zstd,
}

/// Compression level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Fast,
    #[default]
    Default,
    Best,
}

impl CompressionLevel {
    fn as_deflate_level(&self) -> Compression {
        match self {
            Self::Fast => Compression::fast(),
            Self::Default => Compression::new(6),
            Self::Best => Compression::best(),
        }
    }

    #[cfg(feature = "zstd")]
    fn as_zstd_level(&self) -> i32 {
        match self {
            Self::Fast => 1,
            Self::Default => 3,
            Self::Best => 22,
        }
    }
}

/// Errors raised by a byte compressor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("compressed output does not fit in {window} bytes")]
    Overflow { window: usize },

    #[error("decompressed output exceeds {capacity} bytes")]
    OutputOverrun { capacity: usize },

    #[error("{codec} stream error: {msg}")]
    Stream { codec: &'static str, msg: String },
}

/// Whole-buffer compression primitive.
pub trait ByteCompressor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Compress all of `input` into `window`, returning the bytes written.
    ///
    /// Fails with [`CodecError::Overflow`] when the output does not fit.
    fn compress_into(&self, input: &[u8], window: &mut [u8]) -> Result<usize, CodecError>;

    /// Decompress `input` into `output`, returning the bytes written.
    ///
    /// Fails when the stream is invalid or produces more than
    /// `output.len()` bytes.
    fn decompress_into(&self, input: &[u8], output: &mut [u8]) -> Result<usize, CodecError>;
}

/// Raw deflate via flate2
#[derive(Debug, Clone, Copy)]
pub struct DeflateCompressor {
    level: Compression,
}

impl DeflateCompressor {
    pub fn new(level: CompressionLevel) -> Self {
        Self { level: level.as_deflate_level() }
    }

    fn stream_error(err: impl std::fmt::Display) -> CodecError {
        CodecError::Stream { codec: "deflate", msg: err.to_string() }
    }
}

impl Default for DeflateCompressor {
    fn default() -> Self {
        Self::new(CompressionLevel::Default)
    }
}

impl ByteCompressor for DeflateCompressor {
    fn name(&self) -> &'static str {
        "deflate"
    }

    fn compress_into(&self, input: &[u8], window: &mut [u8]) -> Result<usize, CodecError> {
        let mut stream = Compress::new(self.level, false);
        loop {
            let consumed = stream.total_in() as usize;
            let produced = stream.total_out() as usize;
            let status = stream
                .compress(&input[consumed..], &mut window[produced..], FlushCompress::Finish)
                .map_err(Self::stream_error)?;

            if status == Status::StreamEnd {
                return Ok(stream.total_out() as usize);
            }
            let progressed =
                stream.total_in() as usize != consumed || stream.total_out() as usize != produced;
            if stream.total_out() as usize >= window.len() || !progressed {
                return Err(CodecError::Overflow { window: window.len() });
            }
        }
    }

    fn decompress_into(&self, input: &[u8], output: &mut [u8]) -> Result<usize, CodecError> {
        let mut stream = Decompress::new(false);
        // Once `output` is full, keep inflating into a one byte probe: the
        // stream may still hold its end marker, or it may hold extra data.
        // `Finish` would fail outright on a full output, so never flush.
        let mut probe = [0u8; 1];
        loop {
            let consumed = stream.total_in() as usize;
            let produced = stream.total_out() as usize;
            let dst: &mut [u8] = if produced < output.len() {
                &mut output[produced..]
            } else {
                &mut probe[..]
            };
            let status = stream
                .decompress(&input[consumed..], dst, FlushDecompress::None)
                .map_err(Self::stream_error)?;

            let written = stream.total_out() as usize;
            if written > output.len() {
                return Err(CodecError::OutputOverrun { capacity: output.len() });
            }
            if status == Status::StreamEnd {
                return Ok(written);
            }
            if stream.total_in() as usize == consumed && written == produced {
                return Err(Self::stream_error("truncated stream"));
            }
        }
    }
}

/// Zstandard via the zstd bulk API
#[cfg(feature = "zstd")]
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    level: i32,
}

#[cfg(feature = "zstd")]
impl ZstdCompressor {
    pub fn new(level: CompressionLevel) -> Self {
        Self { level: level.as_zstd_level() }
    }
}

#[cfg(feature = "zstd")]
impl ByteCompressor for ZstdCompressor {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compress_into(&self, input: &[u8], window: &mut [u8]) -> Result<usize, CodecError> {
        // zstd reports a too-small destination as a generic error
        zstd::bulk::compress_to_buffer(input, window, self.level)
            .map_err(|_| CodecError::Overflow { window: window.len() })
    }

    fn decompress_into(&self, input: &[u8], output: &mut [u8]) -> Result<usize, CodecError> {
        zstd::bulk::decompress_to_buffer(input, output)
            .map_err(|e| CodecError::Stream { codec: "zstd", msg: e.to_string() })
    }
}

/// Build the compressor selected by `config`.
pub fn build_compressor(config: &CompressionConfig) -> Box<dyn ByteCompressor> {
    match config.algorithm {
        CompressionAlgorithm::Deflate => Box::new(DeflateCompressor::new(config.level)),
        #[cfg(feature = "zstd")]
        CompressionAlgorithm::Zstd => Box::new(ZstdCompressor::new(config.level)),
        #[cfg(not(feature = "zstd"))]
        CompressionAlgorithm::Zstd => {
            tracing::warn!("zstd support not compiled in, falling back to deflate");
            Box::new(DeflateCompressor::new(config.level))
        }
    }
}
