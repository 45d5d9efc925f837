//! Optional, transparent payload compression for peer-to-peer messages.
//!
//! Outgoing messages are compressed into a pooled buffer when that makes
//! them smaller; incoming messages are restored before application code
//! reads them. See [`codec`] for the wire format.

pub mod codec;
pub mod compression;
pub mod config;
pub mod messages;
pub mod metrics;
pub mod pool;

pub use codec::{
    CompressOutcome, CompressionError, DecompressOutcome, FrameHeader, MessageCompression,
    PooledCompression, SkipReason,
};
pub use compression::{build_compressor, ByteCompressor, CodecError, CompressionAlgorithm, CompressionLevel, DeflateCompressor};
#[cfg(feature = "zstd")]
pub use compression::ZstdCompressor;
pub use config::{CompressionConfig, PoolConfig};
pub use messages::{IncomingMessage, MessageError, OutgoingMessage};
pub use metrics::CompressionMetrics;
pub use pool::{BufferPool, PoolError, PoolStats, StoragePool};
