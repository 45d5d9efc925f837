use prometheus::{opts, Encoder, IntCounter, IntCounterVec, Registry, TextEncoder};

/// Prometheus counters for the message compression layer
#[derive(Debug)]
pub struct CompressionMetrics {
    registry: Registry,

    pub messages_compressed_total: IntCounter,
    /// Labelled by skip reason
    pub messages_skipped_total: IntCounterVec,
    pub messages_decompressed_total: IntCounter,
    pub messages_corrupt_total: IntCounter,
    pub bytes_saved_total: IntCounter,
}

impl CompressionMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let messages_compressed_total = IntCounter::with_opts(opts!(
            "peerwire_messages_compressed_total",
            "Outgoing messages sent compressed"
        ))?;

        let messages_skipped_total = IntCounterVec::new(
            opts!(
                "peerwire_messages_skipped_total",
                "Outgoing messages sent uncompressed"
            ),
            &["reason"],
        )?;

        let messages_decompressed_total = IntCounter::with_opts(opts!(
            "peerwire_messages_decompressed_total",
            "Incoming messages decompressed"
        ))?;

        let messages_corrupt_total = IntCounter::with_opts(opts!(
            "peerwire_messages_corrupt_total",
            "Incoming compressed messages rejected as malformed"
        ))?;

        let bytes_saved_total = IntCounter::with_opts(opts!(
            "peerwire_compression_bytes_saved_total",
            "Bytes saved on the wire by compression"
        ))?;

        registry.register(Box::new(messages_compressed_total.clone()))?;
        registry.register(Box::new(messages_skipped_total.clone()))?;
        registry.register(Box::new(messages_decompressed_total.clone()))?;
        registry.register(Box::new(messages_corrupt_total.clone()))?;
        registry.register(Box::new(bytes_saved_total.clone()))?;

        Ok(Self {
            registry,
            messages_compressed_total,
            messages_skipped_total,
            messages_decompressed_total,
            messages_corrupt_total,
            bytes_saved_total,
        })
    }

    /// Render all counters in the Prometheus text format
    pub fn gather(&self) -> Result<String, Box<dyn std::error::Error>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
