//! Engine configuration.

/// Configuration for opening an engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Size of each log's in-memory staging buffer in bytes.
    pub buffer_size: usize,

    /// Fraction of the buffer that triggers a fire-and-forget flush.
    pub flush_watermark: f64,

    /// Whether an explicit flush also syncs file metadata.
    pub sync_on_flush: bool,

    /// Initial capacity of the hash index.
    pub initial_index_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_size: 10 * 1024 * 1024, // 10 MiB per log
            flush_watermark: 0.75,
            sync_on_flush: true,
            initial_index_capacity: 1024,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-log staging buffer size.
    ///
    /// Small buffers are useful in tests to exercise wrap-around and
    /// overflow flushing without writing megabytes.
    #[must_use]
    pub const fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Sets the flush watermark as a fraction of the buffer size.
    #[must_use]
    pub const fn flush_watermark(mut self, fraction: f64) -> Self {
        self.flush_watermark = fraction;
        self
    }

    /// Sets whether explicit flushes also sync metadata.
    #[must_use]
    pub const fn sync_on_flush(mut self, value: bool) -> Self {
        self.sync_on_flush = value;
        self
    }

    /// Sets the initial index capacity.
    #[must_use]
    pub const fn initial_index_capacity(mut self, capacity: usize) -> Self {
        self.initial_index_capacity = capacity;
        self
    }

    /// Buffer position past which an append triggers an async flush.
    pub(crate) fn watermark_bytes(&self) -> usize {
        (self.buffer_size as f64 * self.flush_watermark) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.buffer_size, 10 * 1024 * 1024);
        assert!(config.sync_on_flush);
        assert_eq!(config.initial_index_capacity, 1024);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .buffer_size(4096)
            .flush_watermark(0.5)
            .sync_on_flush(false);

        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.watermark_bytes(), 2048);
        assert!(!config.sync_on_flush);
    }
}
