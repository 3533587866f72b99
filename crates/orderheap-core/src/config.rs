//! Configuration management for OrderHeap
//!
//! Provides limit presets for different deployment classes
//! and validation for custom configurations.

/// OrderHeap configuration with deployment presets
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of requests in one batch
    pub max_batch_requests: usize,
    /// Maximum indexes, items or entries carried by a single request
    pub max_request_entries: usize,
    /// Limit applied to range scans that do not set one
    pub default_scan_limit: Option<usize>,
    /// Name attached to log events, to tell heaps apart
    pub label: String,
}

impl Config {
    /// Service-class: large batches, scans unbounded unless asked otherwise
    pub fn standard() -> Self {
        Self {
            max_batch_requests: 1024,
            max_request_entries: 64 * 1024,
            default_scan_limit: None,
            label: "heap".to_string(),
        }
    }

    /// Embedded-class: small batches and a default page size for scans
    pub fn embedded() -> Self {
        Self {
            max_batch_requests: 64,
            max_request_entries: 4096,
            default_scan_limit: Some(1000),
            label: "heap".to_string(),
        }
    }

    /// No limits at all. Meant for tests and offline tooling.
    pub fn unbounded() -> Self {
        Self {
            max_batch_requests: usize::MAX,
            max_request_entries: usize::MAX,
            default_scan_limit: None,
            label: "heap".to_string(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.max_batch_requests == 0 {
            return Err("max_batch_requests must be > 0".into());
        }
        if self.max_request_entries == 0 {
            return Err("max_request_entries must be > 0".into());
        }
        if self.default_scan_limit == Some(0) {
            return Err("default_scan_limit must be > 0 when set".into());
        }
        if self.label.is_empty() {
            return Err("label must not be empty".into());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::standard()
    }
}
