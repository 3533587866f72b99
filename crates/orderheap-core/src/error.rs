//! Error types for OrderHeap operations
//!
//! All heap, change-log and codec errors are represented by the HeapError
//! enum. Validation errors are raised before any mutation is applied, so a
//! failed batch never leaves a partial effect behind.

use thiserror::Error;

use crate::protocol::RequestKind;

/// OrderHeap error types with detailed context
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    /// Range bounds are inverted for the requested traversal direction
    #[error("Invalid range: {from} is past {to} for a {direction} scan")]
    InvalidRange {
        /// Debug rendering of the start bound
        from: String,
        /// Debug rendering of the end bound
        to: String,
        /// "ascending" or "descending"
        direction: &'static str,
    },

    /// The same index appears twice in one Put request
    #[error("Duplicate index {index} in request #{request}")]
    DuplicateIndex {
        /// Debug rendering of the repeated index
        index: String,
        /// Position of the offending request within its batch
        request: usize,
    },

    /// A read was issued after a write inside one transaction
    #[error("Transaction order violation: get issued after {changes} change batch(es)")]
    TransactionOrderViolation {
        /// Number of change batches already applied in the transaction
        changes: usize,
    },

    /// A Put that requires an existing entry found none
    #[error("Index {index} not found (request #{request})")]
    IndexNotFound {
        /// Debug rendering of the missing index
        index: String,
        /// Position of the offending request within its batch
        request: usize,
    },

    /// The heap is closed or its backing store failed
    #[error("Store unavailable: {reason}")]
    StoreUnavailable {
        /// Why the store cannot serve the call
        reason: String,
    },

    /// A request kind was submitted to the wrong entry point
    #[error("Unexpected {kind:?} request #{request} in a {context} batch")]
    UnexpectedRequest {
        /// Kind of the rejected request
        kind: RequestKind,
        /// Position of the offending request within its batch
        request: usize,
        /// "get" or "change"
        context: &'static str,
    },

    /// A batch or request exceeds a configured limit
    #[error("{component} too large: {size} exceeds limit of {limit}")]
    LimitExceeded {
        /// What was measured (batch, request entries, key, value)
        component: &'static str,
        /// Measured size
        size: u64,
        /// Configured maximum
        limit: u64,
    },

    /// The index type has no successor left to allocate
    #[error("Index space exhausted after {last}")]
    IndexSpaceExhausted {
        /// Debug rendering of the last allocatable index
        last: String,
    },

    /// A replica received an entry that skips past its cursor
    #[error("Sequence gap: expected seq {expected}, found {found}")]
    SequenceGap {
        /// Next sequence number the consumer can apply
        expected: u64,
        /// Sequence number actually received
        found: u64,
    },

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A change-log frame is structurally malformed
    #[error("Malformed frame at offset {offset}: {reason}")]
    Codec {
        /// Byte offset where the problem was detected
        offset: u64,
        /// Description of the problem
        reason: String,
    },

    /// Frame checksum verification failed
    #[error("Checksum mismatch at offset {offset}: expected 0x{expected:08x}, got 0x{actual:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the frame header
        expected: u32,
        /// Checksum computed over the payload
        actual: u32,
        /// Byte offset of the payload
        offset: u64,
    },

    /// Frame written by an incompatible protocol revision
    #[error("Unsupported protocol version {found} (supported: {supported})")]
    UnsupportedVersion {
        /// Version found in the frame
        found: u8,
        /// Version this build understands
        supported: u8,
    },

    /// Frame carries a request-kind tag this build does not know
    #[error("Unknown request tag {0}")]
    UnknownTag(u8),
}

impl HeapError {
    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        HeapError::StoreUnavailable { reason: reason.into() }
    }

    /// True for errors raised by validation, before anything was applied.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            HeapError::InvalidRange { .. }
                | HeapError::DuplicateIndex { .. }
                | HeapError::IndexNotFound { .. }
                | HeapError::UnexpectedRequest { .. }
                | HeapError::LimitExceeded { .. }
                | HeapError::TransactionOrderViolation { .. }
        )
    }
}

/// Result type alias for OrderHeap operations
pub type HeapResult<T> = Result<T, HeapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HeapError::ChecksumMismatch {
            expected: 0x12345678,
            actual: 0x87654321,
            offset: 24,
        };

        let display = format!("{}", err);
        assert!(display.contains("Checksum mismatch"));
        assert!(display.contains("0x12345678"));
        assert!(display.contains("0x87654321"));
    }

    #[test]
    fn test_validation_classification() {
        assert!(HeapError::DuplicateIndex { index: "1".into(), request: 0 }.is_validation());
        assert!(HeapError::TransactionOrderViolation { changes: 1 }.is_validation());
        assert!(!HeapError::unavailable("closed").is_validation());
        assert!(!HeapError::UnknownTag(9).is_validation());
    }
}
