//! Error types for fault-injection harnesses

use orderheap_core::HeapError;
use thiserror::Error;

/// Raised by an interrupt point that was told to crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Interrupted at step {step}")]
pub struct Interrupted {
    /// Interrupt step (1-based) at which the crash fired
    pub step: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FaultError {
    /// A simulated crash stopped the operation midway
    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    /// Every read attempt overlapped a writer
    #[error("Read contended: gave up after {attempts} attempts")]
    Contended {
        /// Attempts made before giving up
        attempts: usize,
    },

    /// A previous write crashed; `recover` must run before the next one
    #[error("Recovery required: unstable counter {unstable}, stable counter {stable}")]
    RecoveryRequired {
        /// Rendering of the unstable counter slot
        unstable: String,
        /// Rendering of the stable counter slot
        stable: String,
    },

    /// Counters and change records disagree in a way recovery cannot repair
    #[error("Corrupt state: {reason}")]
    CorruptState {
        /// What was found
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Heap(#[from] HeapError),
}

pub type FaultResult<T> = std::result::Result<T, FaultError>;
