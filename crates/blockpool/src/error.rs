//! Error types for block pool operations
//!
//! Uses thiserror for clean, idiomatic Rust error definitions.

use thiserror::Error;

#[cfg(feature = "logging")]
use tracing::{debug, error};

use crate::pool::PoolId;

// ============================================================================
// Main Error Type
// ============================================================================

/// Block pool errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    // --- Construction Errors ---
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("Out of memory: cannot reserve {requested} bytes ({reason})")]
    OutOfMemory { requested: usize, reason: String },

    // --- Allocation Errors ---
    #[error("Block pool {pool_id} exhausted (capacity: {capacity} blocks)")]
    PoolExhausted { pool_id: PoolId, capacity: usize },

    #[error("Null block pointer passed to deallocate")]
    NullPointer,

    // --- Typed Helper Errors ---
    #[error("Type {type_name} needs {size} bytes but blocks hold {block_size}")]
    SizeExceedsBlock {
        type_name: &'static str,
        size: usize,
        block_size: usize,
    },

    #[error("Type {type_name} needs {align} byte alignment but blocks guarantee {block_align}")]
    AlignmentExceedsBlock {
        type_name: &'static str,
        align: usize,
        block_align: usize,
    },

    // --- Misuse Errors ---
    #[error("Address {address:#x} was not issued by block pool {pool_id}")]
    ForeignBlock { pool_id: PoolId, address: usize },

    #[error("Block {index} of pool {pool_id} is already free")]
    DoubleFree { pool_id: PoolId, index: usize },
}

impl PoolError {
    /// Check if error is retryable
    ///
    /// Only exhaustion is transient: another caller may return a block.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. })
    }

    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "POOL:CONFIG:INVALID",
            Self::OutOfMemory { .. } => "POOL:RESERVE:OOM",
            Self::PoolExhausted { .. } => "POOL:ALLOC:EXHAUSTED",
            Self::NullPointer => "POOL:DEALLOC:NULL",
            Self::SizeExceedsBlock { .. } => "POOL:TYPED:SIZE",
            Self::AlignmentExceedsBlock { .. } => "POOL:TYPED:ALIGN",
            Self::ForeignBlock { .. } => "POOL:DEALLOC:FOREIGN",
            Self::DoubleFree { .. } => "POOL:DEALLOC:DOUBLE_FREE",
        }
    }

    // ============================================================================
    // Convenience Constructors
    // ============================================================================

    /// Create invalid argument error
    pub fn invalid_argument(reason: &str) -> Self {
        Self::InvalidArgument {
            reason: reason.to_string(),
        }
    }

    /// Create out of memory error
    pub fn out_of_memory(requested: usize, reason: impl Into<String>) -> Self {
        let reason = reason.into();

        #[cfg(feature = "logging")]
        error!(requested, %reason, "Block pool reservation failed");

        Self::OutOfMemory { requested, reason }
    }

    /// Create pool exhausted error
    pub fn pool_exhausted(pool_id: PoolId, capacity: usize) -> Self {
        #[cfg(feature = "logging")]
        debug!(%pool_id, capacity, "Block pool exhausted");

        Self::PoolExhausted { pool_id, capacity }
    }

    /// Create size exceeds block error for `T`
    pub fn size_exceeds_block<T>(block_size: usize) -> Self {
        Self::SizeExceedsBlock {
            type_name: core::any::type_name::<T>(),
            size: size_of::<T>(),
            block_size,
        }
    }

    /// Create alignment exceeds block error for `T`
    pub fn alignment_exceeds_block<T>(block_align: usize) -> Self {
        Self::AlignmentExceedsBlock {
            type_name: core::any::type_name::<T>(),
            align: align_of::<T>(),
            block_align,
        }
    }

    /// Create foreign block error
    pub fn foreign_block(pool_id: PoolId, address: usize) -> Self {
        #[cfg(feature = "logging")]
        error!(%pool_id, address = format_args!("{address:#x}"), "Deallocate of foreign block");

        Self::ForeignBlock { pool_id, address }
    }

    /// Create double free error
    pub fn double_free(pool_id: PoolId, index: usize) -> Self {
        #[cfg(feature = "logging")]
        error!(%pool_id, index, "Double free detected");

        Self::DoubleFree { pool_id, index }
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result type for block pool operations
pub type PoolResult<T> = Result<T, PoolError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let error = PoolError::invalid_argument("block_count must be non-zero");
        assert!(error.to_string().contains("block_count"));

        let error = PoolError::out_of_memory(4096, "mmap failed");
        assert!(error.to_string().contains("4096"));
    }

    #[test]
    fn test_size_exceeds_block_names_type() {
        let error = PoolError::size_exceeds_block::<[u64; 16]>(64);
        assert_eq!(
            error,
            PoolError::SizeExceedsBlock {
                type_name: "[u64; 16]",
                size: 128,
                block_size: 64,
            }
        );
        assert!(error.to_string().contains("128"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(PoolError::NullPointer.code(), "POOL:DEALLOC:NULL");
        assert_eq!(
            PoolError::pool_exhausted(PoolId::next(), 8).code(),
            "POOL:ALLOC:EXHAUSTED"
        );
        assert_eq!(
            PoolError::invalid_argument("zero").code(),
            "POOL:CONFIG:INVALID"
        );
    }

    #[test]
    fn test_retryable() {
        assert!(PoolError::pool_exhausted(PoolId::next(), 8).is_retryable());
        assert!(!PoolError::NullPointer.is_retryable());
        assert!(!PoolError::double_free(PoolId::next(), 0).is_retryable());
    }
}
