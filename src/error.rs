//! Allocator errors.

use std::io;

use thiserror::Error;

/// Result type for allocator operations.
pub type AllocResult<T> = Result<T, AllocError>;

/// Errors reported by the allocator.
///
/// None of these abort the process: every failure is handed back to the
/// caller, which decides whether it is fatal.
#[derive(Debug, Error)]
#[allow(missing_docs)] // Fields are documented by variant docs
pub enum AllocError {
  /// The process-wide allocator was initialized before.
  #[error("allocator is already initialized")]
  AlreadyInitialized,

  /// The process-wide allocator was used before `initialize`.
  #[error("allocator is not initialized")]
  NotInitialized,

  /// The requested region size is zero or cannot be rounded to a page.
  #[error("invalid region size: {requested} bytes")]
  InvalidSize { requested: usize },

  /// The operating system refused to map the backing region.
  #[error("failed to acquire a {size} byte region: {source}")]
  RegionAcquisitionFailed {
    size: usize,
    #[source]
    source: io::Error,
  },

  /// No free block is large enough for the request.
  #[error("out of memory: no free block can hold {requested} bytes")]
  AllocationFailed { requested: usize },

  /// `release` was called with a null pointer.
  #[error("attempt to free a null pointer")]
  NullPointer,

  /// The pointer was not returned by this allocator.
  #[error("pointer {address:#x} does not belong to an allocated block")]
  InvalidPointer { address: usize },

  /// The block behind the pointer is already free.
  #[error("double free of block at {address:#x}")]
  DoubleFree { address: usize },

  /// A structural invariant of the heap does not hold.
  #[error("heap corrupted at offset {offset}: {reason}")]
  Corrupted { offset: usize, reason: String },
}

impl AllocError {
  /// Creates a corruption report.
  pub fn corrupted(
    offset: usize,
    reason: impl Into<String>,
  ) -> Self {
    Self::Corrupted {
      offset,
      reason: reason.into(),
    }
  }

  /// Returns true for misuse of `release` (null, foreign or already freed pointers).
  pub fn is_release_misuse(&self) -> bool {
    matches!(
      self,
      Self::NullPointer | Self::InvalidPointer { .. } | Self::DoubleFree { .. }
    )
  }

  /// Returns true if the heap can no longer be trusted.
  pub fn is_fatal(&self) -> bool {
    matches!(self, Self::Corrupted { .. })
  }
}
