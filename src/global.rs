//! The process-wide allocator.
//!
//! A single [`Allocator`] that lives for the rest of the process once
//! [`initialize`] succeeds. It is never torn down and cannot be initialized a
//! second time. Calls are serialized by a mutex, so using it from several
//! threads is sound, but the allocator itself makes no effort to scale.
//!
//! ```rust,no_run
//! use fitalloc::{global, Strategy};
//!
//! global::initialize(4096, Strategy::FirstFit).unwrap();
//!
//! let ptr = global::allocate(100).unwrap();
//! global::release(ptr.as_ptr()).unwrap();
//!
//! for block in global::dump().unwrap() {
//!     println!("{} {} {:#x}", block.ordinal, block.size, block.address);
//! }
//! ```

use std::ptr::NonNull;

use parking_lot::{Mutex, const_mutex};

use crate::{
  allocator::Allocator,
  config::{AllocatorConfig, Strategy},
  error::{AllocError, AllocResult},
  inspect::{FreeBlockInfo, HeapStats},
};

static HEAP: Mutex<Option<Allocator>> = const_mutex(None);

fn with_heap<T>(f: impl FnOnce(&mut Allocator) -> AllocResult<T>) -> AllocResult<T> {
  match HEAP.lock().as_mut() {
    Some(allocator) => f(allocator),
    None => Err(AllocError::NotInitialized),
  }
}

/// Sets up the process-wide heap.
///
/// Fails with [`AllocError::AlreadyInitialized`] after a previous success. A
/// failed attempt leaves the heap uninitialized, so it may be retried.
pub fn initialize(
  size: usize,
  strategy: Strategy,
) -> AllocResult<()> {
  let mut heap = HEAP.lock();
  if heap.is_some() {
    return Err(AllocError::AlreadyInitialized);
  }

  *heap = Some(Allocator::new(AllocatorConfig::new(size).with_strategy(strategy))?);
  Ok(())
}

pub fn is_initialized() -> bool {
  HEAP.lock().is_some()
}

/// Allocates from the process-wide heap; `None` on exhaustion or before
/// [`initialize`].
pub fn allocate(size: usize) -> Option<NonNull<u8>> {
  try_allocate(size).ok()
}

pub fn try_allocate(size: usize) -> AllocResult<NonNull<u8>> {
  with_heap(|allocator| allocator.try_allocate(size))
}

/// See [`Allocator::release`].
pub fn release(ptr: *mut u8) -> AllocResult<()> {
  with_heap(|allocator| allocator.release(ptr))
}

/// Snapshot of the free list, head first.
pub fn dump() -> AllocResult<Vec<FreeBlockInfo>> {
  with_heap(|allocator| Ok(allocator.dump().collect()))
}

pub fn stats() -> AllocResult<HeapStats> {
  with_heap(|allocator| Ok(allocator.stats()))
}
