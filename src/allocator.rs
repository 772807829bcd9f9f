use std::ptr::NonNull;

use tracing::{debug, warn};

use crate::{
  align,
  block::{self, Block, HEADER_SIZE, MIN_PAYLOAD},
  config::{AllocatorConfig, Strategy},
  error::{AllocError, AllocResult},
  inspect::{self, BlockInfo, Blocks, FreeBlocks, HeapStats},
  region::Region,
  registry::{FreeList, Insert},
  split,
};

/// Rounds a request up to the word size, and to at least one link so the
/// block can rejoin the free list later.
fn request_size(size: usize) -> Option<usize> {
  align!(size).map(|size| size.max(MIN_PAYLOAD))
}

/// A heap over one fixed `mmap`-backed region.
///
/// Every byte of the region belongs to exactly one block. Free blocks are
/// kept on an address-ordered list threaded through their payloads; a block
/// is allocated exactly when that list does not reach it.
///
/// The allocator is single-threaded: it is `Send` but not `Sync`.
pub struct Allocator {
  region: Region,
  free: FreeList,
  strategy: Strategy,
  /// Next-fit resume position: header offset of a free block.
  cursor: Option<usize>,
}

impl Allocator {
  /// Maps the region and installs a single free block spanning all of it.
  pub fn new(config: AllocatorConfig) -> AllocResult<Self> {
    let mut region = Region::map(config.region_size)?;

    let initial = region.len() - HEADER_SIZE;
    block::write_size(&mut region, 0, initial);
    let free = FreeList::with_block(&mut region, 0);

    debug!(
      region_size = region.len(),
      strategy = %config.strategy,
      "allocator initialized"
    );

    Ok(Self {
      region,
      free,
      strategy: config.strategy,
      cursor: None,
    })
  }

  /// Shorthand for [`Allocator::new`].
  pub fn with_strategy(
    region_size: usize,
    strategy: Strategy,
  ) -> AllocResult<Self> {
    Self::new(AllocatorConfig::new(region_size).with_strategy(strategy))
  }

  pub fn strategy(&self) -> Strategy {
    self.strategy
  }

  /// Size of the mapped region (the request rounded up to whole pages).
  pub fn region_size(&self) -> usize {
    self.region.len()
  }

  /// Start of the mapped region.
  pub fn base(&self) -> NonNull<u8> {
    self.region.base()
  }

  /// Allocates at least `size` bytes, returning `None` when no free block fits.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    self.try_allocate(size).ok()
  }

  /// Allocates at least `size` bytes.
  ///
  /// The payload is word aligned. Its usable size is `size` rounded up to the
  /// word size, or the whole selected block when the leftover would be too
  /// small to stand on its own (see [`Allocator::usable_size`]).
  pub fn try_allocate(
    &mut self,
    size: usize,
  ) -> AllocResult<NonNull<u8>> {
    let failed = AllocError::AllocationFailed { requested: size };
    let Some(aligned) = request_size(size) else {
      warn!(size, "allocation size overflows");
      return Err(failed);
    };

    let Some(link) = self
      .strategy
      .select(&self.free, &self.region, aligned, self.cursor)
    else {
      warn!(size, aligned, strategy = %self.strategy, "no free block large enough");
      return Err(failed);
    };

    let split = split::carve(&mut self.region, &mut self.free, link, aligned);

    if self.strategy == Strategy::NextFit {
      self.cursor = split.remainder.map(|remainder| remainder.offset).or(split.successor);
    }

    let payload = self.region.ptr_at(split.allocated.payload());
    debug!(
      size,
      granted = split.allocated.size,
      offset = split.allocated.offset,
      address = ?payload,
      "allocated block"
    );

    Ok(payload)
  }

  /// Returns a block to the free list and merges it with free neighbours.
  ///
  /// The pointer is checked before anything is modified: it must be the
  /// payload start of a block of this heap that is currently allocated.
  /// The payload is not scrubbed.
  pub fn release(
    &mut self,
    ptr: *mut u8,
  ) -> AllocResult<()> {
    let block = self.allocated_block(ptr).inspect_err(|err| {
      warn!(address = ?ptr, %err, "rejected release");
    })?;

    let inserted = self.free.insert(&mut self.region, block.offset);
    debug_assert_eq!(inserted, Insert::Inserted, "validated block was already free");

    let merges = self.free.coalesce(&mut self.region);

    debug!(offset = block.offset, size = block.size, merges, "released block");

    Ok(())
  }

  /// Usable bytes behind a pointer returned by [`Allocator::allocate`].
  pub fn usable_size(
    &self,
    ptr: *const u8,
  ) -> AllocResult<usize> {
    self.allocated_block(ptr).map(|block| block.size)
  }

  /// Lazily lists the free blocks in address order.
  ///
  /// Each call starts again from the head of the free list.
  pub fn dump(&self) -> FreeBlocks<'_> {
    FreeBlocks::new(&self.region, &self.free)
  }

  /// Walks every block of the region, free or allocated, in address order.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks::new(&self.region, &self.free)
  }

  pub fn stats(&self) -> HeapStats {
    HeapStats::collect(self.blocks())
  }

  /// Checks the heap invariants, reporting the first violation found.
  pub fn verify(&self) -> AllocResult<()> {
    inspect::verify(&self.region, &self.free)
  }

  /// Resolves `ptr` to the allocated block whose payload starts there.
  fn allocated_block(
    &self,
    ptr: *const u8,
  ) -> AllocResult<Block> {
    if ptr.is_null() {
      return Err(AllocError::NullPointer);
    }

    let address = ptr as usize;
    let invalid = AllocError::InvalidPointer { address };

    let Some(header) = self.region.offset_of(address).and_then(block::header_of) else {
      return Err(invalid);
    };

    let found: Option<BlockInfo> = self
      .blocks()
      .take_while(|info| info.offset <= header)
      .find(|info| info.offset == header);

    match found {
      Some(info) if info.free => Err(AllocError::DoubleFree { address }),
      Some(info) => Ok(Block::new(info.offset, info.size)),
      None => Err(invalid),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::region::page_size;

  const W: usize = std::mem::size_of::<usize>();

  fn allocator(strategy: Strategy) -> Allocator {
    Allocator::with_strategy(4096, strategy).unwrap()
  }

  fn offset_of(
    allocator: &Allocator,
    ptr: NonNull<u8>,
  ) -> usize {
    ptr.as_ptr() as usize - allocator.base().as_ptr() as usize
  }

  fn free_sizes(allocator: &Allocator) -> Vec<usize> {
    allocator.dump().map(|info| info.size).collect()
  }

  #[test]
  fn test_request_size() {
    assert_eq!(request_size(0), Some(MIN_PAYLOAD));
    assert_eq!(request_size(1), Some(W));
    assert_eq!(request_size(W + 1), Some(2 * W));
    assert_eq!(request_size(usize::MAX), None);
  }

  #[test]
  fn test_new_installs_one_free_block() {
    let allocator = allocator(Strategy::FirstFit);

    assert_eq!(allocator.region_size(), page_size());
    assert_eq!(free_sizes(&allocator), vec![page_size() - HEADER_SIZE]);
    assert!(allocator.verify().is_ok());
  }

  #[test]
  fn test_new_rejects_zero_size() {
    assert!(matches!(
      Allocator::with_strategy(0, Strategy::BestFit),
      Err(AllocError::InvalidSize { requested: 0 })
    ));
  }

  #[test]
  fn test_alloc() {
    let mut allocator = allocator(Strategy::FirstFit);

    unsafe {
      let first_addr = allocator.allocate(8).unwrap().as_ptr() as *mut u64;

      *first_addr = 3u64;

      assert_eq!(*first_addr, 3);

      let size: usize = 6;

      let second_addr = allocator.allocate(size * 2).unwrap().as_ptr() as *mut u16;

      for i in 0..size {
        *(second_addr.add(i)) = (i + 1) as u16;
      }

      assert_eq!(*first_addr, 3);

      for i in 0..size {
        assert_eq!((i + 1) as u16, *(second_addr.add(i)))
      }

      allocator.release(first_addr as *mut u8).unwrap();

      let third_addr = allocator.allocate(4).unwrap().as_ptr() as *mut u32;

      assert_eq!(first_addr as *mut u32, third_addr);
    }

    assert!(allocator.verify().is_ok());
  }

  #[test]
  fn test_payloads_are_word_aligned() {
    let mut allocator = allocator(Strategy::FirstFit);

    for size in [1, 3, 7, 13, 100] {
      let ptr = allocator.allocate(size).unwrap();
      assert_eq!(ptr.as_ptr() as usize % W, 0);
    }
  }

  #[test]
  fn test_zero_size_gets_a_link_sized_block() {
    let mut allocator = allocator(Strategy::FirstFit);

    let ptr = allocator.allocate(0).unwrap();
    assert_eq!(allocator.usable_size(ptr.as_ptr()).unwrap(), MIN_PAYLOAD);

    allocator.release(ptr.as_ptr()).unwrap();
    assert!(allocator.verify().is_ok());
  }

  #[test]
  fn test_small_leftover_is_handed_out() {
    let mut allocator = allocator(Strategy::FirstFit);
    let whole = page_size() - HEADER_SIZE;

    // Leaves exactly a header plus one word: not worth a free block.
    let ptr = allocator.allocate(whole - HEADER_SIZE - W).unwrap();

    assert_eq!(allocator.usable_size(ptr.as_ptr()).unwrap(), whole);
    assert_eq!(allocator.dump().count(), 0);
    assert!(allocator.verify().is_ok());
  }

  #[test]
  fn test_release_null() {
    let mut allocator = allocator(Strategy::FirstFit);

    let err = allocator.release(std::ptr::null_mut()).unwrap_err();
    assert!(matches!(err, AllocError::NullPointer));
  }

  #[test]
  fn test_release_foreign_pointer() {
    let mut allocator = allocator(Strategy::FirstFit);
    let mut local = 0u64;

    let err = allocator.release(&mut local as *mut u64 as *mut u8).unwrap_err();
    assert!(matches!(err, AllocError::InvalidPointer { .. }));
  }

  #[test]
  fn test_release_interior_pointer() {
    let mut allocator = allocator(Strategy::FirstFit);
    let ptr = allocator.allocate(64).unwrap();

    let interior = unsafe { ptr.as_ptr().add(W) };
    assert!(matches!(
      allocator.release(interior),
      Err(AllocError::InvalidPointer { .. })
    ));

    let unaligned = unsafe { ptr.as_ptr().add(1) };
    assert!(matches!(
      allocator.release(unaligned),
      Err(AllocError::InvalidPointer { .. })
    ));

    allocator.release(ptr.as_ptr()).unwrap();
  }

  #[test]
  fn test_double_free_is_detected() {
    let mut allocator = allocator(Strategy::FirstFit);
    let first = allocator.allocate(64).unwrap();
    let _second = allocator.allocate(64).unwrap();

    allocator.release(first.as_ptr()).unwrap();
    let before: Vec<_> = allocator.dump().collect();

    assert!(matches!(
      allocator.release(first.as_ptr()),
      Err(AllocError::DoubleFree { .. })
    ));
    assert_eq!(allocator.dump().collect::<Vec<_>>(), before);
  }

  #[test]
  fn test_release_coalesces_both_sides() {
    let mut allocator = allocator(Strategy::FirstFit);
    let a = allocator.allocate(64).unwrap();
    let b = allocator.allocate(64).unwrap();
    let c = allocator.allocate(64).unwrap();
    let _guard = allocator.allocate(64).unwrap();

    allocator.release(a.as_ptr()).unwrap();
    allocator.release(c.as_ptr()).unwrap();
    assert_eq!(allocator.dump().count(), 3);

    allocator.release(b.as_ptr()).unwrap();
    assert_eq!(free_sizes(&allocator)[0], 3 * 64 + 2 * HEADER_SIZE);
    assert_eq!(allocator.dump().count(), 2);
    assert!(allocator.verify().is_ok());
  }

  #[test]
  fn test_exhaustion_reports_failure() {
    let mut allocator = allocator(Strategy::BestFit);

    let mut granted = 0;
    while let Some(ptr) = allocator.allocate(256) {
      granted += allocator.usable_size(ptr.as_ptr()).unwrap();
    }

    assert!(granted <= page_size());
    assert!(matches!(
      allocator.try_allocate(256),
      Err(AllocError::AllocationFailed { requested: 256 })
    ));
    assert!(allocator.verify().is_ok());
  }

  #[test]
  fn test_oversized_request_fails() {
    let mut allocator = allocator(Strategy::WorstFit);

    assert!(allocator.allocate(page_size()).is_none());
    assert!(allocator.allocate(usize::MAX).is_none());
    assert_eq!(allocator.dump().count(), 1);
  }

  #[test]
  fn test_next_fit_cursor_follows_remainder() {
    let mut allocator = allocator(Strategy::NextFit);

    let a = allocator.allocate(64).unwrap();
    let b = allocator.allocate(64).unwrap();
    assert_eq!(offset_of(&allocator, b), offset_of(&allocator, a) + 64 + HEADER_SIZE);

    // The freed block sits behind the cursor, so the sweep carries on at the tail.
    allocator.release(a.as_ptr()).unwrap();
    let c = allocator.allocate(64).unwrap();
    assert_eq!(offset_of(&allocator, c), offset_of(&allocator, b) + 64 + HEADER_SIZE);
  }

  #[test]
  fn test_next_fit_cursor_reset_after_merge() {
    let mut allocator = allocator(Strategy::NextFit);

    let a = allocator.allocate(64).unwrap();
    // The tail the cursor names is absorbed into the freed block at offset 0.
    allocator.release(a.as_ptr()).unwrap();
    assert_eq!(allocator.dump().count(), 1);

    let b = allocator.allocate(64).unwrap();
    assert_eq!(b, a);
    assert!(allocator.verify().is_ok());
  }

  #[test]
  fn test_stats_account_for_every_byte() {
    let mut allocator = allocator(Strategy::FirstFit);
    let _a = allocator.allocate(100).unwrap();
    let b = allocator.allocate(200).unwrap();
    let _c = allocator.allocate(300).unwrap();
    allocator.release(b.as_ptr()).unwrap();

    let stats = allocator.stats();
    assert_eq!(stats.allocated_blocks, 2);
    assert_eq!(stats.free_blocks, 2);
    assert_eq!(
      stats.free_bytes + stats.allocated_bytes + stats.overhead(),
      allocator.region_size()
    );
  }
}
