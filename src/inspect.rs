//! Read-only views of the heap: the free list, every block, summary numbers
//! and an invariant check.

use std::fmt;

use crate::{
  block::{self, Block, HEADER_SIZE, MIN_PAYLOAD},
  error::{AllocError, AllocResult},
  region::Region,
  registry::{FreeList, Links},
};

/// One free-list entry as reported by [`Allocator::dump`](crate::Allocator::dump).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlockInfo {
  /// 1-based position in the free list.
  pub ordinal: usize,
  /// Payload size in bytes.
  pub size: usize,
  /// Address of the block header.
  pub address: usize,
}

/// Lazy walk of the free list, head to tail.
pub struct FreeBlocks<'r> {
  region: &'r Region,
  links: Links<'r>,
  ordinal: usize,
}

impl<'r> FreeBlocks<'r> {
  pub(crate) fn new(
    region: &'r Region,
    free: &FreeList,
  ) -> Self {
    Self {
      region,
      links: free.iter(region),
      ordinal: 0,
    }
  }
}

impl Iterator for FreeBlocks<'_> {
  type Item = FreeBlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    let link = self.links.next()?;
    self.ordinal += 1;

    Some(FreeBlockInfo {
      ordinal: self.ordinal,
      size: link.block.size,
      address: self.region.address_of(link.block.offset),
    })
  }
}

/// A block found by walking the region from its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Header offset from the region base.
  pub offset: usize,
  /// Address of the header.
  pub address: usize,
  /// Payload size in bytes.
  pub size: usize,
  /// Whether the block is on the free list.
  pub free: bool,
}

impl BlockInfo {
  /// Offset one past the payload.
  pub fn end(&self) -> usize {
    Block::new(self.offset, self.size).end()
  }
}

/// Physical walk over every block, in address order.
///
/// Free status is found by stepping through the free list alongside the walk,
/// which works because both are sorted by address. The walk stops after a
/// block whose size runs past the end of the region.
pub struct Blocks<'r> {
  region: &'r Region,
  offset: usize,
  next_free: Option<usize>,
}

impl<'r> Blocks<'r> {
  pub(crate) fn new(
    region: &'r Region,
    free: &FreeList,
  ) -> Self {
    Self {
      region,
      offset: 0,
      next_free: free.head(),
    }
  }
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    let len = self.region.len();
    if self.offset.checked_add(HEADER_SIZE).is_none_or(|end| end > len) {
      return None;
    }

    let block = Block::read(self.region, self.offset);

    while let Some(at) = self.next_free.filter(|at| *at < block.offset) {
      self.next_free = block::next_free(self.region, at);
    }
    let free = self.next_free == Some(block.offset);

    // Corrupt sizes end the walk after this block instead of wrapping around.
    self.offset = if block.end() <= len { block.end() } else { len };

    Some(BlockInfo {
      offset: block.offset,
      address: self.region.address_of(block.offset),
      size: block.size,
      free,
    })
  }
}

/// Summary of how the region is used.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeapStats {
  /// Mapped bytes.
  pub region_size: usize,
  /// Number of free blocks.
  pub free_blocks: usize,
  /// Payload bytes in free blocks.
  pub free_bytes: usize,
  /// Largest free payload, the biggest request that can still succeed.
  pub largest_free: usize,
  /// Number of allocated blocks.
  pub allocated_blocks: usize,
  /// Payload bytes handed out, including internal fragmentation.
  pub allocated_bytes: usize,
}

impl HeapStats {
  pub(crate) fn collect(blocks: Blocks<'_>) -> Self {
    let mut stats = HeapStats {
      region_size: blocks.region.len(),
      ..Default::default()
    };

    for info in blocks {
      if info.free {
        stats.free_blocks += 1;
        stats.free_bytes += info.size;
        stats.largest_free = stats.largest_free.max(info.size);
      } else {
        stats.allocated_blocks += 1;
        stats.allocated_bytes += info.size;
      }
    }

    stats
  }

  /// Bytes spent on headers.
  pub fn overhead(&self) -> usize {
    (self.free_blocks + self.allocated_blocks) * HEADER_SIZE
  }

  /// External fragmentation: share of free bytes outside the largest free block.
  ///
  /// `0.0` when all free memory is one block (or there is none).
  pub fn fragmentation(&self) -> f64 {
    if self.free_bytes == 0 {
      0.0
    } else {
      1.0 - self.largest_free as f64 / self.free_bytes as f64
    }
  }
}

impl fmt::Display for HeapStats {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(
      f,
      "region {} B, {} free block(s) / {} B (largest {} B), ",
      self.region_size,
      self.free_blocks,
      self.free_bytes,
      self.largest_free
    )?;
    write!(
      f,
      "{} allocated block(s) / {} B, fragmentation {:.1}%",
      self.allocated_blocks,
      self.allocated_bytes,
      self.fragmentation() * 100.0
    )
  }
}

/// Checks every structural invariant of the heap.
///
/// * blocks tile the region exactly, each with a word-aligned payload size
///   of at least one link,
/// * free-list entries are strictly ascending, in bounds, and each one is a
///   block of the tiling,
/// * no two free blocks touch.
pub(crate) fn verify(
  region: &Region,
  free: &FreeList,
) -> AllocResult<()> {
  let word = std::mem::size_of::<usize>();
  let len = region.len();
  let max_blocks = len / (HEADER_SIZE + MIN_PAYLOAD);

  // Free list first, following links only once they are known to be sane.
  let mut entries = Vec::new();
  let mut current = free.head();
  while let Some(offset) = current {
    if offset % word != 0 || offset.saturating_add(HEADER_SIZE + MIN_PAYLOAD) > len {
      return Err(AllocError::corrupted(offset, "free-list entry outside the region"));
    }
    if entries.last().is_some_and(|last| *last >= offset) {
      return Err(AllocError::corrupted(offset, "free list is not in ascending address order"));
    }
    if entries.len() == max_blocks {
      return Err(AllocError::corrupted(offset, "free list is longer than the region allows"));
    }
    entries.push(offset);
    current = block::next_free(region, offset);
  }

  let mut expected = 0;
  let mut entries = entries.into_iter().peekable();
  let mut previous_free: Option<BlockInfo> = None;

  for info in Blocks::new(region, free) {
    if info.offset != expected {
      return Err(AllocError::corrupted(
        info.offset,
        "block does not start where the previous one ends",
      ));
    }
    if info.end() > len {
      return Err(AllocError::corrupted(info.offset, "block extends past the end of the region"));
    }
    if info.size % word != 0 || info.size < MIN_PAYLOAD {
      return Err(AllocError::corrupted(info.offset, format!("invalid block size {}", info.size)));
    }

    if let Some(entry) = entries.next_if(|entry| *entry <= info.offset) {
      if entry != info.offset {
        return Err(AllocError::corrupted(entry, "free-list entry is not a block boundary"));
      }
    }

    if info.free {
      if let Some(previous) = previous_free.filter(|previous| previous.end() == info.offset) {
        return Err(AllocError::corrupted(
          previous.offset,
          "adjacent free blocks were not coalesced",
        ));
      }
      previous_free = Some(info);
    }

    expected = info.end();
  }

  if expected != len {
    return Err(AllocError::corrupted(expected, "blocks do not cover the whole region"));
  }
  if let Some(entry) = entries.next() {
    return Err(AllocError::corrupted(entry, "free-list entry is not a block boundary"));
  }

  Ok(())
}
