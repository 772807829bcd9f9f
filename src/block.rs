//! Physical encoding of blocks inside the region.
//!
//! ```text
//!   allocated:  [ size ][ payload (size bytes) ...................... ]
//!   free:       [ size ][ next ][ rest of payload ................... ]
//!               ^       ^
//!               header  payload start, returned to the caller
//! ```
//!
//! A block is free iff the free list reaches it; nothing in the block itself
//! records its status. `next` holds the offset of the next free block, or
//! [`NIL`] for the last one.

use std::mem;

use crate::region::Region;

/// Bytes taken by a block header.
pub const HEADER_SIZE: usize = mem::size_of::<usize>();

/// Bytes taken by the free-list link at the start of a free payload.
pub const LINK_SIZE: usize = mem::size_of::<usize>();

/// Smallest payload a block may have: it must be able to hold the link once freed.
pub const MIN_PAYLOAD: usize = LINK_SIZE;

/// Link value marking the end of the free list.
pub const NIL: usize = usize::MAX;

/// A block located by the offset of its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
  pub offset: usize,
  pub size: usize,
}

impl Block {
  pub fn new(
    offset: usize,
    size: usize,
  ) -> Self {
    Self { offset, size }
  }

  /// Reads the header at `offset`.
  pub fn read(
    region: &Region,
    offset: usize,
  ) -> Self {
    Self::new(offset, region.word(offset))
  }

  /// Offset of the first payload byte.
  pub fn payload(&self) -> usize {
    self.offset + HEADER_SIZE
  }

  /// Offset one past the last payload byte, saturating on corrupt sizes.
  pub fn end(&self) -> usize {
    self.payload().saturating_add(self.size)
  }

  /// Whether `other` starts right where this block ends.
  pub fn is_followed_by(
    &self,
    other: &Block,
  ) -> bool {
    self.end() == other.offset
  }
}

/// Writes the size header of the block at `offset`.
pub fn write_size(
  region: &mut Region,
  offset: usize,
  size: usize,
) {
  region.set_word(offset, size);
}

/// Reads the free-list link of the free block at `offset`.
pub fn next_free(
  region: &Region,
  offset: usize,
) -> Option<usize> {
  match region.word(offset + HEADER_SIZE) {
    NIL => None,
    next => Some(next),
  }
}

/// Writes the free-list link of the free block at `offset`.
pub fn set_next_free(
  region: &mut Region,
  offset: usize,
  next: Option<usize>,
) {
  region.set_word(offset + HEADER_SIZE, next.unwrap_or(NIL));
}

/// Header offset for a payload offset, if the payload can belong to a block.
pub fn header_of(payload: usize) -> Option<usize> {
  payload
    .checked_sub(HEADER_SIZE)
    .filter(|header| header % mem::align_of::<usize>() == 0)
}
