//! Carving a selected free block into the allocation and a free remainder.

use tracing::trace;

use crate::{
  block::{self, Block, HEADER_SIZE, MIN_PAYLOAD},
  region::Region,
  registry::{FreeList, Link},
};

/// Result of taking a block off the free list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
  /// The block handed to the caller, with its final size.
  pub allocated: Block,
  /// The new free block carved from the tail, if the block was split.
  pub remainder: Option<Block>,
  /// The free block that followed the selected one in the list.
  pub successor: Option<usize>,
}

/// Payload size left over for a new free block after carving `requested`
/// bytes out of a `block_size` payload, or `None` when the leftover could not
/// hold more than a bare link.
pub fn remainder_size(
  block_size: usize,
  requested: usize,
) -> Option<usize> {
  block_size
    .checked_sub(requested)?
    .checked_sub(HEADER_SIZE)
    .filter(|rest| *rest > MIN_PAYLOAD)
}

/// Removes `link`'s block from the free list, splitting off its tail when it
/// is large enough.
///
/// `requested` must already be aligned and no larger than the block.
pub fn carve(
  region: &mut Region,
  free: &mut FreeList,
  link: Link,
  requested: usize,
) -> Split {
  let selected = link.block;
  debug_assert!(selected.size >= requested);

  let successor = block::next_free(region, selected.offset);

  match remainder_size(selected.size, requested) {
    Some(rest) => {
      let remainder = Block::new(selected.payload() + requested, rest);

      block::write_size(region, remainder.offset, remainder.size);
      free.replace(region, link, remainder.offset);
      block::write_size(region, selected.offset, requested);

      trace!(
        offset = selected.offset,
        requested,
        remainder = remainder.offset,
        rest,
        "split block"
      );

      Split {
        allocated: Block::new(selected.offset, requested),
        remainder: Some(remainder),
        successor,
      }
    }
    None => {
      free.unlink(region, link);

      Split {
        allocated: selected,
        remainder: None,
        successor,
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const W: usize = std::mem::size_of::<usize>();

  #[test]
  fn test_remainder_threshold() {
    // Exactly enough for a header plus one word: too small to keep.
    assert_eq!(remainder_size(64 + HEADER_SIZE + MIN_PAYLOAD, 64), None);
    assert_eq!(
      remainder_size(64 + HEADER_SIZE + 2 * W, 64),
      Some(2 * W)
    );
  }

  #[test]
  fn test_remainder_never_underflows() {
    assert_eq!(remainder_size(64, 64), None);
    assert_eq!(remainder_size(64 + HEADER_SIZE, 64), None);
    assert_eq!(remainder_size(64 + HEADER_SIZE - W, 64), None);
    assert_eq!(remainder_size(8, 64), None);
  }

  fn single_block(size: usize) -> (Region, FreeList) {
    let mut region = Region::map(1).unwrap();
    block::write_size(&mut region, 0, size);
    let free = FreeList::with_block(&mut region, 0);
    (region, free)
  }

  #[test]
  fn test_carve_splits_large_block() {
    let (mut region, mut free) = single_block(512);
    let link = free.first(&region).unwrap();

    let split = carve(&mut region, &mut free, link, 104);

    assert_eq!(split.allocated, Block::new(0, 104));
    let remainder = Block::new(HEADER_SIZE + 104, 512 - 104 - HEADER_SIZE);
    assert_eq!(split.remainder, Some(remainder));
    assert_eq!(split.successor, None);

    assert_eq!(Block::read(&region, 0), Block::new(0, 104));
    assert_eq!(free.head(), Some(remainder.offset));
    assert_eq!(free.first(&region).unwrap().block, remainder);
    assert!(split.allocated.is_followed_by(&remainder));
  }

  #[test]
  fn test_carve_hands_out_whole_block() {
    let (mut region, mut free) = single_block(64 + HEADER_SIZE + W);
    let link = free.first(&region).unwrap();

    let split = carve(&mut region, &mut free, link, 64);

    assert_eq!(split.allocated, Block::new(0, 64 + HEADER_SIZE + W));
    assert_eq!(split.remainder, None);
    assert_eq!(free.head(), None);
    assert_eq!(Block::read(&region, 0).size, 64 + HEADER_SIZE + W);
  }

  #[test]
  fn test_carve_middle_block_keeps_neighbours() {
    let mut region = Region::map(1).unwrap();
    for (offset, size) in [(0, 16), (64, 256), (512, 16)] {
      block::write_size(&mut region, offset, size);
    }
    let mut free = FreeList::with_block(&mut region, 0);
    free.insert(&mut region, 64);
    free.insert(&mut region, 512);

    let link = free.locate(&region, 64).unwrap();
    let split = carve(&mut region, &mut free, link, 32);

    assert_eq!(split.successor, Some(512));
    let offsets: Vec<usize> = free.iter(&region).map(|link| link.block.offset).collect();
    assert_eq!(offsets, vec![0, 64 + HEADER_SIZE + 32, 512]);
  }
}
