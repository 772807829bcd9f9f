//! The four placement strategies.
//!
//! Each one walks the free list and picks the block that will serve a request
//! of an already aligned `size`. None of them modify the heap; carving the
//! chosen block is the job of [`crate::split`].

use tracing::trace;

use crate::{
  config::Strategy,
  region::Region,
  registry::{FreeList, Link},
};

impl Strategy {
  /// Picks the free block that serves a request of `size` bytes.
  ///
  /// `cursor` is the next-fit resume position; the other strategies ignore it.
  pub(crate) fn select(
    self,
    free: &FreeList,
    region: &Region,
    size: usize,
    cursor: Option<usize>,
  ) -> Option<Link> {
    match self {
      Strategy::FirstFit => first_fit(free, region, size),
      Strategy::BestFit => best_fit(free, region, size),
      Strategy::WorstFit => worst_fit(free, region, size),
      Strategy::NextFit => next_fit(free, region, size, cursor),
    }
  }
}

fn fits(
  link: &Link,
  size: usize,
) -> bool {
  trace!(offset = link.block.offset, block_size = link.block.size, size, "checking block");
  link.block.size >= size
}

fn first_fit(
  free: &FreeList,
  region: &Region,
  size: usize,
) -> Option<Link> {
  free.iter(region).find(|link| fits(link, size))
}

/// Smallest leftover wins; on ties the lowest address wins.
fn best_fit(
  free: &FreeList,
  region: &Region,
  size: usize,
) -> Option<Link> {
  let mut best: Option<(usize, Link)> = None;

  for link in free.iter(region).filter(|link| fits(link, size)) {
    let slack = link.block.size - size;

    if best.is_none_or(|(smallest, _)| slack < smallest) {
      best = Some((slack, link));

      if slack == 0 {
        break;
      }
    }
  }

  best.map(|(_, link)| link)
}

/// Largest leftover wins; on ties the lowest address wins.
fn worst_fit(
  free: &FreeList,
  region: &Region,
  size: usize,
) -> Option<Link> {
  let mut worst: Option<(usize, Link)> = None;

  for link in free.iter(region).filter(|link| fits(link, size)) {
    let slack = link.block.size - size;

    if worst.is_none_or(|(largest, _)| slack > largest) {
      worst = Some((slack, link));
    }
  }

  worst.map(|(_, link)| link)
}

/// First fit over the circular list starting at `cursor`.
///
/// A cursor that no longer names a free block (it was merged into its left
/// neighbour, or never set) restarts the sweep at the head.
fn next_fit(
  free: &FreeList,
  region: &Region,
  size: usize,
  cursor: Option<usize>,
) -> Option<Link> {
  let start = cursor
    .and_then(|offset| free.locate(region, offset))
    .or_else(|| free.first(region))?;
  let start_offset = start.block.offset;

  free
    .iter_from(region, start)
    .chain(
      free
        .iter(region)
        .take_while(|link| link.block.offset != start_offset),
    )
    .find(|link| fits(link, size))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::{self, Block};

  /// Free blocks of the given sizes, each followed by a small gap so
  /// nothing is adjacent.
  fn heap_of(sizes: &[usize]) -> (Region, FreeList, Vec<usize>) {
    let mut region = Region::map(1 << 16).unwrap();
    let mut offsets = Vec::new();
    let mut offset = 0;

    for &size in sizes {
      block::write_size(&mut region, offset, size);
      offsets.push(offset);
      offset += block::HEADER_SIZE + size + 16;
    }

    let mut free = FreeList::with_block(&mut region, offsets[0]);
    for &offset in &offsets[1..] {
      free.insert(&mut region, offset);
    }

    (region, free, offsets)
  }

  fn selected(
    strategy: Strategy,
    sizes: &[usize],
    size: usize,
    cursor: Option<usize>,
  ) -> Option<(usize, Block)> {
    let (region, free, offsets) = heap_of(sizes);
    let link = strategy.select(&free, &region, size, cursor.map(|index| offsets[index]))?;
    let index = offsets.iter().position(|offset| *offset == link.block.offset).unwrap();
    Some((index, link.block))
  }

  fn index(
    strategy: Strategy,
    sizes: &[usize],
    size: usize,
  ) -> Option<usize> {
    selected(strategy, sizes, size, None).map(|(index, _)| index)
  }

  #[test]
  fn test_first_fit_takes_lowest_address() {
    assert_eq!(index(Strategy::FirstFit, &[16, 64, 32, 128], 32), Some(1));
    assert_eq!(index(Strategy::FirstFit, &[16, 64, 32, 128], 8), Some(0));
    assert_eq!(index(Strategy::FirstFit, &[16, 64, 32, 128], 256), None);
  }

  #[test]
  fn test_best_fit_minimizes_leftover() {
    assert_eq!(index(Strategy::BestFit, &[128, 48, 64, 40], 40), Some(3));
    assert_eq!(index(Strategy::BestFit, &[128, 48, 64, 40], 56), Some(2));
    assert_eq!(index(Strategy::BestFit, &[128, 48, 64, 40], 200), None);
  }

  #[test]
  fn test_best_fit_tie_goes_to_lowest_address() {
    assert_eq!(index(Strategy::BestFit, &[128, 64, 256, 64], 48), Some(1));
  }

  #[test]
  fn test_worst_fit_maximizes_leftover() {
    assert_eq!(index(Strategy::WorstFit, &[128, 48, 512, 40], 40), Some(2));
    assert_eq!(index(Strategy::WorstFit, &[128, 48, 512, 40], 1024), None);
  }

  #[test]
  fn test_worst_fit_tie_goes_to_lowest_address() {
    assert_eq!(index(Strategy::WorstFit, &[64, 256, 32, 256], 16), Some(1));
  }

  #[test]
  fn test_worst_fit_accepts_exact_fit() {
    assert_eq!(index(Strategy::WorstFit, &[24, 16], 24), Some(0));
  }

  #[test]
  fn test_next_fit_without_cursor_starts_at_head() {
    let found = selected(Strategy::NextFit, &[16, 64, 64], 32, None);
    assert_eq!(found.map(|(index, _)| index), Some(1));
  }

  #[test]
  fn test_next_fit_resumes_at_cursor() {
    let found = selected(Strategy::NextFit, &[64, 16, 64, 64], 32, Some(2));
    assert_eq!(found.map(|(index, _)| index), Some(2));

    let found = selected(Strategy::NextFit, &[64, 16, 16, 64], 32, Some(1));
    assert_eq!(found.map(|(index, _)| index), Some(3));
  }

  #[test]
  fn test_next_fit_wraps_around() {
    let found = selected(Strategy::NextFit, &[64, 16, 16, 16], 32, Some(2));
    assert_eq!(found.map(|(index, _)| index), Some(0));
  }

  #[test]
  fn test_next_fit_exhausted_after_full_circle() {
    assert_eq!(selected(Strategy::NextFit, &[16, 16, 16], 32, Some(1)), None);
  }

  #[test]
  fn test_next_fit_stale_cursor_restarts_at_head() {
    let (region, free, _) = heap_of(&[64, 64]);
    // An offset inside the first block is not a free-list entry.
    let link = Strategy::NextFit.select(&free, &region, 32, Some(24)).unwrap();
    assert_eq!(link.block.offset, 0);
  }
}
