//! Address-ordered free list threaded through the free blocks themselves.

use tracing::{debug, trace};

use crate::{
  block::{self, Block},
  region::Region,
};

/// A free block together with the free block linking to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
  /// Header offset of the preceding free block, `None` for the list head.
  pub prev: Option<usize>,
  pub block: Block,
}

/// Outcome of inserting a block into the free list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
  Inserted,
  /// The block was already linked; the list is unchanged.
  AlreadyFree,
}

/// The free list: singly linked, strictly ascending by address.
///
/// Only this type rewires links. Every mutation keeps the list sorted, which
/// is what lets [`FreeList::coalesce`] detect neighbours with a single
/// comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreeList {
  head: Option<usize>,
}

impl FreeList {
  /// A list holding exactly the block at `offset`, whose link is reset.
  pub fn with_block(
    region: &mut Region,
    offset: usize,
  ) -> Self {
    block::set_next_free(region, offset, None);
    Self { head: Some(offset) }
  }

  pub fn head(&self) -> Option<usize> {
    self.head
  }

  /// The head entry, if any.
  pub fn first(
    &self,
    region: &Region,
  ) -> Option<Link> {
    self.head.map(|offset| Link {
      prev: None,
      block: Block::read(region, offset),
    })
  }

  /// Iterates over all free blocks, head first.
  pub fn iter<'r>(
    &self,
    region: &'r Region,
  ) -> Links<'r> {
    Links {
      region,
      next: self.first(region),
    }
  }

  /// Iterates from `start` (inclusive) to the tail.
  pub fn iter_from<'r>(
    &self,
    region: &'r Region,
    start: Link,
  ) -> Links<'r> {
    Links {
      region,
      next: Some(start),
    }
  }

  /// Finds the entry for the block at `offset`, if it is free.
  pub fn locate(
    &self,
    region: &Region,
    offset: usize,
  ) -> Option<Link> {
    self
      .iter(region)
      .take_while(|link| link.block.offset <= offset)
      .find(|link| link.block.offset == offset)
  }

  /// Removes the block of `link` from the list.
  pub fn unlink(
    &mut self,
    region: &mut Region,
    link: Link,
  ) {
    let next = block::next_free(region, link.block.offset);
    self.set_successor(region, link.prev, next);
  }

  /// Puts the block at `replacement` where `link` was, inheriting its successor.
  ///
  /// `replacement` must lie between `link.prev` and the old successor so the
  /// list stays sorted.
  pub fn replace(
    &mut self,
    region: &mut Region,
    link: Link,
    replacement: usize,
  ) {
    let next = block::next_free(region, link.block.offset);
    block::set_next_free(region, replacement, next);
    self.set_successor(region, link.prev, Some(replacement));
  }

  /// Links the block at `offset` in at its address-ordered position.
  pub fn insert(
    &mut self,
    region: &mut Region,
    offset: usize,
  ) -> Insert {
    let mut prev = None;
    let mut current = self.head;

    while let Some(at) = current {
      if at == offset {
        return Insert::AlreadyFree;
      }
      if at > offset {
        break;
      }
      prev = Some(at);
      current = block::next_free(region, at);
    }

    block::set_next_free(region, offset, current);
    self.set_successor(region, prev, Some(offset));

    trace!(offset, ?prev, next = ?current, "linked free block");

    Insert::Inserted
  }

  /// Merges every run of physically adjacent free blocks in one pass.
  ///
  /// Returns the number of merges performed.
  pub fn coalesce(
    &mut self,
    region: &mut Region,
  ) -> usize {
    let mut merges = 0;
    let mut current = self.head;

    while let Some(at) = current {
      let Some(next) = block::next_free(region, at) else {
        break;
      };

      let left = Block::read(region, at);
      let right = Block::read(region, next);

      if left.is_followed_by(&right) {
        debug!(left = left.offset, right = right.offset, "coalescing free blocks");

        block::write_size(region, at, left.size + block::HEADER_SIZE + right.size);
        let after = block::next_free(region, next);
        block::set_next_free(region, at, after);
        merges += 1;
        // Stay on `at`: it may now touch the block after `right` too.
      } else {
        current = Some(next);
      }
    }

    merges
  }

  fn set_successor(
    &mut self,
    region: &mut Region,
    prev: Option<usize>,
    next: Option<usize>,
  ) {
    match prev {
      Some(prev) => block::set_next_free(region, prev, next),
      None => self.head = next,
    }
  }
}

/// Iterator over free-list entries.
pub struct Links<'r> {
  region: &'r Region,
  next: Option<Link>,
}

impl Iterator for Links<'_> {
  type Item = Link;

  fn next(&mut self) -> Option<Self::Item> {
    let link = self.next.take()?;

    self.next = block::next_free(self.region, link.block.offset).map(|offset| Link {
      prev: Some(link.block.offset),
      block: Block::read(self.region, offset),
    });

    Some(link)
  }
}
