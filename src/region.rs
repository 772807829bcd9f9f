use std::{io, mem, ptr::NonNull};

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, _SC_PAGESIZE};
use tracing::debug;

use crate::{
  align_to,
  error::{AllocError, AllocResult},
};

/// Page size assumed when `sysconf` cannot report one.
pub const FALLBACK_PAGE_SIZE: usize = 4096;

const WORD: usize = mem::size_of::<usize>();

/// Returns the page size of the running system.
pub fn page_size() -> usize {
  let size = unsafe { libc::sysconf(_SC_PAGESIZE) };

  if size > 0 && (size as usize).is_power_of_two() {
    size as usize
  } else {
    FALLBACK_PAGE_SIZE
  }
}

/// The contiguous, page-aligned byte range backing the heap.
///
/// The mapping is private and anonymous, so it starts out zeroed and is never
/// shared. Its size is fixed for its whole lifetime. Headers and links are
/// read and written one machine word at a time through [`Region::word`] and
/// [`Region::set_word`], which check alignment and bounds on every access.
pub struct Region {
  base: NonNull<u8>,
  len: usize,
}

// SAFETY: the mapping is owned exclusively by this value; moving it to another
// thread moves that ownership with it.
unsafe impl Send for Region {}

impl Region {
  /// Maps a region of at least `requested` bytes, rounded up to a page multiple.
  pub fn map(requested: usize) -> AllocResult<Self> {
    if requested == 0 {
      return Err(AllocError::InvalidSize { requested });
    }

    let len = align_to!(requested, page_size()).ok_or(AllocError::InvalidSize { requested })?;

    let address = unsafe {
      libc::mmap(
        std::ptr::null_mut(),
        len,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if address == MAP_FAILED {
      return Err(AllocError::RegionAcquisitionFailed {
        size: len,
        source: io::Error::last_os_error(),
      });
    }

    let base = NonNull::new(address as *mut u8).ok_or_else(|| AllocError::RegionAcquisitionFailed {
      size: len,
      source: io::Error::other("mmap returned a null mapping"),
    })?;

    debug!(requested, len, base = ?base, "mapped region");

    Ok(Self { base, len })
  }

  /// Size of the region in bytes.
  pub fn len(&self) -> usize {
    self.len
  }

  /// First byte of the region.
  pub fn base(&self) -> NonNull<u8> {
    self.base
  }

  /// Absolute address of `offset`.
  pub fn address_of(
    &self,
    offset: usize,
  ) -> usize {
    self.base.as_ptr() as usize + offset
  }

  /// Pointer to `offset`, which must lie inside the region.
  pub fn ptr_at(
    &self,
    offset: usize,
  ) -> NonNull<u8> {
    assert!(offset < self.len, "offset {offset} outside region of {} bytes", self.len);

    // SAFETY: `offset` is inside the mapping, so the result is in bounds and non-null.
    unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
  }

  /// Translates an address into an offset, if it lies inside the region.
  pub fn offset_of(
    &self,
    address: usize,
  ) -> Option<usize> {
    let base = self.base.as_ptr() as usize;

    address
      .checked_sub(base)
      .filter(|offset| *offset < self.len)
  }

  /// Reads the machine word stored at `offset`.
  ///
  /// # Panics
  ///
  /// Panics if `offset` is not word aligned or the word would extend past the
  /// end of the region.
  pub fn word(
    &self,
    offset: usize,
  ) -> usize {
    self.check_word(offset);

    // SAFETY: `check_word` proved the word is aligned and inside the mapping,
    // and the mapping is always initialized (zeroed by the kernel).
    unsafe { self.base.as_ptr().add(offset).cast::<usize>().read() }
  }

  /// Writes a machine word at `offset`.
  ///
  /// # Panics
  ///
  /// Same conditions as [`Region::word`].
  pub fn set_word(
    &mut self,
    offset: usize,
    value: usize,
  ) {
    self.check_word(offset);

    // SAFETY: see `word`.
    unsafe { self.base.as_ptr().add(offset).cast::<usize>().write(value) }
  }

  fn check_word(
    &self,
    offset: usize,
  ) {
    assert!(offset % WORD == 0, "unaligned word access at offset {offset}");
    assert!(
      offset.checked_add(WORD).is_some_and(|end| end <= self.len),
      "word access at offset {offset} past region end {}",
      self.len
    );
  }
}

impl Drop for Region {
  fn drop(&mut self) {
    // SAFETY: base/len describe the mapping created in `map`.
    unsafe {
      libc::munmap(self.base.as_ptr().cast(), self.len);
    }
  }
}
