/// Rounds `value` up to the machine word size.
///
/// Evaluates to `Option<usize>`: `None` when rounding would overflow `usize`.
///
/// # Examples
///
/// ```rust
/// use std::mem;
/// use fitalloc::align;
///
/// match mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), Some(16)), // 64 bit machine.
///     4 => assert_eq!(align!(11), Some(12)), // 32 bit machine.
///     _ => {},
/// };
/// assert_eq!(align!(usize::MAX), None);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, ::core::mem::size_of::<usize>())
  };
}

/// Rounds `value` up to a multiple of `alignment`, which must be a power of two.
///
/// Evaluates to `Option<usize>`: `None` when rounding would overflow `usize`.
///
/// ```rust
/// use fitalloc::align_to;
///
/// assert_eq!(align_to!(1, 4096), Some(4096));
/// assert_eq!(align_to!(4096, 4096), Some(4096));
/// assert_eq!(align_to!(4097, 4096), Some(8192));
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $alignment:expr) => {{
    let alignment: usize = $alignment;
    debug_assert!(alignment.is_power_of_two());
    ($value as usize)
      .checked_add(alignment - 1)
      .map(|value| value & !(alignment - 1))
  }};
}
