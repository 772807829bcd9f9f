//! # fitalloc - A Placement-Policy Heap Allocator
//!
//! This crate provides a user-space heap, the analogue of `malloc`/`free`,
//! that serves requests from one fixed region mapped with `mmap(2)`. Which
//! free block serves a request is decided by a selectable **placement
//! strategy**, which makes the crate a playground for comparing policies.
//!
//! ## Overview
//!
//! ```text
//!   Region (page multiple, fixed size):
//!
//!   ┌──────┬─────────┬──────┬───────────────┬──────┬─────────┬──────┬──────────┐
//!   │ hdr  │  used   │ hdr  │     free      │ hdr  │  used   │ hdr  │   free   │
//!   └──────┴─────────┴──────┴───────────────┴──────┴─────────┴──────┴──────────┘
//!                      ▲      │                                 ▲
//!                      │      └──── next ───────────────────────┘
//!                    head
//!
//!   Every byte belongs to exactly one block. Free blocks form a singly
//!   linked list, sorted by address, whose links live in their payloads.
//! ```
//!
//! ## Placement strategies
//!
//! | strategy   | picks                                                    |
//! |------------|----------------------------------------------------------|
//! | first-fit  | the lowest-addressed block that is large enough          |
//! | best-fit   | the block leaving the smallest leftover                  |
//! | worst-fit  | the block leaving the largest leftover                   |
//! | next-fit   | first-fit, resuming where the previous allocation ended  |
//!
//! Ties go to the lowest address.
//!
//! ## Crate Structure
//!
//! ```text
//!   fitalloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── allocator  - Allocator: allocate / release / introspection
//!   ├── block      - Header and link encoding (internal)
//!   ├── config     - Strategy, AllocatorConfig
//!   ├── error      - AllocError
//!   ├── global     - Process-wide allocator (initialize once)
//!   ├── inspect    - Free-list dump, block walk, stats, invariant check
//!   ├── placement  - The four placement strategies (internal)
//!   ├── region     - mmap-backed region (internal)
//!   ├── registry   - Address-ordered free list and coalescing (internal)
//!   └── split      - Block splitting (internal)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use fitalloc::{Allocator, Strategy};
//!
//! let mut allocator = Allocator::with_strategy(4096, Strategy::BestFit).unwrap();
//!
//! let ptr = allocator.allocate(100).unwrap();
//! unsafe { ptr.as_ptr().write_bytes(0xAB, 100) };
//! allocator.release(ptr.as_ptr()).unwrap();
//!
//! for block in allocator.dump() {
//!     println!("#{} {} bytes at {:#x}", block.ordinal, block.size, block.address);
//! }
//! ```
//!
//! ## How It Works
//!
//! Allocation rounds the request up to a word, asks the strategy for a free
//! block, and splits that block when the leftover can hold a header plus more
//! than one word; otherwise the whole block is handed out. Release checks the
//! pointer against the block layout, links the block back in at its address
//! position and merges runs of neighbouring free blocks in one pass.
//!
//! ```text
//!   Single Block:
//!   ┌───────────────────┬──────────────────────────────────────┐
//!   │   Header          │              Payload                 │
//!   │  ┌─────────────┐  │  ┌────────────┬───────────────────┐  │
//!   │  │ size: N     │  │  │ next (free │                   │  │
//!   │  └─────────────┘  │  │ only)      │  N bytes usable   │  │
//!   │     8 bytes       │  └────────────┴───────────────────┘  │
//!   └───────────────────┴──────────────────────────────────────┘
//!                       ▲
//!                       └── Pointer returned to user
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded**: an [`Allocator`] is `Send` but not `Sync`
//! - **Fixed size**: the region never grows
//! - **Unix-only**: requires `libc` and `mmap`
//!
//! ## Safety
//!
//! The API itself is safe: pointers passed to [`Allocator::release`] are
//! validated, and all header accesses are bounds checked. Using the returned
//! memory is up to the caller, as with any allocator.

pub mod align;
mod allocator;
mod block;
pub mod config;
pub mod error;
pub mod global;
pub mod inspect;
mod placement;
mod region;
mod registry;
mod split;

pub use allocator::Allocator;
pub use block::{HEADER_SIZE, MIN_PAYLOAD};
pub use config::{AllocatorConfig, ParseStrategyError, Strategy};
pub use error::{AllocError, AllocResult};
pub use inspect::{BlockInfo, Blocks, FreeBlockInfo, FreeBlocks, HeapStats};
pub use region::page_size;
