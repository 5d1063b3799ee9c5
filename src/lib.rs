//! A TLSF (Two-Level Segregated Fit) memory allocator that manages
//! caller-supplied memory pools instead of acquiring its own.
//!
//!  - **Allocation, deallocation, and reallocation are guaranteed to
//!    complete in bounded, constant time.** No internal loop is
//!    data-dependent; every search is a fixed number of bitmap scans.
//!
//!  - **No memory of its own.** The allocator never calls into the
//!    operating system. Callers hand it spans of memory (`add_pool`) and it
//!    administers exactly those bytes, nothing more.
//!
//!  - **`#![no_std]`**, suitable for embedding in environments with no
//!    global allocator of their own, as well as ordinary arena-style use on
//!    top of one.
//!
//! # Example
//!
//! ```rust
//! use tlsf_pool::Tlsf;
//!
//! let mut pool = [0u8; 65536];
//! let mut tlsf = Tlsf::new(&mut pool).unwrap();
//!
//! let mut ptr = tlsf.alloc(64).unwrap();
//! unsafe {
//!     *ptr.as_mut() = 42u8;
//!     assert_eq!(*ptr.as_ref(), 42u8);
//! }
//! tlsf.free(ptr);
//! assert!(tlsf.validate());
//! ```
//!
//! # Block layout
//!
//! ```svgbob
//! +--------+------------------------------+
//! | header | payload ...                  |
//! +--------+------------------------------+
//!  ^ size_word: size | FREE | PREV_FREE
//! ```
//!
//! A used block carries no metadata beyond its size word — the pointer to
//! its physical predecessor, needed only while a block is free, is a
//! *ghost footer*: the last pointer-sized word of the predecessor's own
//! payload, valid to read only when `PREV_FREE` is set. This keeps used
//! blocks free of any overhead besides the size word itself.
//!
//! # Differences from the algorithm this crate is modeled on
//!
//!  - Each pool is bounded by a two-sentinel scheme — a zero-size prologue
//!    at the start in addition to the epilogue at the end — rather than a
//!    single end-of-pool flag. Block-level operations never need to know
//!    they're near a pool boundary; the sentinels are just blocks that are
//!    always used.
//!  - The control object (bitmaps, bucket table, pool table) is not a value
//!    the caller declares; it is written into the leading bytes of the
//!    first pool the caller supplies, so construction touches no memory
//!    besides what the caller already owns.
#![no_std]

mod alloc;
mod block;
mod control;
mod freelist;
mod map;
mod pool;
mod validate;

pub mod int;

pub use crate::{control::Tlsf, pool::PoolHandle};

#[cfg(any(test, feature = "std"))]
extern crate std;

#[cfg(test)]
mod tests;
