//! # blockpool
//!
//! Fixed-size block pool allocator.
//!
//! A [`BlockPool`] reserves one contiguous region of `block_size * block_count`
//! bytes from the OS when it is created and hands out equal-sized blocks from
//! it in O(1), without calling the global allocator per request. It suits
//! high-frequency, uniform-size workloads such as object pools and
//! fixed-record arenas: latency is predictable and there is no fragmentation.
//!
//! ## Quick Start
//!
//! ```rust
//! use blockpool::{BlockPool, PoolError};
//!
//! let mut pool = BlockPool::new(64, 8)?;
//!
//! // Raw blocks
//! let block = pool.allocate()?;
//! unsafe { block.as_ptr().write_bytes(0xAB, block.len()) };
//! pool.deallocate(block)?;
//!
//! // Typed values, returned to the pool on drop
//! let value = pool.create_with([1u32, 2, 3, 4])?;
//! assert_eq!(value[2], 3);
//! drop(value);
//!
//! pool.reset();
//! # Ok::<(), PoolError>(())
//! ```
//!
//! ## Features
//!
//! - `logging` (default): structured `tracing` events for pool lifecycle,
//!   exhaustion and detected misuse
//!
//! ## Architecture
//!
//! - backing region reserved with the `region` crate, released on drop
//! - index-based free list kept beside the blocks, never inside them
//! - one `parking_lot::Mutex` around the free-list head and used counter
//! - [`PoolBox`] typed handles layered on raw allocate/deallocate

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(unsafe_code)] // Raw block memory requires unsafe
#![warn(rust_2018_idioms)]

mod backing;
mod block;
mod free_list;

pub mod config;
pub mod error;
pub mod layout;
pub mod pool;
pub mod pool_box;
pub mod stats;

pub use block::Block;
pub use config::PoolConfig;
pub use error::{PoolError, PoolResult};
pub use pool::{BlockPool, PoolId};
pub use pool_box::PoolBox;
pub use stats::PoolStats;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
