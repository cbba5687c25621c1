//! 块缓存
//!
//! 基于 lru crate 的块缓存，介于块映射的缓冲句柄和块设备之间。

mod block_cache;
mod buffer;

pub use block_cache::{BlockCache, CacheStats, DEFAULT_CACHE_SIZE};
pub use buffer::{CacheBuffer, CacheFlags};
