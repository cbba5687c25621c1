//! rfs_core: Pure Rust RFS 块映射核心
//!
//! 这是一个纯 Rust 实现的 RFS（嵌入式文件系统）块映射子系统，旨在提供：
//! - **零 unsafe 代码**
//! - **Rust 惯用风格**的 API
//! - **完整的类型安全**
//!
//! 核心是每文件的块地址翻译与分配引擎：直接 / 一级间接 / 二级间接
//! 块指针布局，以及在三种布局之间透明变形的增长（grow）与收缩
//! （shrink）操作。每一步都保持磁盘上的一致性。
//!
//! # 示例
//!
//! ```rust,ignore
//! use rfs_core::{BlockDevice, BlockDev, FileSystem, FsLayout, BlockMap, InodeHandle, Result};
//!
//! fn main() -> Result<()> {
//!     let device = MyDevice::new();
//!     let block_dev = BlockDev::with_default_cache(device)?;
//!     let mut fs = FileSystem::new(block_dev, FsLayout::default())?;
//!
//!     let mut inode = InodeHandle::open(&mut fs, 1)?;
//!     let mut map = BlockMap::open(&mut fs, &mut inode)?;
//!
//!     // 扩展一个块并解析它
//!     let new_block = map.grow(&mut fs, 1)?;
//!     map.close(&mut fs, &mut inode)?;
//!     Ok(())
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`block`] - 块设备抽象和 I/O 操作
//! - [`consts`] - 常量定义
//! - [`cache`] - 块缓存
//! - [`buffer`] - 作用域化的缓冲句柄
//! - [`bitmap`] - 位图操作
//! - [`group`] - 块组位图分配器
//! - [`inode`] - inode 记录存取
//! - [`fs`] - 文件系统上下文
//! - [`block_map`] - 块映射核心（find/grow/shrink）

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 块设备抽象
pub mod block;

/// 常量定义
pub mod consts;

/// 块缓存
pub mod cache;

/// 缓冲句柄
pub mod buffer;

/// 位图操作
pub mod bitmap;

/// 块组位图分配器
pub mod group;

/// inode 记录存取
pub mod inode;

/// 文件系统上下文
pub mod fs;

/// 块映射核心
pub mod block_map;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 块设备
pub use block::{BlockDev, BlockDevice};

// 缓存
pub use cache::{BlockCache, CacheBuffer, CacheFlags, CacheStats, DEFAULT_CACHE_SIZE};

// 缓冲句柄
pub use buffer::BufferHandle;

// 分配器
pub use group::GroupBitmap;

// inode
pub use inode::InodeHandle;

// 文件系统
pub use fs::{FileSystem, FsLayout};

// 块映射
pub use block_map::{BlockMap, BlockNo, BlockPos, BlockSize};
