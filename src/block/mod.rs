//! 块设备抽象
//!
//! 提供块设备接口和块级 I/O 操作。
//! block/device.rs 提供 [`BlockDevice`] trait 和 [`BlockDev`] 包装器。
//! block/io.rs 提供经过缓存的单块读写：读写都先操作缓存，
//! 若没有对应块的缓存则调用设备接口载入缓存；
//! 如果没有启用缓存，则直接在磁盘和调用者缓冲区之间搬运。

mod device;
mod io;

pub use device::{BlockDev, BlockDevice};
