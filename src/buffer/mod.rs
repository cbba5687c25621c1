//! 缓冲句柄
//!
//! 作用域化的块缓冲访问：一个句柄同一时刻最多绑定一个块。
//! 块映射用两个这样的句柄分别缓存一级和二级间接表。

mod handle;

pub use handle::BufferHandle;
