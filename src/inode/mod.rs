//! inode 记录存取
//!
//! inode 记录以固定步长存放在 inode 表区域的块中，字段为大端序。
//! 块映射只关心其中与映射相关的字段：块槽位数组、块计数、
//! 末块偏移，以及两个就近分配提示。

mod handle;

pub use handle::InodeHandle;
