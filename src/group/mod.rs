//! 块组位图分配器
//!
//! 块按组管理。组是文件系统所管理块总数的一个分片，存在的目的
//! 是让资源就近聚集：一个文件的映射表块和数据块倾向于分配在
//! 同一个组里。分配时以调用者传入的 locality hint 所在的组为起点，
//! 组内从 hint 向两侧搜索，组间交替向上和向下展开。

mod bitmap_alloc;

pub use bitmap_alloc::GroupBitmap;
