//! RFS 文件系统常量定义
//!
//! 这个模块包含 RFS 文件系统的常量定义，包括：
//! - 块和扇区大小的边界
//! - inode 记录布局
//! - 块号保留值

//=============================================================================
// 基础常量
//=============================================================================

/// 默认物理扇区大小（512 字节）
pub const RFS_DEFAULT_SECTOR_SIZE: u32 = 512;

/// 默认逻辑块大小（512 字节，RFS 面向小型介质）
pub const RFS_DEFAULT_BLOCK_SIZE: u32 = 512;

/// 最小块大小（128 字节）
pub const RFS_MIN_BLOCK_SIZE: u32 = 128;

/// 最大块大小（65536 字节）
pub const RFS_MAX_BLOCK_SIZE: u32 = 65536;

//=============================================================================
// 块号
//=============================================================================

/// 保留块号：0 表示"未分配/空洞"
pub const RFS_NO_BLOCK: u32 = 0;

/// 每个块号槽位在磁盘上占用的字节数（大端序 u32）
pub const RFS_BLOCK_NO_SIZE: u32 = 4;

//=============================================================================
// inode 记录布局
//=============================================================================

/// inode 中直接块槽位的数量
pub const RFS_INODE_BLOCKS: usize = 5;

/// inode 记录在 inode 表中的步长（字节）
pub const RFS_INODE_SIZE: u32 = 64;

/// inode 记录内：块计数字段偏移（u32）
pub const RFS_INODE_BLOCK_COUNT_OFF: usize = 0;

/// inode 记录内：末块有效字节数字段偏移（u16）
pub const RFS_INODE_BLOCK_OFFSET_OFF: usize = 4;

/// inode 记录内：最近映射块提示字段偏移（u32）
pub const RFS_INODE_LAST_MAP_BLOCK_OFF: usize = 8;

/// inode 记录内：最近数据块提示字段偏移（u32）
pub const RFS_INODE_LAST_DATA_BLOCK_OFF: usize = 12;

/// inode 记录内：块槽位数组偏移（RFS_INODE_BLOCKS 个 u32）
pub const RFS_INODE_BLOCKS_OFF: usize = 16;

//=============================================================================
// 块组
//=============================================================================

/// 每个块组管理的块数（影响分配器的就近搜索粒度）
pub const RFS_GROUP_BLOCKS: u32 = 4096;
