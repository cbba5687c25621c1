//! 块映射核心
//!
//! 每文件的块地址翻译与分配引擎。inode 里有一个小的固定槽位数组，
//! 其含义随文件的块数变化：
//!
//! - 块数不超过槽位数时，槽位直接存数据块号（直接布局）；
//! - 超过后，槽位存一级间接表的块号，表里才是数据块号；
//! - 再超过一级布局的上限后，槽位存二级间接表的块号，二级表里
//!   是一级表的块号。
//!
//! 布局之间的变形只发生在跨越边界的那一次增长/收缩上，每一步
//! 都留下自洽的磁盘状态。
//!
//! # 模块结构
//!
//! - [`pos`] - 位置运算（纯函数）
//! - [`table`] - 间接表槽位访问
//! - `find` - 逻辑块号解析
//! - `grow` - 增长与表分配
//! - `shrink` - 收缩与表回收

pub mod pos;
pub mod table;

mod find;
mod grow;
mod shrink;


pub use pos::{BlockPos, BlockSize};

use crate::block::BlockDevice;
use crate::buffer::BufferHandle;
use crate::consts::{RFS_INODE_BLOCKS, RFS_NO_BLOCK};
use crate::error::{Error, ErrorKind, Result};
use crate::fs::FileSystem;
use crate::inode::InodeHandle;

/// 文件系统平坦块地址空间中的块号
///
/// 0 保留为"未分配/空洞"。
pub type BlockNo = u32;

/// 块映射的布局表示
///
/// 三种变体携带同一个 inode 槽位数组，区别在于槽位内容的含义。
/// 变体只允许由 grow/shrink 的变形代码切换，布局与块数的对应
/// 关系在两次操作之间不可能出现非法中间态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Representation {
    /// 槽位直接存数据块号（`count <= RFS_INODE_BLOCKS`）
    Direct([BlockNo; RFS_INODE_BLOCKS]),
    /// 槽位存一级间接表块号
    Singly([BlockNo; RFS_INODE_BLOCKS]),
    /// 槽位存二级间接表块号
    Doubly([BlockNo; RFS_INODE_BLOCKS]),
}

impl Representation {
    /// 根据块数选择布局（打开映射时从 inode 恢复）
    fn from_count(count: u32, slots: [BlockNo; RFS_INODE_BLOCKS], singly_limit: u32) -> Self {
        if count as usize <= RFS_INODE_BLOCKS {
            Representation::Direct(slots)
        } else if count <= singly_limit {
            Representation::Singly(slots)
        } else {
            Representation::Doubly(slots)
        }
    }

    /// 槽位数组
    pub(crate) fn slots(&self) -> &[BlockNo; RFS_INODE_BLOCKS] {
        match self {
            Representation::Direct(slots)
            | Representation::Singly(slots)
            | Representation::Doubly(slots) => slots,
        }
    }
}

/// 块映射
///
/// 绑定到一个 inode 记录打开；打开时从 inode 载入槽位数组、尺寸
/// 和两个就近分配提示，关闭时（若有修改）写回。两个缓冲句柄分别
/// 缓存最近访问的一级和二级间接表，由本映射独占。
///
/// 单个映射实例按单线程调用方设计，操作之间由调用者串行化。
pub struct BlockMap {
    /// 内存状态是否比 inode 中的快照新
    dirty: bool,
    /// 打开时绑定的 inode 号
    ino: u32,
    /// 布局与槽位数组
    repr: Representation,
    /// 当前尺寸
    size: BlockSize,
    /// 最近解析位置的单项缓存
    bpos: BlockPos,
    /// 最近接触的映射表块（分配器就近提示）
    last_map_block: BlockNo,
    /// 最近接触的数据块（分配器就近提示）
    last_data_block: BlockNo,
    /// 一级间接表缓冲
    singly_buffer: BufferHandle,
    /// 二级间接表缓冲
    doubly_buffer: BufferHandle,
}

impl core::fmt::Debug for BlockMap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockMap")
            .field("ino", &self.ino)
            .field("dirty", &self.dirty)
            .field("repr", &self.repr)
            .field("size", &self.size)
            .field("last_map_block", &self.last_map_block)
            .field("last_data_block", &self.last_data_block)
            .finish()
    }
}

impl BlockMap {
    /// 打开块映射
    ///
    /// 载入 inode 的映射相关字段。inode 的载入是作用域化的：
    /// 返回时 inode 已经按打开前的载入状态复原。
    ///
    /// # 参数
    ///
    /// * `fs` - 文件系统上下文
    /// * `inode` - 映射所属的 inode
    pub fn open<D: BlockDevice>(
        fs: &mut FileSystem<D>,
        inode: &mut InodeHandle,
    ) -> Result<Self> {
        inode.load(fs.dev_mut())?;
        let loaded = Self::load_fields(fs, inode);
        let unloaded = inode.unload(fs.dev_mut(), false);
        let map = loaded?;
        unloaded?;
        Ok(map)
    }

    fn load_fields<D: BlockDevice>(
        fs: &FileSystem<D>,
        inode: &InodeHandle,
    ) -> Result<Self> {
        let mut slots = [RFS_NO_BLOCK; RFS_INODE_BLOCKS];
        for (b, slot) in slots.iter_mut().enumerate() {
            *slot = inode.get_block(b)?;
        }
        let count = inode.get_block_count()?;
        let offset = inode.get_block_offset()?;

        if count > fs.max_block_map_blocks() {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "inode block count exceeds map capacity",
            ));
        }
        if offset >= fs.block_size() {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "inode block offset exceeds block size",
            ));
        }

        Ok(Self {
            dirty: false,
            ino: inode.ino(),
            repr: Representation::from_count(count, slots, fs.block_map_singly_blocks()),
            size: BlockSize { count, offset },
            bpos: BlockPos::zero(),
            last_map_block: inode.get_last_map_block()?,
            last_data_block: inode.get_last_data_block()?,
            singly_buffer: BufferHandle::new(),
            doubly_buffer: BufferHandle::new(),
        })
    }

    /// 关闭块映射
    ///
    /// 有修改时把缓存的字段写回 inode；无论写回是否成功，两个
    /// 间接表缓冲都会被释放。
    ///
    /// # 参数
    ///
    /// * `fs` - 文件系统上下文
    /// * `inode` - 打开时使用的同一个 inode
    pub fn close<D: BlockDevice>(
        &mut self,
        fs: &mut FileSystem<D>,
        inode: &mut InodeHandle,
    ) -> Result<()> {
        let mut result = if inode.ino() == self.ino {
            Ok(())
        } else {
            Err(Error::new(
                ErrorKind::InvalidInput,
                "map close against a different inode",
            ))
        };

        if result.is_ok() && self.dirty {
            result = self.write_back(fs, inode);
            if result.is_ok() {
                self.dirty = false;
            }
        }

        if let Err(e) = self.singly_buffer.close(fs.dev_mut()) {
            if result.is_ok() {
                result = Err(e);
            }
        }
        if let Err(e) = self.doubly_buffer.close(fs.dev_mut()) {
            if result.is_ok() {
                result = Err(e);
            }
        }

        result
    }

    fn write_back<D: BlockDevice>(
        &self,
        fs: &mut FileSystem<D>,
        inode: &mut InodeHandle,
    ) -> Result<()> {
        inode.load(fs.dev_mut())?;
        let stored = self.store_fields(inode);
        let unloaded = inode.unload(fs.dev_mut(), stored.is_ok());
        stored?;
        unloaded
    }

    fn store_fields(&self, inode: &mut InodeHandle) -> Result<()> {
        let slots = self.repr.slots();
        for (b, slot) in slots.iter().enumerate() {
            inode.set_block(b, *slot)?;
        }
        inode.set_block_count(self.size.count)?;
        inode.set_block_offset(self.size.offset)?;
        inode.set_last_map_block(self.last_map_block)?;
        inode.set_last_data_block(self.last_data_block)?;
        Ok(())
    }

    /// 当前尺寸
    pub fn size(&self) -> BlockSize {
        self.size
    }

    /// 当前逻辑块数
    pub fn count(&self) -> u32 {
        self.size.count
    }

    /// 内存状态是否有未写回的修改
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 最近接触的映射表块提示
    pub fn last_map_block(&self) -> BlockNo {
        self.last_map_block
    }

    /// 最近接触的数据块提示
    pub fn last_data_block(&self) -> BlockNo {
        self.last_data_block
    }

    /// 设置末块有效字节数
    ///
    /// 文件级写入逻辑在写满/截断末块后更新。
    pub fn set_size_offset(&mut self, offset: u32) {
        if self.size.offset != offset {
            self.size.offset = offset;
            self.dirty = true;
        }
    }
}
