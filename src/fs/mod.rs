//! 文件系统上下文
//!
//! 显式传递的上下文对象，取代全局状态：几何参数、块设备和
//! 块组分配器都挂在 [`FileSystem`] 上，单元测试和多挂载点
//! 可以各自持有独立实例。

use crate::block::{BlockDev, BlockDevice};
use crate::consts::{
    RFS_GROUP_BLOCKS, RFS_INODE_BLOCKS, RFS_INODE_SIZE, RFS_MAX_BLOCK_SIZE, RFS_MIN_BLOCK_SIZE,
};
use crate::error::{Error, ErrorKind, Result};
use crate::group::GroupBitmap;

/// 文件系统布局参数
#[derive(Debug, Clone, Copy)]
pub struct FsLayout {
    /// inode 表起始块（块 0 保留给 superblock）
    pub inode_origin: u32,
    /// inode 记录数
    pub inode_count: u32,
    /// 每个块组的块数（8 的倍数）
    pub group_blocks: u32,
}

impl Default for FsLayout {
    fn default() -> Self {
        Self {
            inode_origin: 1,
            inode_count: 128,
            group_blocks: RFS_GROUP_BLOCKS,
        }
    }
}

/// 文件系统上下文
///
/// 拥有块设备、块组分配器和几何参数。块映射的所有操作都
/// 显式接收一个 `&mut FileSystem`。
pub struct FileSystem<D> {
    /// 块设备
    dev: BlockDev<D>,
    /// 块组分配器
    alloc: GroupBitmap,
    /// 布局参数
    layout: FsLayout,
    /// 块大小（字节）
    block_size: u32,
    /// 总块数
    blocks: u32,
    /// 每个表块容纳的块号数（fan-out）
    blocks_per_block: u32,
    /// 一级间接布局能寻址的最大块数
    block_map_singly_blocks: u32,
    /// 二级间接布局能寻址的最大块数（即映射的最大块数）
    block_map_doubly_blocks: u32,
}

impl<D> core::fmt::Debug for FileSystem<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FileSystem")
            .field("block_size", &self.block_size)
            .field("blocks", &self.blocks)
            .field("blocks_per_block", &self.blocks_per_block)
            .field("free_blocks", &self.alloc.free_count())
            .finish()
    }
}

impl<D: BlockDevice> FileSystem<D> {
    /// 创建文件系统上下文
    ///
    /// # 参数
    ///
    /// * `dev` - 块设备
    /// * `layout` - 布局参数
    ///
    /// 校验几何参数：块大小必须在边界内、是 4 的倍数，且表块
    /// fan-out 必须大于 inode 槽位数（否则一级/二级变形的
    /// 交叉条件不成立）。
    pub fn new(dev: BlockDev<D>, layout: FsLayout) -> Result<Self> {
        let block_size = dev.block_size();

        if !(RFS_MIN_BLOCK_SIZE..=RFS_MAX_BLOCK_SIZE).contains(&block_size)
            || block_size % 4 != 0
        {
            return Err(Error::new(ErrorKind::InvalidInput, "bad block size"));
        }

        let blocks_per_block = block_size / 4;
        if blocks_per_block as usize <= RFS_INODE_BLOCKS {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "table fan-out must exceed inode slot count",
            ));
        }

        let total = dev.total_blocks();
        if total == 0 || total > u32::MAX as u64 {
            return Err(Error::new(ErrorKind::InvalidInput, "bad device size"));
        }
        let blocks = total as u32;

        // inode 表占用的块
        let inodes_per_block = block_size / RFS_INODE_SIZE;
        if inodes_per_block == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "bad block size"));
        }
        let inode_blocks =
            (layout.inode_count + inodes_per_block - 1) / inodes_per_block;
        let reserved = layout
            .inode_origin
            .checked_add(inode_blocks)
            .ok_or(Error::new(ErrorKind::InvalidInput, "inode table overflow"))?;
        if reserved >= blocks {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "inode table does not fit on device",
            ));
        }

        let alloc = GroupBitmap::new(blocks, layout.group_blocks, reserved)?;

        let block_map_singly_blocks = blocks_per_block * RFS_INODE_BLOCKS as u32;
        let block_map_doubly_blocks = blocks_per_block
            .saturating_mul(blocks_per_block)
            .saturating_mul(RFS_INODE_BLOCKS as u32);

        Ok(Self {
            dev,
            alloc,
            layout,
            block_size,
            blocks,
            blocks_per_block,
            block_map_singly_blocks,
            block_map_doubly_blocks,
        })
    }

    /// 块大小（字节）
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// 总块数
    pub fn blocks(&self) -> u32 {
        self.blocks
    }

    /// 每个表块容纳的块号数
    pub fn blocks_per_block(&self) -> u32 {
        self.blocks_per_block
    }

    /// 一级间接布局能寻址的最大块数
    pub fn block_map_singly_blocks(&self) -> u32 {
        self.block_map_singly_blocks
    }

    /// 二级间接布局能寻址的最大块数
    pub fn block_map_doubly_blocks(&self) -> u32 {
        self.block_map_doubly_blocks
    }

    /// 块映射可寻址的最大块数
    pub fn max_block_map_blocks(&self) -> u32 {
        self.block_map_doubly_blocks
    }

    /// 块设备引用
    pub fn dev(&self) -> &BlockDev<D> {
        &self.dev
    }

    /// 块设备可变引用
    pub fn dev_mut(&mut self) -> &mut BlockDev<D> {
        &mut self.dev
    }

    /// 分配器引用
    pub fn allocator(&self) -> &GroupBitmap {
        &self.alloc
    }

    /// 分配一个空闲块
    ///
    /// # 参数
    ///
    /// * `hint` - 就近提示块号
    /// * `for_data` - true 表示数据块，false 表示映射表块
    pub fn alloc_block(&mut self, hint: u32, for_data: bool) -> Result<u32> {
        self.alloc.alloc(hint, for_data)
    }

    /// 释放一个块
    pub fn free_block(&mut self, for_data: bool, bno: u32) -> Result<()> {
        self.alloc.free(for_data, bno)
    }

    /// 当前空闲块数
    pub fn free_blocks(&self) -> u32 {
        self.alloc.free_count()
    }

    /// 计算 inode 记录的位置
    ///
    /// # 返回
    ///
    /// `(记录所在块号, 块内字节偏移)`
    pub fn inode_location(&self, ino: u32) -> Result<(u32, usize)> {
        if ino >= self.layout.inode_count {
            return Err(Error::new(ErrorKind::NotFound, "no such inode"));
        }
        let inodes_per_block = self.block_size / RFS_INODE_SIZE;
        let bno = self.layout.inode_origin + ino / inodes_per_block;
        let offset = ((ino % inodes_per_block) * RFS_INODE_SIZE) as usize;
        Ok((bno, offset))
    }

    /// 将所有脏缓存块刷回设备
    pub fn sync(&mut self) -> Result<usize> {
        self.dev.flush_cache()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    struct RamDisk {
        block_size: u32,
        storage: Vec<u8>,
        total_blocks: u64,
    }

    impl RamDisk {
        fn new(total_blocks: u64, block_size: u32) -> Self {
            Self {
                block_size,
                storage: vec![0u8; (total_blocks * block_size as u64) as usize],
                total_blocks,
            }
        }
    }

    impl BlockDevice for RamDisk {
        fn block_size(&self) -> u32 {
            self.block_size
        }

        fn sector_size(&self) -> u32 {
            self.block_size
        }

        fn total_blocks(&self) -> u64 {
            self.total_blocks
        }

        fn read_blocks(&mut self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize> {
            let start = (lba * self.block_size as u64) as usize;
            let len = (count * self.block_size) as usize;
            buf[..len].copy_from_slice(&self.storage[start..start + len]);
            Ok(len)
        }

        fn write_blocks(&mut self, lba: u64, count: u32, buf: &[u8]) -> Result<usize> {
            let start = (lba * self.block_size as u64) as usize;
            let len = (count * self.block_size) as usize;
            self.storage[start..start + len].copy_from_slice(&buf[..len]);
            Ok(len)
        }
    }

    fn layout() -> FsLayout {
        FsLayout {
            inode_origin: 1,
            inode_count: 16,
            group_blocks: 64,
        }
    }

    #[test]
    fn test_geometry() {
        let dev = BlockDev::new(RamDisk::new(1024, 512)).unwrap();
        let fs = FileSystem::new(dev, layout()).unwrap();

        assert_eq!(fs.block_size(), 512);
        assert_eq!(fs.blocks_per_block(), 128);
        assert_eq!(fs.block_map_singly_blocks(), 128 * 5);
        assert_eq!(fs.block_map_doubly_blocks(), 128 * 128 * 5);
        assert_eq!(fs.max_block_map_blocks(), fs.block_map_doubly_blocks());
    }

    #[test]
    fn test_debug_format() {
        let dev = BlockDev::new(RamDisk::new(1024, 512)).unwrap();
        let fs = FileSystem::new(dev, layout()).unwrap();
        let s = alloc::format!("{:?}", fs);
        assert!(s.contains("block_size: 512"));
    }

    #[test]
    fn test_reserved_area_not_allocatable() {
        let dev = BlockDev::new(RamDisk::new(1024, 512)).unwrap();
        let fs = FileSystem::new(dev, layout()).unwrap();

        // 块 0（superblock）、块 1-2（16 个 inode，每块 8 个）被保留
        assert!(fs.allocator().is_allocated(0));
        assert!(fs.allocator().is_allocated(1));
        assert!(fs.allocator().is_allocated(2));
        assert!(!fs.allocator().is_allocated(3));
    }

    #[test]
    fn test_tiny_block_size_rejected() {
        let dev = BlockDev::new(RamDisk::new(1024, 32)).unwrap();
        assert_eq!(
            FileSystem::new(dev, layout()).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_inode_location() {
        let dev = BlockDev::new(RamDisk::new(1024, 512)).unwrap();
        let fs = FileSystem::new(dev, layout()).unwrap();

        // 每块 8 个 inode
        assert_eq!(fs.inode_location(0).unwrap(), (1, 0));
        assert_eq!(fs.inode_location(7).unwrap(), (1, 7 * 64));
        assert_eq!(fs.inode_location(8).unwrap(), (2, 0));
        assert_eq!(
            fs.inode_location(16).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_alloc_free_round_trip() {
        let dev = BlockDev::new(RamDisk::new(1024, 512)).unwrap();
        let mut fs = FileSystem::new(dev, layout()).unwrap();

        let free_before = fs.free_blocks();
        let bno = fs.alloc_block(100, true).unwrap();
        assert_eq!(fs.free_blocks(), free_before - 1);
        fs.free_block(true, bno).unwrap();
        assert_eq!(fs.free_blocks(), free_before);
    }
}
