//! inode 句柄实现

use crate::block::{BlockDev, BlockDevice};
use crate::buffer::BufferHandle;
use crate::consts::{
    RFS_INODE_BLOCKS, RFS_INODE_BLOCKS_OFF, RFS_INODE_BLOCK_COUNT_OFF,
    RFS_INODE_BLOCK_OFFSET_OFF, RFS_INODE_LAST_DATA_BLOCK_OFF, RFS_INODE_LAST_MAP_BLOCK_OFF,
};
use crate::error::{Error, ErrorKind, Result};
use crate::fs::FileSystem;
use byteorder::{BigEndian, ByteOrder};

/// inode 句柄
///
/// 绑定到 inode 表中的一条记录。记录所在的块通过自己的缓冲句柄
/// 访问；`load` / `unload` 构成作用域化的载入协议，允许嵌套
/// （载入计数归零时才真正释放缓冲）。
///
/// 字段读写必须在 `load` 和 `unload` 之间进行。
pub struct InodeHandle {
    /// inode 号
    ino: u32,
    /// 记录所在的块
    bno: u32,
    /// 记录在块内的字节偏移
    offset: usize,
    /// 记录所在块的缓冲句柄
    buffer: BufferHandle,
    /// 载入计数
    loads: u32,
}

impl core::fmt::Debug for InodeHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InodeHandle")
            .field("ino", &self.ino)
            .field("bno", &self.bno)
            .field("offset", &self.offset)
            .field("loads", &self.loads)
            .finish()
    }
}

impl InodeHandle {
    /// 打开 inode 句柄
    ///
    /// 只计算记录位置，不触发 I/O。
    ///
    /// # 参数
    ///
    /// * `fs` - 文件系统上下文
    /// * `ino` - inode 号
    pub fn open<D: BlockDevice>(fs: &FileSystem<D>, ino: u32) -> Result<Self> {
        let (bno, offset) = fs.inode_location(ino)?;
        Ok(Self {
            ino,
            bno,
            offset,
            buffer: BufferHandle::new(),
            loads: 0,
        })
    }

    /// inode 号
    pub fn ino(&self) -> u32 {
        self.ino
    }

    /// 是否已载入
    pub fn is_loaded(&self) -> bool {
        self.loads > 0
    }

    /// 载入 inode 所在的块
    ///
    /// 可以嵌套：每次 `load` 配对一次 `unload`。
    pub fn load<D: BlockDevice>(&mut self, dev: &mut BlockDev<D>) -> Result<()> {
        self.buffer.request(dev, self.bno, true)?;
        self.loads += 1;
        Ok(())
    }

    /// 卸载 inode
    ///
    /// # 参数
    ///
    /// * `dev` - 块设备
    /// * `write_back` - true 时标记缓冲为脏，载入计数归零后写回
    pub fn unload<D: BlockDevice>(&mut self, dev: &mut BlockDev<D>, write_back: bool) -> Result<()> {
        if self.loads == 0 {
            return Err(Error::new(ErrorKind::InvalidState, "inode not loaded"));
        }
        if write_back {
            self.buffer.mark_dirty();
        }
        self.loads -= 1;
        if self.loads == 0 {
            self.buffer.release(dev)?;
        }
        Ok(())
    }

    /// 关闭句柄，无条件释放缓冲（脏则写回）
    pub fn close<D: BlockDevice>(&mut self, dev: &mut BlockDev<D>) -> Result<()> {
        self.loads = 0;
        self.buffer.close(dev)
    }

    fn field(&self, off: usize, len: usize) -> Result<&[u8]> {
        if self.loads == 0 {
            return Err(Error::new(ErrorKind::InvalidState, "inode not loaded"));
        }
        Ok(&self.buffer.data()[self.offset + off..self.offset + off + len])
    }

    fn field_mut(&mut self, off: usize, len: usize) -> Result<&mut [u8]> {
        if self.loads == 0 {
            return Err(Error::new(ErrorKind::InvalidState, "inode not loaded"));
        }
        let start = self.offset + off;
        Ok(&mut self.buffer.data_mut()[start..start + len])
    }

    /// 读取指定槽位的块号
    pub fn get_block(&self, slot: usize) -> Result<u32> {
        if slot >= RFS_INODE_BLOCKS {
            return Err(Error::new(ErrorKind::InvalidInput, "inode slot out of range"));
        }
        Ok(BigEndian::read_u32(
            self.field(RFS_INODE_BLOCKS_OFF + slot * 4, 4)?,
        ))
    }

    /// 写入指定槽位的块号
    pub fn set_block(&mut self, slot: usize, bno: u32) -> Result<()> {
        if slot >= RFS_INODE_BLOCKS {
            return Err(Error::new(ErrorKind::InvalidInput, "inode slot out of range"));
        }
        BigEndian::write_u32(self.field_mut(RFS_INODE_BLOCKS_OFF + slot * 4, 4)?, bno);
        self.buffer.mark_dirty();
        Ok(())
    }

    /// 读取块计数
    pub fn get_block_count(&self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.field(RFS_INODE_BLOCK_COUNT_OFF, 4)?))
    }

    /// 写入块计数
    pub fn set_block_count(&mut self, count: u32) -> Result<()> {
        BigEndian::write_u32(self.field_mut(RFS_INODE_BLOCK_COUNT_OFF, 4)?, count);
        self.buffer.mark_dirty();
        Ok(())
    }

    /// 读取末块有效字节数
    pub fn get_block_offset(&self) -> Result<u32> {
        Ok(BigEndian::read_u16(self.field(RFS_INODE_BLOCK_OFFSET_OFF, 2)?) as u32)
    }

    /// 写入末块有效字节数
    pub fn set_block_offset(&mut self, offset: u32) -> Result<()> {
        BigEndian::write_u16(
            self.field_mut(RFS_INODE_BLOCK_OFFSET_OFF, 2)?,
            offset as u16,
        );
        self.buffer.mark_dirty();
        Ok(())
    }

    /// 读取最近映射块提示
    pub fn get_last_map_block(&self) -> Result<u32> {
        Ok(BigEndian::read_u32(
            self.field(RFS_INODE_LAST_MAP_BLOCK_OFF, 4)?,
        ))
    }

    /// 写入最近映射块提示
    pub fn set_last_map_block(&mut self, bno: u32) -> Result<()> {
        BigEndian::write_u32(self.field_mut(RFS_INODE_LAST_MAP_BLOCK_OFF, 4)?, bno);
        self.buffer.mark_dirty();
        Ok(())
    }

    /// 读取最近数据块提示
    pub fn get_last_data_block(&self) -> Result<u32> {
        Ok(BigEndian::read_u32(
            self.field(RFS_INODE_LAST_DATA_BLOCK_OFF, 4)?,
        ))
    }

    /// 写入最近数据块提示
    pub fn set_last_data_block(&mut self, bno: u32) -> Result<()> {
        BigEndian::write_u32(self.field_mut(RFS_INODE_LAST_DATA_BLOCK_OFF, 4)?, bno);
        self.buffer.mark_dirty();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{FileSystem, FsLayout};
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

    impl crate::block::BlockDevice for RamDisk {
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

    fn test_fs() -> FileSystem<RamDisk> {
        let dev = BlockDev::new(RamDisk::new(256, 512)).unwrap();
        let layout = FsLayout {
            inode_origin: 1,
            inode_count: 16,
            group_blocks: 64,
        };
        FileSystem::new(dev, layout).unwrap()
    }

    #[test]
    fn test_field_round_trip() {
        let mut fs = test_fs();
        let mut inode = InodeHandle::open(&fs, 3).unwrap();

        inode.load(fs.dev_mut()).unwrap();
        inode.set_block_count(7).unwrap();
        inode.set_block_offset(100).unwrap();
        inode.set_last_map_block(0x1234).unwrap();
        inode.set_last_data_block(0x5678).unwrap();
        for slot in 0..RFS_INODE_BLOCKS {
            inode.set_block(slot, 100 + slot as u32).unwrap();
        }
        inode.unload(fs.dev_mut(), true).unwrap();

        // 重新载入，字段应当已持久化
        let mut inode = InodeHandle::open(&fs, 3).unwrap();
        inode.load(fs.dev_mut()).unwrap();
        assert_eq!(inode.get_block_count().unwrap(), 7);
        assert_eq!(inode.get_block_offset().unwrap(), 100);
        assert_eq!(inode.get_last_map_block().unwrap(), 0x1234);
        assert_eq!(inode.get_last_data_block().unwrap(), 0x5678);
        for slot in 0..RFS_INODE_BLOCKS {
            assert_eq!(inode.get_block(slot).unwrap(), 100 + slot as u32);
        }
        inode.unload(fs.dev_mut(), false).unwrap();
    }

    #[test]
    fn test_records_do_not_overlap() {
        let mut fs = test_fs();

        let mut a = InodeHandle::open(&fs, 0).unwrap();
        a.load(fs.dev_mut()).unwrap();
        a.set_block_count(11).unwrap();
        a.unload(fs.dev_mut(), true).unwrap();

        let mut b = InodeHandle::open(&fs, 1).unwrap();
        b.load(fs.dev_mut()).unwrap();
        assert_eq!(b.get_block_count().unwrap(), 0);
        b.unload(fs.dev_mut(), false).unwrap();

        let mut a = InodeHandle::open(&fs, 0).unwrap();
        a.load(fs.dev_mut()).unwrap();
        assert_eq!(a.get_block_count().unwrap(), 11);
        a.unload(fs.dev_mut(), false).unwrap();
    }

    #[test]
    fn test_debug_format() {
        let fs = test_fs();
        let inode = InodeHandle::open(&fs, 3).unwrap();
        let s = alloc::format!("{:?}", inode);
        assert!(s.contains("ino: 3"));
    }

    #[test]
    fn test_unloaded_access_rejected() {
        let fs = test_fs();
        let inode = InodeHandle::open(&fs, 0).unwrap();
        assert_eq!(
            inode.get_block_count().unwrap_err().kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn test_slot_bounds() {
        let mut fs = test_fs();
        let mut inode = InodeHandle::open(&fs, 0).unwrap();
        inode.load(fs.dev_mut()).unwrap();
        assert_eq!(
            inode.get_block(RFS_INODE_BLOCKS).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        inode.unload(fs.dev_mut(), false).unwrap();
    }

    #[test]
    fn test_bad_ino_rejected() {
        let fs = test_fs();
        assert_eq!(
            InodeHandle::open(&fs, 1000).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_nested_load() {
        let mut fs = test_fs();
        let mut inode = InodeHandle::open(&fs, 0).unwrap();

        inode.load(fs.dev_mut()).unwrap();
        inode.load(fs.dev_mut()).unwrap();
        inode.unload(fs.dev_mut(), false).unwrap();
        assert!(inode.is_loaded());
        inode.unload(fs.dev_mut(), false).unwrap();
        assert!(!inode.is_loaded());
    }
}
