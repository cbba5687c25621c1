//! 缓冲句柄实现

use crate::block::{BlockDev, BlockDevice};
use crate::consts::RFS_NO_BLOCK;
use crate::error::{Error, ErrorKind, Result};
use alloc::vec::Vec;

/// 缓冲句柄
///
/// 持有一个块大小的缓冲区，并记住它绑定到哪个块号。
/// 请求一个不同的块时，当前绑定的块会先被释放（脏则写回缓存），
/// 再获取新块，即"请求不同才重读"语义。
///
/// 句柄由单个 [`crate::block_map::BlockMap`] 实例独占，不跨映射共享。
///
/// # 示例
///
/// ```rust,ignore
/// let mut handle = BufferHandle::new();
/// handle.request(&mut dev, table_block, true)?;
/// let slot = table::read_slot(&handle, 3)?;
/// handle.close(&mut dev)?;
/// ```
pub struct BufferHandle {
    /// 当前绑定的块号（None 表示未绑定）
    bno: Option<u32>,
    /// 块数据
    data: Vec<u8>,
    /// 是否被修改过
    dirty: bool,
}

impl BufferHandle {
    /// 创建未绑定的句柄
    pub fn new() -> Self {
        Self {
            bno: None,
            data: Vec::new(),
            dirty: false,
        }
    }

    /// 当前绑定的块号
    pub fn bno(&self) -> Option<u32> {
        self.bno
    }

    /// 是否已绑定
    pub fn is_bound(&self) -> bool {
        self.bno.is_some()
    }

    /// 是否被修改过
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 块数据
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// 块数据（可变）
    ///
    /// 修改后必须调用 [`BufferHandle::mark_dirty`]，否则释放时不会写回。
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// 标记缓冲区为脏，释放时写回
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// 绑定到指定块
    ///
    /// 如果句柄已经绑定到同一个块，直接返回（不重读）。
    /// 如果绑定到不同的块，先释放旧块（脏则写回）。
    ///
    /// # 参数
    ///
    /// * `dev` - 块设备
    /// * `bno` - 要绑定的块号
    /// * `read_existing` - true 时从介质读入现有内容；
    ///   false 时缓冲区内容未定义，由调用者填充（用于刚分配、
    ///   尚未写过的表块）
    pub fn request<D: BlockDevice>(
        &mut self,
        dev: &mut BlockDev<D>,
        bno: u32,
        read_existing: bool,
    ) -> Result<()> {
        if bno == RFS_NO_BLOCK {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "buffer request for unallocated block",
            ));
        }
        if bno as u64 >= dev.total_blocks() {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "buffer request beyond device",
            ));
        }

        if self.bno == Some(bno) {
            return Ok(());
        }

        self.release(dev)?;

        let block_size = dev.block_size() as usize;
        self.data.resize(block_size, 0);

        if read_existing {
            dev.read_block(bno as u64, &mut self.data)?;
        }

        self.bno = Some(bno);
        self.dirty = false;
        Ok(())
    }

    /// 释放当前绑定
    ///
    /// 缓冲区为脏时写回缓存；随后句柄回到未绑定状态。
    pub fn release<D: BlockDevice>(&mut self, dev: &mut BlockDev<D>) -> Result<()> {
        if let Some(bno) = self.bno {
            if self.dirty {
                dev.write_block(bno as u64, &self.data)?;
            }
        }
        self.bno = None;
        self.dirty = false;
        Ok(())
    }

    /// 丢弃当前绑定，不写回
    ///
    /// 用于绑定的块刚被释放回分配器的场合：此时写回会落到一个
    /// 可能被重新分配的块上。
    pub fn discard(&mut self) {
        self.bno = None;
        self.dirty = false;
    }

    /// 关闭句柄（等价于释放）
    ///
    /// 块映射关闭时对两个表句柄各调用一次。
    pub fn close<D: BlockDevice>(&mut self, dev: &mut BlockDev<D>) -> Result<()> {
        self.release(dev)
    }
}

impl Default for BufferHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    struct MockDevice {
        storage: Vec<u8>,
        total_blocks: u64,
    }

    impl MockDevice {
        fn new(total_blocks: u64) -> Self {
            Self {
                storage: vec![0u8; (total_blocks * 512) as usize],
                total_blocks,
            }
        }
    }

    impl BlockDevice for MockDevice {
        fn block_size(&self) -> u32 {
            512
        }

        fn sector_size(&self) -> u32 {
            512
        }

        fn total_blocks(&self) -> u64 {
            self.total_blocks
        }

        fn read_blocks(&mut self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize> {
            let start = (lba * 512) as usize;
            let len = (count * 512) as usize;
            buf[..len].copy_from_slice(&self.storage[start..start + len]);
            Ok(len)
        }

        fn write_blocks(&mut self, lba: u64, count: u32, buf: &[u8]) -> Result<usize> {
            let start = (lba * 512) as usize;
            let len = (count * 512) as usize;
            self.storage[start..start + len].copy_from_slice(&buf[..len]);
            Ok(len)
        }
    }

    #[test]
    fn test_request_reads_existing() {
        let mut dev = BlockDev::new(MockDevice::new(16)).unwrap();
        dev.device_mut().storage[3 * 512] = 0x7e;

        let mut handle = BufferHandle::new();
        handle.request(&mut dev, 3, true).unwrap();
        assert_eq!(handle.bno(), Some(3));
        assert_eq!(handle.data()[0], 0x7e);
    }

    #[test]
    fn test_request_same_block_no_reread() {
        let mut dev = BlockDev::new(MockDevice::new(16)).unwrap();

        let mut handle = BufferHandle::new();
        handle.request(&mut dev, 3, true).unwrap();
        let reads = dev.physical_read_count();

        handle.request(&mut dev, 3, true).unwrap();
        assert_eq!(dev.physical_read_count(), reads);
    }

    #[test]
    fn test_dirty_written_back_on_switch() {
        let mut dev = BlockDev::new(MockDevice::new(16)).unwrap();

        let mut handle = BufferHandle::new();
        handle.request(&mut dev, 3, true).unwrap();
        handle.data_mut()[0] = 0x42;
        handle.mark_dirty();

        // 换绑到另一个块触发写回
        handle.request(&mut dev, 4, true).unwrap();
        assert_eq!(dev.device().storage[3 * 512], 0x42);
        assert!(!handle.is_dirty());
    }

    #[test]
    fn test_close_writes_back() {
        let mut dev = BlockDev::new(MockDevice::new(16)).unwrap();

        let mut handle = BufferHandle::new();
        handle.request(&mut dev, 5, false).unwrap();
        handle.data_mut().fill(0x11);
        handle.mark_dirty();
        handle.close(&mut dev).unwrap();

        assert!(!handle.is_bound());
        assert_eq!(dev.device().storage[5 * 512 + 100], 0x11);
    }

    #[test]
    fn test_request_block_zero_rejected() {
        let mut dev = BlockDev::new(MockDevice::new(16)).unwrap();
        let mut handle = BufferHandle::new();
        let err = handle.request(&mut dev, 0, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
    }

    #[test]
    fn test_request_past_device_rejected() {
        let mut dev = BlockDev::new(MockDevice::new(16)).unwrap();
        let mut handle = BufferHandle::new();
        let err = handle.request(&mut dev, 16, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
    }
}
