//! 缓存块结构

use alloc::vec::Vec;
use bitflags::bitflags;

bitflags! {
    /// 缓存块标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CacheFlags: u8 {
        /// 数据已更新（有效）
        const UPTODATE = 0x01;
        /// 数据已修改（脏）
        const DIRTY    = 0x02;
    }
}

/// 缓存块
///
/// 一个块大小的内存缓冲区，与某个逻辑块地址绑定。
/// 成员关系（LRU 顺序、脏集合）由外部的 [`super::BlockCache`] 管理。
///
/// # 字段说明
///
/// - `lba`: 逻辑块地址
/// - `data`: 块数据缓冲区
/// - `flags`: 块状态标志
pub struct CacheBuffer {
    /// 逻辑块地址
    pub lba: u64,

    /// 块数据
    pub data: Vec<u8>,

    /// 块状态标志
    pub flags: CacheFlags,
}

impl core::fmt::Debug for CacheBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CacheBuffer")
            .field("lba", &self.lba)
            .field("data_len", &self.data.len())
            .field("flags", &self.flags)
            .finish()
    }
}

impl CacheBuffer {
    /// 创建新的缓存块
    ///
    /// # 参数
    ///
    /// * `lba` - 逻辑块地址
    /// * `block_size` - 块大小（字节）
    pub fn new(lba: u64, block_size: usize) -> Self {
        Self {
            lba,
            data: alloc::vec![0u8; block_size],
            flags: CacheFlags::empty(),
        }
    }

    /// 标记为脏（已修改）
    pub fn mark_dirty(&mut self) {
        self.flags.insert(CacheFlags::DIRTY);
    }

    /// 标记为干净（已写入磁盘）
    pub fn mark_clean(&mut self) {
        self.flags.remove(CacheFlags::DIRTY);
    }

    /// 检查是否是脏块
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(CacheFlags::DIRTY)
    }

    /// 标记数据有效
    pub fn mark_uptodate(&mut self) {
        self.flags.insert(CacheFlags::UPTODATE);
    }

    /// 检查数据是否有效
    pub fn is_uptodate(&self) -> bool {
        self.flags.contains(CacheFlags::UPTODATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_creation() {
        let buf = CacheBuffer::new(100, 512);
        assert_eq!(buf.lba, 100);
        assert_eq!(buf.data.len(), 512);
        assert_eq!(buf.flags, CacheFlags::empty());
    }

    #[test]
    fn test_dirty_flag() {
        let mut buf = CacheBuffer::new(100, 512);

        assert!(!buf.is_dirty());

        buf.mark_dirty();
        assert!(buf.is_dirty());
        assert!(buf.flags.contains(CacheFlags::DIRTY));

        buf.mark_clean();
        assert!(!buf.is_dirty());
    }

    #[test]
    fn test_uptodate_flag() {
        let mut buf = CacheBuffer::new(100, 512);

        assert!(!buf.is_uptodate());

        buf.mark_uptodate();
        assert!(buf.is_uptodate());
        assert!(buf.flags.contains(CacheFlags::UPTODATE));
    }
}
