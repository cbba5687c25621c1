//! 块设备核心类型

use crate::error::{Error, ErrorKind, Result};

/// 块设备接口
///
/// 实现此 trait 以提供底层块设备访问。
///
/// # 示例
///
/// ```rust,ignore
/// use rfs_core::{BlockDevice, Result};
///
/// struct MyDevice {
///     // ...
/// }
///
/// impl BlockDevice for MyDevice {
///     fn block_size(&self) -> u32 {
///         512
///     }
///
///     fn sector_size(&self) -> u32 {
///         512
///     }
///
///     fn total_blocks(&self) -> u64 {
///         65536
///     }
///
///     fn read_blocks(&mut self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize> {
///         // 实现扇区读取
///         Ok(count as usize * self.sector_size() as usize)
///     }
///
///     fn write_blocks(&mut self, lba: u64, count: u32, buf: &[u8]) -> Result<usize> {
///         // 实现扇区写入
///         Ok(count as usize * self.sector_size() as usize)
///     }
/// }
/// ```
pub trait BlockDevice {
    /// 逻辑块大小（字节）
    fn block_size(&self) -> u32;

    /// 物理扇区大小（字节）
    fn sector_size(&self) -> u32;

    /// 总逻辑块数
    fn total_blocks(&self) -> u64;

    /// 读取扇区
    ///
    /// # 参数
    ///
    /// * `lba` - 物理地址（以扇区为单位）
    /// * `count` - 要读取的扇区数
    /// * `buf` - 目标缓冲区（大小至少为 count * sector_size）
    ///
    /// # 返回
    ///
    /// 成功返回实际读取的字节数
    fn read_blocks(&mut self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize>;

    /// 写入扇区
    ///
    /// # 参数
    ///
    /// * `lba` - 物理地址（以扇区为单位）
    /// * `count` - 要写入的扇区数
    /// * `buf` - 源缓冲区（大小至少为 count * sector_size）
    ///
    /// # 返回
    ///
    /// 成功返回实际写入的字节数
    fn write_blocks(&mut self, lba: u64, count: u32, buf: &[u8]) -> Result<usize>;

    /// 刷新设备自身的缓存
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// 是否只读
    fn is_read_only(&self) -> bool {
        false
    }
}

/// 块设备包装器
///
/// 为 RFS 提供块级访问，包含统计信息和可选的块缓存。
///
/// # 并发使用
///
/// BlockDev 本身不包含内部锁，按单线程调用方设计；
/// 多线程环境由调用者在外层加锁。
pub struct BlockDev<D> {
    /// 底层设备
    pub(super) device: D,
    /// 逻辑读取次数（包括缓存命中）
    read_count: u64,
    /// 逻辑写入次数（包括缓存写入）
    write_count: u64,
    /// 物理读取次数（实际设备操作）
    physical_read_count: u64,
    /// 物理写入次数（实际设备操作）
    physical_write_count: u64,
    /// 块缓存（可选）
    pub(super) bcache: Option<crate::cache::BlockCache>,
}

impl<D: BlockDevice> BlockDev<D> {
    /// 创建新的块设备包装器（无缓存）
    pub fn new(device: D) -> Result<Self> {
        let block_size = device.block_size();
        let sector_size = device.sector_size();

        // 块大小必须是扇区大小的整数倍
        if sector_size == 0 || block_size % sector_size != 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Block size must be a multiple of sector size",
            ));
        }

        Ok(Self {
            device,
            read_count: 0,
            write_count: 0,
            physical_read_count: 0,
            physical_write_count: 0,
            bcache: None,
        })
    }

    /// 创建带缓存的块设备包装器
    ///
    /// # 参数
    ///
    /// * `device` - 底层块设备
    /// * `cache_blocks` - 缓存块数量
    pub fn new_with_cache(device: D, cache_blocks: usize) -> Result<Self> {
        let mut bd = Self::new(device)?;
        let block_size = bd.block_size() as usize;
        bd.bcache = Some(crate::cache::BlockCache::new(cache_blocks, block_size));
        Ok(bd)
    }

    /// 创建使用默认缓存大小的块设备包装器
    ///
    /// 使用 [`crate::cache::DEFAULT_CACHE_SIZE`] 作为缓存大小
    pub fn with_default_cache(device: D) -> Result<Self> {
        Self::new_with_cache(device, crate::cache::DEFAULT_CACHE_SIZE)
    }

    /// 获取底层设备的引用
    pub fn device(&self) -> &D {
        &self.device
    }

    /// 获取底层设备的可变引用
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// 获取逻辑块大小
    pub fn block_size(&self) -> u32 {
        self.device.block_size()
    }

    /// 获取物理扇区大小
    pub fn sector_size(&self) -> u32 {
        self.device.sector_size()
    }

    /// 获取总块数
    pub fn total_blocks(&self) -> u64 {
        self.device.total_blocks()
    }

    /// 每个逻辑块的扇区数
    pub fn sectors_per_block(&self) -> u32 {
        self.block_size() / self.sector_size()
    }

    /// 逻辑块号转物理扇区号
    pub(crate) fn logical_to_physical(&self, lba: u64) -> u64 {
        lba * self.sectors_per_block() as u64
    }

    /// 获取逻辑读取次数（包括缓存命中）
    pub fn read_count(&self) -> u64 {
        self.read_count
    }

    /// 获取逻辑写入次数（包括缓存写入）
    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    /// 获取物理读取次数（实际设备操作）
    pub fn physical_read_count(&self) -> u64 {
        self.physical_read_count
    }

    /// 获取物理写入次数（实际设备操作）
    pub fn physical_write_count(&self) -> u64 {
        self.physical_write_count
    }

    pub(crate) fn inc_read_count(&mut self) {
        self.read_count += 1;
    }

    pub(crate) fn inc_write_count(&mut self) {
        self.write_count += 1;
    }

    pub(crate) fn inc_physical_read_count(&mut self) {
        self.physical_read_count += 1;
    }

    pub(crate) fn inc_physical_write_count(&mut self) {
        self.physical_write_count += 1;
    }

    pub(crate) fn add_physical_writes(&mut self, n: usize) {
        self.physical_write_count += n as u64;
    }

    /// 缓存统计信息（未启用缓存时为 None）
    pub fn cache_stats(&self) -> Option<crate::cache::CacheStats> {
        self.bcache.as_ref().map(|c| c.stats())
    }
}
