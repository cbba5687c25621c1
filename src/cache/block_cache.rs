//! 块缓存实现（基于 lru crate）
//!
//! LRU 缓存自动管理访问顺序；脏块单独用集合追踪，驱逐只发生在
//! 干净块上，绝不驱逐脏块（驱逐脏块会导致数据丢失）。

use crate::{
    block::BlockDevice,
    error::{Error, ErrorKind, Result},
};

use super::buffer::CacheBuffer;
use alloc::collections::BTreeSet; // no_std 环境使用 BTreeSet
use core::num::NonZeroUsize;
use lru::LruCache;

/// 默认缓存块数量
pub const DEFAULT_CACHE_SIZE: usize = 64;

/// 缓存统计信息
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// 总访问次数
    pub total_accesses: u64,
    /// 缓存命中次数
    pub hits: u64,
    /// 缓存未命中次数
    pub misses: u64,
    /// 脏块写回次数
    pub writebacks: u64,
    /// 当前脏块数量
    pub dirty_blocks: usize,
}

impl CacheStats {
    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total_accesses == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_accesses as f64
        }
    }
}

/// 块缓存
pub struct BlockCache {
    /// LRU缓存核心：自动管理块的生命周期和访问顺序
    cache: LruCache<u64, CacheBuffer>,

    /// 脏块集合：追踪需要写回的块
    dirty_set: BTreeSet<u64>,

    /// 块大小（字节）
    block_size: usize,

    /// 统计信息
    stats: CacheStats,
}

impl BlockCache {
    /// 创建新的块缓存
    ///
    /// # 参数
    ///
    /// * `capacity` - 缓存容量（块数量）
    /// * `block_size` - 块大小（字节）
    pub fn new(capacity: usize, block_size: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            dirty_set: BTreeSet::new(),
            block_size,
            stats: CacheStats::default(),
        }
    }

    /// 分配缓存块
    ///
    /// # 参数
    ///
    /// * `lba` - 逻辑块地址
    ///
    /// # 返回
    ///
    /// `(块的可变引用, 是否是新分配)`
    /// - 如果块已存在：返回 `(块, false)` 并自动更新LRU
    /// - 如果块不存在：分配新块返回 `(块, true)`，满时自动驱逐干净的LRU块
    /// - 如果所有块都脏且缓存满，返回 NoSpace 错误，调用者应先 flush 再重试
    pub fn alloc(&mut self, lba: u64) -> Result<(&mut CacheBuffer, bool)> {
        self.stats.total_accesses += 1;

        if self.cache.contains(&lba) {
            self.stats.hits += 1;
            // get_mut 会自动更新LRU顺序
            if let Some(buf) = self.cache.get_mut(&lba) {
                log::trace!("[CACHE] alloc lba={:#x} HIT (dirty={})", lba, buf.is_dirty());
            }
            // contains 为真时必然存在
            return self
                .cache
                .get_mut(&lba)
                .map(|buf| (buf, false))
                .ok_or(Error::new(ErrorKind::InvalidState, "cache entry vanished"));
        }

        self.stats.misses += 1;
        log::trace!(
            "[CACHE] alloc lba={:#x} MISS, cache={}/{}",
            lba,
            self.cache.len(),
            self.cache.cap().get()
        );

        // 新块：满时需要驱逐
        if self.cache.len() >= self.cache.cap().get() {
            self.evict_for_new_block()?;
        }

        let buf = CacheBuffer::new(lba, self.block_size);
        self.cache.put(lba, buf);

        self.cache
            .get_mut(&lba)
            .map(|buf| (buf, true))
            .ok_or(Error::new(ErrorKind::InvalidState, "cache entry vanished"))
    }

    /// 驱逐一个块为新块腾出空间
    ///
    /// 从LRU端开始查找第一个非脏块并驱逐。
    /// 如果所有块都是脏的，返回 NoSpace 错误。
    fn evict_for_new_block(&mut self) -> Result<()> {
        // lru crate 的 iter() 从 MRU 端开始，反向遍历得到 LRU 优先
        let keys: alloc::vec::Vec<u64> = self.cache.iter().rev().map(|(k, _)| *k).collect();

        for lba in keys.iter() {
            if !self.dirty_set.contains(lba) {
                self.cache.pop(lba);
                log::trace!("[CACHE] evicted clean block lba={:#x}", lba);
                return Ok(());
            }
        }

        log::error!(
            "[CACHE] cannot evict: all {} blocks are dirty, need flush",
            self.cache.len()
        );
        Err(Error::new(
            ErrorKind::NoSpace,
            "All cache blocks are dirty, cannot evict. Caller must flush before alloc.",
        ))
    }

    /// 查找块
    ///
    /// # 参数
    ///
    /// * `lba` - 逻辑块地址
    ///
    /// # 返回
    ///
    /// 如果找到返回块的可变引用，否则返回 None。
    /// get_mut 会自动更新LRU顺序。
    pub fn find_get(&mut self, lba: u64) -> Option<&mut CacheBuffer> {
        self.stats.total_accesses += 1;

        if self.cache.contains(&lba) {
            self.stats.hits += 1;
            self.cache.get_mut(&lba)
        } else {
            self.stats.misses += 1;
            None
        }
    }

    /// 标记块为脏
    ///
    /// # 参数
    ///
    /// * `lba` - 逻辑块地址
    pub fn mark_dirty(&mut self, lba: u64) {
        self.dirty_set.insert(lba);
        if let Some(buf) = self.cache.get_mut(&lba) {
            buf.mark_dirty();
        }
    }

    /// 只读访问缓存块数据
    ///
    /// # 参数
    ///
    /// * `lba` - 逻辑块地址
    ///
    /// # 返回
    ///
    /// 块在缓存中且数据有效时返回数据切片，否则返回 NotFound 错误
    pub fn read_block(&self, lba: u64) -> Result<&[u8]> {
        if let Some(buf) = self.cache.peek(&lba) {
            if buf.is_uptodate() {
                return Ok(&buf.data);
            }
        }
        Err(Error::new(ErrorKind::NotFound, "Block not in cache"))
    }

    /// 写入缓存块数据
    ///
    /// 块不在缓存中时先分配；写入后标记为脏。
    ///
    /// # 参数
    ///
    /// * `lba` - 逻辑块地址
    /// * `data` - 要写入的数据
    ///
    /// # 返回
    ///
    /// 成功返回写入的字节数
    pub fn write_block(&mut self, lba: u64, data: &[u8]) -> Result<usize> {
        let len;
        {
            let (buf, _is_new) = self.alloc(lba)?;
            len = data.len().min(buf.data.len());
            buf.data[..len].copy_from_slice(&data[..len]);
            buf.mark_uptodate();
            buf.mark_dirty();
        }
        self.dirty_set.insert(lba);
        Ok(len)
    }

    /// 刷新单个块到设备
    ///
    /// # 参数
    ///
    /// * `lba` - 逻辑块地址
    /// * `device` - 块设备
    /// * `sectors_per_block` - 每个逻辑块的扇区数
    ///
    /// # 返回
    ///
    /// 块存在且为脏时写回并返回 true，否则返回 false
    pub fn flush_lba<D: BlockDevice>(
        &mut self,
        lba: u64,
        device: &mut D,
        sectors_per_block: u32,
    ) -> Result<bool> {
        if let Some(buf) = self.cache.peek_mut(&lba) {
            if buf.is_dirty() {
                let pba = lba * sectors_per_block as u64;
                device.write_blocks(pba, sectors_per_block, &buf.data)?;

                buf.mark_clean();
                self.dirty_set.remove(&lba);
                self.stats.writebacks += 1;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// 刷新所有脏块到设备
    ///
    /// # 参数
    ///
    /// * `device` - 块设备
    /// * `sectors_per_block` - 每个逻辑块的扇区数
    ///
    /// # 返回
    ///
    /// 成功返回写回的块数
    pub fn flush_all<D: BlockDevice>(
        &mut self,
        device: &mut D,
        sectors_per_block: u32,
    ) -> Result<usize> {
        let dirty_lbas: alloc::vec::Vec<u64> = self.dirty_set.iter().copied().collect();
        let mut count = 0;

        log::debug!("[CACHE] flushing {} dirty blocks", dirty_lbas.len());

        for lba in dirty_lbas {
            if self.flush_lba(lba, device, sectors_per_block)? {
                count += 1;
            }
        }

        self.dirty_set.clear();
        Ok(count)
    }

    /// 使块无效（从缓存中移除）
    ///
    /// # 参数
    ///
    /// * `lba` - 逻辑块地址
    pub fn invalidate(&mut self, lba: u64) {
        self.cache.pop(&lba);
        self.dirty_set.remove(&lba);
    }

    /// 获取缓存统计信息
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.dirty_blocks = self.dirty_set.len();
        stats
    }

    /// 获取缓存容量
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }

    /// 获取当前缓存块数量
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// 检查缓存是否为空
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// 获取脏块数量
    pub fn dirty_count(&self) -> usize {
        self.dirty_set.len()
    }

    /// 清空缓存（不刷新脏块！）
    ///
    /// 警告：会丢失所有脏块数据
    pub fn clear(&mut self) {
        self.cache.clear();
        self.dirty_set.clear();
    }
}

impl core::fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockCache")
            .field("capacity", &self.cache.cap())
            .field("len", &self.cache.len())
            .field("dirty_count", &self.dirty_set.len())
            .field("block_size", &self.block_size)
            .field("stats", &self.stats)
            .finish()
    }
}
