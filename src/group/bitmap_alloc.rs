//! 组位图分配器实现

use crate::bitmap::{clear_bit, find_clear_bit, set_bit, test_bit};
use crate::error::{Error, ErrorKind, Result};
use alloc::vec;
use alloc::vec::Vec;

/// 组位图分配器
///
/// 持有整个文件系统的分配位图（置位 = 已分配），按组分片搜索。
/// 位图本身的介质持久化属于挂载层，这里只维护内存中的权威状态。
pub struct GroupBitmap {
    /// 分配位图
    bitmap: Vec<u8>,
    /// 管理的块总数
    blocks: u32,
    /// 每组的块数（必须是 8 的倍数，保证组在位图中字节对齐）
    group_blocks: u32,
    /// 当前空闲块数
    free_count: u32,
}

impl GroupBitmap {
    /// 创建新的分配器
    ///
    /// # 参数
    ///
    /// * `blocks` - 管理的块总数
    /// * `group_blocks` - 每组的块数（8 的倍数）
    /// * `reserved` - 开头保留的块数（superblock、位图区、inode 表等），
    ///   这些块被预先标记为已分配
    pub fn new(blocks: u32, group_blocks: u32, reserved: u32) -> Result<Self> {
        if blocks == 0 || group_blocks == 0 || group_blocks % 8 != 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "group size must be a non-zero multiple of 8",
            ));
        }
        if reserved >= blocks {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "reserved area covers whole file system",
            ));
        }

        let bytes = (blocks as usize + 7) / 8;
        let mut bitmap = vec![0u8; bytes];

        for bit in 0..reserved {
            set_bit(&mut bitmap, bit)?;
        }
        // 末尾字节中超出 blocks 的位标记为已分配，避免被搜索到
        for bit in blocks..(bytes as u32 * 8) {
            set_bit(&mut bitmap, bit)?;
        }

        Ok(Self {
            bitmap,
            blocks,
            group_blocks,
            free_count: blocks - reserved,
        })
    }

    /// 管理的块总数
    pub fn blocks(&self) -> u32 {
        self.blocks
    }

    /// 当前空闲块数
    pub fn free_count(&self) -> u32 {
        self.free_count
    }

    /// 指定块是否已分配
    pub fn is_allocated(&self, bno: u32) -> bool {
        test_bit(&self.bitmap, bno)
    }

    /// 组数
    fn group_count(&self) -> u32 {
        (self.blocks + self.group_blocks - 1) / self.group_blocks
    }

    /// 在单个组内搜索空闲块
    fn search_group(&self, group: u32, seed: u32) -> Option<u32> {
        let base = group * self.group_blocks;
        let end = (base + self.group_blocks).min(self.blocks);
        let slice = &self.bitmap[(base / 8) as usize..((end + 7) / 8) as usize];
        let seed_in_group = seed.saturating_sub(base).min(end - base - 1);
        find_clear_bit(slice, seed_in_group, end - base).map(|bit| base + bit)
    }

    /// 分配一个空闲块
    ///
    /// # 参数
    ///
    /// * `hint` - 就近提示：优先在 hint 所在的组内、从 hint 附近分配
    /// * `for_data` - true 表示数据块，false 表示映射表块（仅用于日志）
    ///
    /// # 返回
    ///
    /// 成功返回分配的块号；没有空闲块时返回 NoSpace
    pub fn alloc(&mut self, hint: u32, for_data: bool) -> Result<u32> {
        if self.free_count == 0 {
            return Err(Error::new(ErrorKind::NoSpace, "No free blocks available"));
        }

        let groups = self.group_count();
        let start_group = (hint / self.group_blocks).min(groups - 1);

        // 组间交替向上/向下展开搜索
        let mut found = None;
        'outer: for distance in 0..groups {
            let candidates = if distance == 0 {
                [Some(start_group), None]
            } else {
                [
                    start_group.checked_add(distance).filter(|&g| g < groups),
                    start_group.checked_sub(distance),
                ]
            };
            for group in candidates.into_iter().flatten() {
                if let Some(bno) = self.search_group(group, hint) {
                    found = Some(bno);
                    break 'outer;
                }
            }
        }

        match found {
            Some(bno) => {
                set_bit(&mut self.bitmap, bno)?;
                self.free_count -= 1;
                log::trace!(
                    "[GROUP] alloc: bno={} hint={} data={} free={}",
                    bno,
                    hint,
                    for_data,
                    self.free_count
                );
                Ok(bno)
            }
            None => Err(Error::new(ErrorKind::NoSpace, "No free blocks available")),
        }
    }

    /// 释放一个块
    ///
    /// # 参数
    ///
    /// * `for_data` - true 表示数据块，false 表示映射表块（仅用于日志）
    /// * `bno` - 要释放的块号
    ///
    /// # 返回
    ///
    /// 成功返回 ()；释放未分配或超出范围的块说明映射已经损坏，
    /// 返回 Corrupted
    pub fn free(&mut self, for_data: bool, bno: u32) -> Result<()> {
        if bno >= self.blocks {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "free of block beyond file system",
            ));
        }
        if !test_bit(&self.bitmap, bno) {
            return Err(Error::new(ErrorKind::Corrupted, "double free of block"));
        }

        clear_bit(&mut self.bitmap, bno)?;
        self.free_count += 1;
        log::trace!(
            "[GROUP] free: bno={} data={} free={}",
            bno,
            for_data,
            self.free_count
        );
        Ok(())
    }
}
