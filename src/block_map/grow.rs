//! 块映射增长
//!
//! 逐块追加并在跨越布局边界时升级布局（直接 → 一级 → 二级）。
//! 每追加一块都是一个独立的一致性单元：块分配、表写入、计数
//! 递增全部完成后才进入下一块，任何一步失败都把已分配的块退
//! 还给分配器再返回错误，映射停留在前一个自洽状态。

use super::table;
use super::{BlockMap, BlockNo, Representation};
use crate::block::BlockDevice;
use crate::buffer::BufferHandle;
use crate::consts::{RFS_INODE_BLOCKS, RFS_NO_BLOCK};
use crate::error::{Error, ErrorKind, Result};
use crate::fs::FileSystem;

impl BlockMap {
    /// 在映射末尾追加逻辑块
    ///
    /// 每个新逻辑块都分配一个数据块，需要时同时分配间接表块。
    /// 分配使用映射记录的就近提示，让同一文件的块尽量聚在一起。
    ///
    /// # 参数
    ///
    /// * `fs` - 文件系统上下文
    /// * `blocks` - 要追加的逻辑块数
    ///
    /// # 返回
    ///
    /// 本次追加的第一个数据块的块号；`blocks` 为 0 时返回 0。
    /// 追加后的总块数达到或超过映射容量上限时返回 `TooLarge`，
    /// 不做任何分配。
    pub fn grow<D: BlockDevice>(
        &mut self,
        fs: &mut FileSystem<D>,
        blocks: u32,
    ) -> Result<BlockNo> {
        log::trace!(
            "[BMAP] grow: ino={} count={} blocks={}",
            self.ino,
            self.size.count,
            blocks
        );

        if self.size.count as u64 + blocks as u64 >= fs.max_block_map_blocks() as u64 {
            return Err(Error::new(
                ErrorKind::TooLarge,
                "map would exceed maximum block count",
            ));
        }

        let mut first = RFS_NO_BLOCK;

        for b in 0..blocks {
            let block = fs.alloc_block(self.last_data_block, true)?;

            if let Err(e) = self.place_block(fs, block) {
                let _ = fs.free_block(true, block);
                return Err(e);
            }

            self.size.count += 1;
            self.size.offset = 0;

            if b == 0 {
                first = block;
            }
            self.last_data_block = block;
            self.dirty = true;
        }

        Ok(first)
    }

    /// 把一个新分配的数据块挂到映射的下一个逻辑位置
    ///
    /// 挂接位置由当前块数决定。失败时本函数已分配的表块被退还，
    /// 数据块本身由调用者退还。
    fn place_block<D: BlockDevice>(
        &mut self,
        fs: &mut FileSystem<D>,
        block: BlockNo,
    ) -> Result<()> {
        let count = self.size.count;

        if (count as usize) < RFS_INODE_BLOCKS {
            let mut slots = *self.repr.slots();
            slots[count as usize] = block;
            self.repr = Representation::Direct(slots);
            return Ok(());
        }

        let bpb = fs.blocks_per_block();
        let direct = count % bpb;
        let singly = count / bpb;
        let mut slots = *self.repr.slots();

        if count < fs.block_map_singly_blocks() {
            // 一级布局。direct 为 0 说明进入了一张新表；从直接布局
            // 升级的那一次 direct 等于槽位数，同样需要新表并把原有
            // 的直接块号搬进去。
            if direct == 0 || (singly == 0 && direct as usize == RFS_INODE_BLOCKS) {
                let upping = count as usize == RFS_INODE_BLOCKS;
                let table_block = Self::indirect_alloc(
                    fs,
                    &mut self.singly_buffer,
                    &mut self.last_map_block,
                    &mut slots,
                    upping,
                )?;
                slots[singly as usize] = table_block;
            } else {
                self.singly_buffer
                    .request(fs.dev_mut(), slots[singly as usize], true)?;
            }

            table::write_slot(&mut self.singly_buffer, direct, block)?;
            self.repr = Representation::Singly(slots);
            return Ok(());
        }

        // 二级布局
        let doubly = singly / bpb;
        let singly_idx = singly % bpb;

        if direct == 0 {
            // 新的一级表。一级表序号也到边界时还需要新的二级表，
            // 从一级布局升级的那一次要把原有的一级表块号搬进去。
            let singly_block = Self::indirect_alloc(
                fs,
                &mut self.singly_buffer,
                &mut self.last_map_block,
                &mut slots,
                false,
            )?;

            let attached = if singly_idx == 0
                || (doubly == 0 && singly_idx as usize == RFS_INODE_BLOCKS)
            {
                let upping = count == fs.block_map_singly_blocks();
                Self::indirect_alloc(
                    fs,
                    &mut self.doubly_buffer,
                    &mut self.last_map_block,
                    &mut slots,
                    upping,
                )
                .map(|table_block| slots[doubly as usize] = table_block)
            } else {
                self.doubly_buffer
                    .request(fs.dev_mut(), slots[doubly as usize], true)
            };

            if let Err(e) = attached {
                let _ = fs.free_block(false, singly_block);
                return Err(e);
            }

            // 此时 singly_buffer 仍绑定在刚初始化的新表上
            table::write_slot(&mut self.doubly_buffer, singly_idx, singly_block)?;
        } else {
            self.doubly_buffer
                .request(fs.dev_mut(), slots[doubly as usize], true)?;
            let singly_block = table::read_slot(&self.doubly_buffer, singly_idx)?;
            self.singly_buffer.request(fs.dev_mut(), singly_block, true)?;
        }

        table::write_slot(&mut self.singly_buffer, direct, block)?;
        self.repr = Representation::Doubly(slots);
        Ok(())
    }

    /// 分配并初始化一张间接表
    ///
    /// 新表整体清零。upping 时把 inode 槽位的现有内容复制到表的
    /// 前几个槽位并清空槽位数组；调用者随后把返回的表块号放进
    /// 正确的位置。
    ///
    /// # 返回
    ///
    /// 新表的块号。缓冲绑定失败时刚分配的表块被退还。
    fn indirect_alloc<D: BlockDevice>(
        fs: &mut FileSystem<D>,
        buffer: &mut BufferHandle,
        last_map_block: &mut BlockNo,
        slots: &mut [BlockNo; RFS_INODE_BLOCKS],
        upping: bool,
    ) -> Result<BlockNo> {
        let new_block = fs.alloc_block(*last_map_block, false)?;

        if let Err(e) = buffer.request(fs.dev_mut(), new_block, false) {
            let _ = fs.free_block(false, new_block);
            return Err(e);
        }

        table::zero_fill(buffer);

        if upping {
            log::debug!("[BMAP] grow: upping to block {}", new_block);
            for (b, slot) in slots.iter().enumerate() {
                table::write_slot(buffer, b as u32, *slot)?;
            }
            *slots = [RFS_NO_BLOCK; RFS_INODE_BLOCKS];
        }

        *last_map_block = new_block;
        Ok(new_block)
    }
}
