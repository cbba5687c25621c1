//! 块映射收缩
//!
//! 从末尾逐块回收，表变空时回收表块并在跨回布局边界时降级布局
//! （二级 → 一级 → 直接）。与增长一样以单块为一致性单元，任何
//! 一步失败映射都停留在一个自洽状态。

use super::table;
use super::{BlockMap, BlockNo, Representation};
use crate::block::BlockDevice;
use crate::buffer::BufferHandle;
use crate::consts::{RFS_INODE_BLOCKS, RFS_NO_BLOCK};
use crate::error::{Error, ErrorKind, Result};
use crate::fs::FileSystem;

impl BlockMap {
    /// 从映射末尾回收逻辑块
    ///
    /// 超出当前块数的请求按当前块数截断。回收到 0 块时两个就近
    /// 提示一并清零。收缩后当前位置若落在映射之外，被拉回到新
    /// 的末尾。
    ///
    /// # 参数
    ///
    /// * `fs` - 文件系统上下文
    /// * `blocks` - 要回收的逻辑块数
    pub fn shrink<D: BlockDevice>(
        &mut self,
        fs: &mut FileSystem<D>,
        blocks: u32,
    ) -> Result<()> {
        log::trace!(
            "[BMAP] shrink: ino={} count={} blocks={}",
            self.ino,
            self.size.count,
            blocks
        );

        if self.size.count == 0 {
            return Ok(());
        }

        let mut blocks = blocks.min(self.size.count);
        let bpb = fs.blocks_per_block();

        while blocks > 0 {
            let block = self.size.count - 1;
            let mut slots = *self.repr.slots();
            let block_to_free;

            if (block as usize) < RFS_INODE_BLOCKS {
                block_to_free = slots[block as usize];
                slots[block as usize] = RFS_NO_BLOCK;
                self.repr = Representation::Direct(slots);
            } else {
                let direct = block % bpb;
                let singly = block / bpb;

                if block < fs.block_map_singly_blocks() {
                    self.singly_buffer
                        .request(fs.dev_mut(), slots[singly as usize], true)?;
                    block_to_free = table::read_slot(&self.singly_buffer, direct)?;

                    let downed = Self::indirect_shrink(
                        fs,
                        &mut self.singly_buffer,
                        &mut self.last_map_block,
                        &mut slots,
                        singly,
                        direct,
                    )?;
                    self.repr = if downed {
                        Representation::Direct(slots)
                    } else {
                        Representation::Singly(slots)
                    };
                } else if block < fs.block_map_doubly_blocks() {
                    let doubly = singly / bpb;
                    let doubly_singly = singly % bpb;

                    self.doubly_buffer
                        .request(fs.dev_mut(), slots[doubly as usize], true)?;
                    let singly_table = table::read_slot(&self.doubly_buffer, doubly_singly)?;

                    self.singly_buffer.request(fs.dev_mut(), singly_table, true)?;
                    block_to_free = table::read_slot(&self.singly_buffer, direct)?;

                    if direct == 0 {
                        // 一级表已空，回收表块本身
                        fs.free_block(false, singly_table)?;
                        self.last_map_block = singly_table;
                        self.singly_buffer.discard();

                        let downed = Self::indirect_shrink(
                            fs,
                            &mut self.doubly_buffer,
                            &mut self.last_map_block,
                            &mut slots,
                            doubly,
                            doubly_singly,
                        )?;
                        self.repr = if downed {
                            Representation::Singly(slots)
                        } else {
                            Representation::Doubly(slots)
                        };
                    }
                } else {
                    return Err(Error::new(
                        ErrorKind::Corrupted,
                        "block count beyond map capacity",
                    ));
                }
            }

            if block_to_free == RFS_NO_BLOCK {
                return Err(Error::new(
                    ErrorKind::Corrupted,
                    "map references an unallocated block",
                ));
            }

            fs.free_block(true, block_to_free)?;
            self.size.count -= 1;
            self.size.offset = 0;
            self.last_data_block = block_to_free;
            self.dirty = true;
            blocks -= 1;
        }

        if self.size.count == 0 {
            self.last_map_block = RFS_NO_BLOCK;
            self.last_data_block = RFS_NO_BLOCK;
        }

        if self.bpos.block_past_end(&self.size) {
            self.bpos = self.size.end_bpos();
        }

        Ok(())
    }

    /// 回收映射持有的全部块
    pub fn free_all<D: BlockDevice>(&mut self, fs: &mut FileSystem<D>) -> Result<()> {
        self.shrink(fs, self.size.count)
    }

    /// 收缩后维护一张间接表的挂接
    ///
    /// 被删的是表中第一个条目（表已空）时回收表块；只剩一张表且
    /// 剩余块数落回槽位数时把表中内容搬回 inode 槽位后回收表块
    /// （降级）。
    ///
    /// # 返回
    ///
    /// true 表示发生了降级，调用者据此切换布局。
    fn indirect_shrink<D: BlockDevice>(
        fs: &mut FileSystem<D>,
        buffer: &mut BufferHandle,
        last_map_block: &mut BlockNo,
        slots: &mut [BlockNo; RFS_INODE_BLOCKS],
        indirect: u32,
        index: u32,
    ) -> Result<bool> {
        let downing = indirect == 0 && index as usize == RFS_INODE_BLOCKS;

        if index != 0 && !downing {
            return Ok(false);
        }

        let block_to_free = slots[indirect as usize];

        if downing {
            for (b, slot) in slots.iter_mut().enumerate() {
                *slot = table::read_slot(buffer, b as u32)?;
            }
        } else {
            slots[indirect as usize] = RFS_NO_BLOCK;
        }

        fs.free_block(false, block_to_free)?;
        *last_map_block = block_to_free;

        if buffer.bno() == Some(block_to_free) {
            buffer.discard();
        }

        Ok(downing)
    }
}
