//! 逻辑块号解析
//!
//! 把文件内的逻辑块位置翻译成设备块号。直接布局只查槽位数组，
//! 间接布局最多经过两级表块。最近一次解析的结果缓存在映射的
//! 位置字段里，顺序访问时同一块的重复解析不触发表块重读。

use super::pos::BlockPos;
use super::table;
use super::{BlockMap, BlockNo, Representation};
use crate::block::BlockDevice;
use crate::buffer::BufferHandle;
use crate::error::{Error, ErrorKind, Result};
use crate::fs::FileSystem;

impl BlockMap {
    /// 解析一个逻辑位置对应的设备块号
    ///
    /// 返回 0 表示该逻辑块是空洞。解析成功后位置连同结果记入
    /// 映射的单项缓存（空洞不缓存）。
    ///
    /// # 参数
    ///
    /// * `fs` - 文件系统上下文
    /// * `bpos` - 要解析的逻辑位置
    ///
    /// # 返回
    ///
    /// 位置超出映射当前尺寸时返回 `RangeExceeded`。
    pub fn find<D: BlockDevice>(
        &mut self,
        fs: &mut FileSystem<D>,
        bpos: BlockPos,
    ) -> Result<BlockNo> {
        if bpos.block_past_end(&self.size) {
            return Err(Error::new(
                ErrorKind::RangeExceeded,
                "block position past end of map",
            ));
        }

        if self.bpos.bno == bpos.bno {
            if let Some(block) = self.bpos.block {
                self.bpos.boff = bpos.boff;
                return Ok(block);
            }
        }

        let bno = bpos.bno;
        let bpb = fs.blocks_per_block();

        let block = match self.repr {
            Representation::Direct(slots) => slots[bno as usize],
            Representation::Singly(slots) => {
                let singly = bno / bpb;
                let offset = bno % bpb;
                Self::find_indirect(
                    fs,
                    &mut self.singly_buffer,
                    slots[singly as usize],
                    offset,
                )?
            }
            Representation::Doubly(slots) => {
                let doubly = bno / (bpb * bpb);
                let doubly_singly = (bno / bpb) % bpb;
                let offset = bno % bpb;
                let singly = Self::find_indirect(
                    fs,
                    &mut self.doubly_buffer,
                    slots[doubly as usize],
                    doubly_singly,
                )?;
                Self::find_indirect(fs, &mut self.singly_buffer, singly, offset)?
            }
        };

        self.bpos = BlockPos {
            bno,
            boff: bpos.boff,
            block: (block != 0).then_some(block),
        };
        Ok(block)
    }

    /// 从当前位置相对移动后解析
    ///
    /// 位置的移动即使解析失败也保留，与顺序读写的游标语义一致。
    pub fn seek<D: BlockDevice>(
        &mut self,
        fs: &mut FileSystem<D>,
        offset: i64,
    ) -> Result<BlockNo> {
        let mut bpos = self.bpos;
        bpos.add_pos(fs.block_size(), offset);
        self.bpos = bpos;
        self.find(fs, bpos)
    }

    /// 解析当前位置的下一个逻辑块
    pub fn next_block<D: BlockDevice>(&mut self, fs: &mut FileSystem<D>) -> Result<BlockNo> {
        let bpos = BlockPos::block_start(self.bpos.bno + 1);
        self.find(fs, bpos)
    }

    /// 从一张间接表中读出一个槽位
    ///
    /// 表块经由映射持有的缓冲句柄访问，连续命中同一张表时不重读。
    pub(super) fn find_indirect<D: BlockDevice>(
        fs: &mut FileSystem<D>,
        buffer: &mut BufferHandle,
        table: BlockNo,
        index: u32,
    ) -> Result<BlockNo> {
        buffer.request(fs.dev_mut(), table, true)?;
        let block = table::read_slot(buffer, index)?;
        if block != 0 && block >= fs.blocks() {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "mapped block beyond file system",
            ));
        }
        Ok(block)
    }
}
