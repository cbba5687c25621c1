//! 块位置运算
//!
//! 字节位置与（逻辑块号，块内偏移）之间的纯函数换算，
//! 以及（块计数，末块偏移）形式的尺寸表示。

use super::BlockNo;

/// 文件内的块位置
///
/// `bno` 是文件内的逻辑块号（字节位置 / 块大小），`boff` 是块内
/// 剩余的字节偏移。`block` 是最近一次解析出的物理块号的单项缓存，
/// 仅在 `bno` 与映射最近解析的位置一致时有效。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPos {
    /// 逻辑块号
    pub bno: u32,
    /// 块内字节偏移
    pub boff: u32,
    /// 最近解析出的物理块号（空洞不缓存）
    pub block: Option<BlockNo>,
}

impl BlockPos {
    /// 零位置
    pub const fn zero() -> Self {
        Self {
            bno: 0,
            boff: 0,
            block: None,
        }
    }

    /// 指定逻辑块的起始位置
    pub const fn block_start(bno: u32) -> Self {
        Self {
            bno,
            boff: 0,
            block: None,
        }
    }

    /// 由字节位置换算块位置
    pub fn from_pos(block_size: u32, pos: u64) -> Self {
        Self {
            bno: (pos / block_size as u64) as u32,
            boff: (pos % block_size as u64) as u32,
            block: None,
        }
    }

    /// 换算回字节位置
    pub fn to_pos(&self, block_size: u32) -> u64 {
        self.bno as u64 * block_size as u64 + self.boff as u64
    }

    /// 按相对字节偏移移动位置（负向越过 0 时停在 0）
    ///
    /// 移动后物理块缓存失效。
    pub fn add_pos(&mut self, block_size: u32, offset: i64) {
        let pos = self.to_pos(block_size).saturating_add_signed(offset);
        *self = Self::from_pos(block_size, pos);
    }

    /// 字节位置是否越过尺寸末尾
    pub fn past_end(&self, block_size: u32, size: &BlockSize) -> bool {
        self.to_pos(block_size) >= size.to_pos(block_size)
    }

    /// 块号是否越过尺寸末尾（忽略块内偏移）
    pub fn block_past_end(&self, size: &BlockSize) -> bool {
        size.count == 0 || self.bno >= size.count
    }
}

/// 文件尺寸的块表示
///
/// `count` 是文件当前分配的逻辑块数；`offset` 是末块中的有效字节数，
/// 约定 0 表示末块全满（换算字节长度时按块大小计）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSize {
    /// 逻辑块数
    pub count: u32,
    /// 末块有效字节数（0 = 末块全满）
    pub offset: u32,
}

impl BlockSize {
    /// 规范的空尺寸
    pub const fn zero() -> Self {
        Self {
            count: 0,
            offset: 0,
        }
    }

    /// 由字节位置换算尺寸
    ///
    /// 位置 0 得到规范的空尺寸。
    pub fn from_pos(block_size: u32, pos: u64) -> Self {
        if pos == 0 {
            return Self::zero();
        }
        Self {
            count: (pos / block_size as u64) as u32 + 1,
            offset: (pos % block_size as u64) as u32,
        }
    }

    /// 换算回字节长度
    ///
    /// `offset == 0` 按"末块全满"处理。
    pub fn to_pos(&self, block_size: u32) -> u64 {
        if self.count == 0 {
            return 0;
        }
        let offset = if self.offset == 0 {
            block_size
        } else {
            self.offset
        };
        (self.count as u64 - 1) * block_size as u64 + offset as u64
    }

    /// 文件末尾对应的块位置（物理块缓存清空）
    pub fn end_bpos(&self) -> BlockPos {
        BlockPos {
            bno: self.count.saturating_sub(1),
            boff: self.offset,
            block: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BS: u32 = 512;

    #[test]
    fn test_bpos_round_trip() {
        for pos in [0u64, 1, 511, 512, 513, 512 * 7 + 100] {
            let bpos = BlockPos::from_pos(BS, pos);
            assert_eq!(bpos.to_pos(BS), pos);
        }

        let bpos = BlockPos::from_pos(BS, 1037);
        assert_eq!(bpos.bno, 2);
        assert_eq!(bpos.boff, 13);
        assert_eq!(bpos.block, None);
    }

    #[test]
    fn test_size_from_pos() {
        assert_eq!(BlockSize::from_pos(BS, 0), BlockSize::zero());

        let size = BlockSize::from_pos(BS, 1);
        assert_eq!((size.count, size.offset), (1, 1));

        // 刚好一整块：count=2, offset=0 是该编码方式的产物
        let size = BlockSize::from_pos(BS, 512);
        assert_eq!((size.count, size.offset), (2, 0));

        let size = BlockSize::from_pos(BS, 513);
        assert_eq!((size.count, size.offset), (2, 1));
    }

    #[test]
    fn test_size_to_pos() {
        assert_eq!(BlockSize::zero().to_pos(BS), 0);

        // offset == 0 表示末块全满
        let size = BlockSize {
            count: 3,
            offset: 0,
        };
        assert_eq!(size.to_pos(BS), 3 * 512);

        let size = BlockSize {
            count: 3,
            offset: 10,
        };
        assert_eq!(size.to_pos(BS), 2 * 512 + 10);
    }

    #[test]
    fn test_add_pos() {
        let mut bpos = BlockPos::from_pos(BS, 1000);
        bpos.block = Some(42);

        bpos.add_pos(BS, 100);
        assert_eq!(bpos.to_pos(BS), 1100);
        assert_eq!(bpos.block, None);

        bpos.add_pos(BS, -2000);
        assert_eq!(bpos.to_pos(BS), 0);
    }

    #[test]
    fn test_block_past_end() {
        let size = BlockSize {
            count: 4,
            offset: 100,
        };

        assert!(!BlockPos::block_start(0).block_past_end(&size));
        assert!(!BlockPos::block_start(3).block_past_end(&size));
        assert!(BlockPos::block_start(4).block_past_end(&size));

        // 空尺寸：任何块号都越界
        assert!(BlockPos::zero().block_past_end(&BlockSize::zero()));
    }

    #[test]
    fn test_pos_past_end() {
        let size = BlockSize {
            count: 2,
            offset: 10,
        };

        let inside = BlockPos::from_pos(BS, 512 + 9);
        assert!(!inside.past_end(BS, &size));

        let at_end = BlockPos::from_pos(BS, 512 + 10);
        assert!(at_end.past_end(BS, &size));

        assert!(BlockPos::zero().past_end(BS, &BlockSize::zero()));
    }

    #[test]
    fn test_end_bpos() {
        let size = BlockSize {
            count: 5,
            offset: 7,
        };
        let bpos = size.end_bpos();
        assert_eq!((bpos.bno, bpos.boff, bpos.block), (4, 7, None));

        let bpos = BlockSize::zero().end_bpos();
        assert_eq!((bpos.bno, bpos.boff), (0, 0));
    }
}
