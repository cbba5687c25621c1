//! 间接表槽位访问
//!
//! 间接表是一个块大小的块号数组，槽位为大端序 u32。
//! 这里提供带边界检查的类型化访问，读取时把全 1 位模式
//! （旧介质上未初始化槽位的填充值）归一化为 0（空洞）。

use crate::buffer::BufferHandle;
use crate::consts::RFS_BLOCK_NO_SIZE;
use crate::error::{Error, ErrorKind, Result};
use byteorder::{BigEndian, ByteOrder};

use super::BlockNo;

/// 读取表中指定槽位的块号
///
/// # 参数
///
/// * `buffer` - 已绑定到表块的缓冲句柄
/// * `index` - 槽位索引（块号个数，不是字节偏移）
///
/// # 返回
///
/// 槽位的块号；全 1 模式归一化为 0
pub fn read_slot(buffer: &BufferHandle, index: u32) -> Result<BlockNo> {
    let off = slot_offset(buffer, index)?;
    let value = BigEndian::read_u32(&buffer.data()[off..off + 4]);
    // 全 1 是未初始化槽位的旧填充值，等同空洞
    if value == u32::MAX {
        return Ok(0);
    }
    Ok(value)
}

/// 写入表中指定槽位的块号并标记缓冲为脏
///
/// # 参数
///
/// * `buffer` - 已绑定到表块的缓冲句柄
/// * `index` - 槽位索引
/// * `value` - 块号
pub fn write_slot(buffer: &mut BufferHandle, index: u32, value: BlockNo) -> Result<()> {
    let off = slot_offset(buffer, index)?;
    BigEndian::write_u32(&mut buffer.data_mut()[off..off + 4], value);
    buffer.mark_dirty();
    Ok(())
}

/// 将整个表清零并标记缓冲为脏
///
/// 新分配的表块在首次使用前必须整体清零，这样
/// "未分配槽位读作 0" 的规则才不依赖介质上的陈旧内容。
pub fn zero_fill(buffer: &mut BufferHandle) {
    buffer.data_mut().fill(0);
    buffer.mark_dirty();
}

fn slot_offset(buffer: &BufferHandle, index: u32) -> Result<usize> {
    if !buffer.is_bound() {
        return Err(Error::new(
            ErrorKind::InvalidState,
            "table buffer not bound",
        ));
    }
    let slots = buffer.data().len() as u32 / RFS_BLOCK_NO_SIZE;
    if index >= slots {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "table slot index out of range",
        ));
    }
    Ok((index * RFS_BLOCK_NO_SIZE) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockDev, BlockDevice};
    use alloc::vec;
    use alloc::vec::Vec;

    struct RamDisk {
        storage: Vec<u8>,
    }

    impl BlockDevice for RamDisk {
        fn block_size(&self) -> u32 {
            512
        }

        fn sector_size(&self) -> u32 {
            512
        }

        fn total_blocks(&self) -> u64 {
            8
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

    fn bound_handle() -> (BlockDev<RamDisk>, BufferHandle) {
        let mut dev = BlockDev::new(RamDisk {
            storage: vec![0u8; 8 * 512],
        })
        .unwrap();
        let mut handle = BufferHandle::new();
        handle.request(&mut dev, 2, true).unwrap();
        (dev, handle)
    }

    #[test]
    fn test_slot_round_trip() {
        let (_dev, mut handle) = bound_handle();

        write_slot(&mut handle, 0, 0x11223344).unwrap();
        write_slot(&mut handle, 127, 7).unwrap();

        assert_eq!(read_slot(&handle, 0).unwrap(), 0x11223344);
        assert_eq!(read_slot(&handle, 127).unwrap(), 7);
        assert!(handle.is_dirty());

        // 大端序落盘
        assert_eq!(&handle.data()[0..4], &[0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn test_all_ones_normalized_to_hole() {
        let (_dev, mut handle) = bound_handle();

        handle.data_mut()[8..12].fill(0xff);
        assert_eq!(read_slot(&handle, 2).unwrap(), 0);
    }

    #[test]
    fn test_index_bounds() {
        let (_dev, mut handle) = bound_handle();

        // 512 字节的表有 128 个槽位
        assert!(read_slot(&handle, 128).is_err());
        assert!(write_slot(&mut handle, 128, 1).is_err());
    }

    #[test]
    fn test_unbound_rejected() {
        let handle = BufferHandle::new();
        assert_eq!(
            read_slot(&handle, 0).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn test_zero_fill() {
        let (_dev, mut handle) = bound_handle();

        handle.data_mut().fill(0xff);
        zero_fill(&mut handle);
        for index in 0..128 {
            assert_eq!(read_slot(&handle, index).unwrap(), 0);
        }
        assert!(handle.is_dirty());
    }
}
