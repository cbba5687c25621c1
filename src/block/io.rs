//! 块 I/O 操作实现

use super::{BlockDev, BlockDevice};
use crate::error::{Error, ErrorKind, Result};

impl<D: BlockDevice> BlockDev<D> {
    /// 读取单个逻辑块
    ///
    /// 从指定逻辑块地址读取一个完整的块到缓冲区。
    /// 如果启用了缓存，优先从缓存读取；缓存未命中则从设备读取并填充缓存。
    ///
    /// # 参数
    ///
    /// * `lba` - 逻辑块地址
    /// * `buf` - 目标缓冲区（大小至少为 block_size）
    ///
    /// # 返回
    ///
    /// 成功返回读取的字节数
    pub fn read_block(&mut self, lba: u64, buf: &mut [u8]) -> Result<usize> {
        let block_size = self.block_size() as usize;

        if buf.len() < block_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "buffer too small for block",
            ));
        }

        self.inc_read_count();

        // 如果启用了缓存，尝试从缓存读取
        if let Some(cache) = &self.bcache {
            if let Ok(data) = cache.read_block(lba) {
                buf[..block_size].copy_from_slice(data);
                return Ok(block_size);
            }
        }

        // 缓存未命中或无缓存 - 从设备读取到调用者缓冲区
        let pba = self.logical_to_physical(lba);
        let count = self.sectors_per_block();
        self.inc_physical_read_count();
        self.device_mut().read_blocks(pba, count, buf)?;

        // 将数据填充到缓存。缓存满且全为脏块时跳过填充，
        // 数据已经在调用者缓冲区中。
        if let Some(cache) = &mut self.bcache {
            match cache.alloc(lba) {
                Ok((cache_buf, _is_new)) => {
                    cache_buf.data.copy_from_slice(&buf[..block_size]);
                    cache_buf.mark_uptodate();
                }
                Err(e) if e.kind() == ErrorKind::NoSpace => {
                    log::warn!("[BDEV] cache full, read bypasses cache: lba={:#x}", lba);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(block_size)
    }

    /// 写入单个逻辑块
    ///
    /// 将缓冲区数据写入指定逻辑块地址。
    /// 如果启用了缓存，写入缓存并标记为脏；否则直接写入设备。
    ///
    /// # 参数
    ///
    /// * `lba` - 逻辑块地址
    /// * `buf` - 源数据缓冲区（大小至少为 block_size）
    ///
    /// # 返回
    ///
    /// 成功返回写入的字节数
    pub fn write_block(&mut self, lba: u64, buf: &[u8]) -> Result<usize> {
        let block_size = self.block_size() as usize;

        if buf.len() < block_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "buffer too small for block",
            ));
        }

        self.inc_write_count();

        // 缓存路径
        let cache_full = match &mut self.bcache {
            Some(cache) => match cache.write_block(lba, buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::NoSpace => true,
                Err(e) => return Err(e),
            },
            None => false,
        };

        if cache_full {
            // 缓存满且全为脏块：先刷回再重试一次
            log::warn!("[BDEV] cache full with dirty blocks, flushing before write");
            self.flush_cache()?;
            if let Some(cache) = &mut self.bcache {
                return cache.write_block(lba, buf);
            }
        }

        // 无缓存 - 直接写设备
        let pba = self.logical_to_physical(lba);
        let count = self.sectors_per_block();
        self.inc_physical_write_count();
        self.device_mut().write_blocks(pba, count, buf)?;
        Ok(block_size)
    }

    /// 将所有脏缓存块刷回设备
    ///
    /// # 返回
    ///
    /// 成功返回刷回的块数
    pub fn flush_cache(&mut self) -> Result<usize> {
        let spb = self.sectors_per_block();
        let flushed = match &mut self.bcache {
            Some(cache) => cache.flush_all(&mut self.device, spb)?,
            None => 0,
        };
        self.add_physical_writes(flushed);
        self.device_mut().flush()?;
        Ok(flushed)
    }
}
