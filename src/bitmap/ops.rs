//! Bitmap 操作实现
//!
//! 置位表示"已分配"，清零表示"空闲"。

use crate::error::{Error, ErrorKind, Result};

/// 测试位图中某一位是否被设置
///
/// # 参数
///
/// * `bitmap` - 位图数据
/// * `index` - 位索引（从 0 开始）
///
/// # 返回
///
/// 如果位被设置返回 true，否则返回 false
pub fn test_bit(bitmap: &[u8], index: u32) -> bool {
    let byte_index = (index / 8) as usize;
    let bit_offset = (index % 8) as u8;

    if byte_index >= bitmap.len() {
        return false;
    }

    (bitmap[byte_index] & (1 << bit_offset)) != 0
}

/// 设置位图中的某一位
///
/// # 参数
///
/// * `bitmap` - 位图数据
/// * `index` - 位索引（从 0 开始）
///
/// # 返回
///
/// 成功返回 ()，如果索引超出范围返回错误
pub fn set_bit(bitmap: &mut [u8], index: u32) -> Result<()> {
    let byte_index = (index / 8) as usize;
    let bit_offset = (index % 8) as u8;

    if byte_index >= bitmap.len() {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "Bitmap index out of range",
        ));
    }

    bitmap[byte_index] |= 1 << bit_offset;
    Ok(())
}

/// 清除位图中的某一位
///
/// # 参数
///
/// * `bitmap` - 位图数据
/// * `index` - 位索引（从 0 开始）
///
/// # 返回
///
/// 成功返回 ()，如果索引超出范围返回错误
pub fn clear_bit(bitmap: &mut [u8], index: u32) -> Result<()> {
    let byte_index = (index / 8) as usize;
    let bit_offset = (index % 8) as u8;

    if byte_index >= bitmap.len() {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "Bitmap index out of range",
        ));
    }

    bitmap[byte_index] &= !(1 << bit_offset);
    Ok(())
}

/// 在 `[0, limit)` 范围内从 `seed` 开始向两侧搜索第一个空闲位
///
/// 搜索交替向上和向下展开，距离 seed 越近的空闲位越先被找到，
/// 这是分配器就近分配（locality hint）的基础。
///
/// # 参数
///
/// * `bitmap` - 位图数据
/// * `seed` - 搜索起点
/// * `limit` - 位数上限（不含）
///
/// # 返回
///
/// 找到返回 Some(位索引)，整个范围都已分配返回 None
pub fn find_clear_bit(bitmap: &[u8], seed: u32, limit: u32) -> Option<u32> {
    if limit == 0 {
        return None;
    }

    let seed = seed.min(limit - 1);
    if !test_bit(bitmap, seed) {
        return Some(seed);
    }

    let mut distance: u32 = 1;
    loop {
        let up = seed.checked_add(distance).filter(|&b| b < limit);
        let down = seed.checked_sub(distance);

        match (up, down) {
            (None, None) => return None,
            _ => {}
        }

        if let Some(bit) = up {
            if !test_bit(bitmap, bit) {
                return Some(bit);
            }
        }
        if let Some(bit) = down {
            if !test_bit(bitmap, bit) {
                return Some(bit);
            }
        }

        distance += 1;
    }
}
