//! 位图操作
//!
//! 块组分配器使用的按位操作。

mod ops;

pub use ops::{clear_bit, find_clear_bit, set_bit, test_bit};
