//! 错误类型定义
//!
//! 提供 RFS 文件系统操作的错误类型。所有错误通过普通的 `Result`
//! 返回，没有基于异常的控制流，也没有部分静默成功。

use core::fmt;

/// RFS 操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// I/O 错误（介质读写失败）
    Io,
    /// 无效参数
    InvalidInput,
    /// 文件系统损坏（磁盘上的数据未通过一致性检查）
    Corrupted,
    /// 请求的逻辑位置超出当前映射范围（对应 ENXIO）
    RangeExceeded,
    /// 增长会超过块映射可寻址的最大块数（对应 EFBIG）
    TooLarge,
    /// 文件不存在
    NotFound,
    /// 空间不足
    NoSpace,
    /// 无效状态
    InvalidState,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;
