//! 错误类型

use probe_trait::ProbeError;
use thiserror::Error;

/// 每次访问返回给调用者的错误，驱动内部不重试
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LlramError {
    #[error("LLRAM 设备已被打开")]
    AlreadyOpen,
    #[error("LLRAM 设备未打开")]
    NotOpen,
    /// `offset` 是 seek 计算出的目标偏移（溢出时为饱和值）
    #[error("无效的偏移: {offset:#x}")]
    InvalidOffset { offset: i64 },
    #[error("无效的 whence: {0}")]
    InvalidWhence(i32),
    #[error("访问错误: 偏移 {offset:#x}, 长度 {len}")]
    Fault { offset: i64, len: usize },
}

/// 启动阶段的致命错误，出现后设备不会被创建
#[derive(Debug, Error)]
pub enum InitError {
    #[error("LLRAM 不存在且不允许使用模拟内存: {reason}")]
    NoRegion { reason: String },
    #[error("后备存储大小 {actual:#x} 与 LLRAM 大小 {expected:#x} 不符")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("无法分配 {size} 字节内存")]
    Allocation { size: usize },
    #[error("无法映射物理地址 {phys:#x} (大小 {size:#x}): {source}")]
    Map {
        phys: u64,
        size: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("平台探测错误: {0}")]
    Probe(#[from] ProbeError),
}
