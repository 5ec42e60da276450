//! 地址空间：持有 LLRAM 后备存储并回答范围查询

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;

use tracing::{info, warn};

use super::error::InitError;

/// 后备存储来源，构造后不可变，决定释放方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// 映射到硬件 LLRAM 物理区域
    HardwareMapped,
    /// 用普通内存模拟
    Simulated,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::HardwareMapped => write!(f, "LLRAM 端口"),
            Origin::Simulated => write!(f, "模拟内存"),
        }
    }
}

/// 定长字节存储
///
/// 释放（解除映射或归还堆内存）由实现者的 `Drop` 负责。
pub trait Backing: Send {
    fn bytes(&self) -> &[u8];
    fn bytes_mut(&mut self) -> &mut [u8];
}

/// 堆上分配的清零内存
pub struct HeapBacking {
    ptr: NonNull<u8>,
    len: usize,
}

// 独占持有这块堆内存
unsafe impl Send for HeapBacking {}

impl HeapBacking {
    /// 分配 `len` 字节清零内存，分配失败时返回错误而不是终止进程
    pub fn zeroed(len: usize) -> Result<Self, InitError> {
        if len == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len,
            });
        }
        let layout = Layout::array::<u8>(len).map_err(|_| InitError::Allocation { size: len })?;
        // 大块 alloc_zeroed 走 calloc/mmap，页面按需提交
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(InitError::Allocation { size: len })?;
        Ok(Self { ptr, len })
    }
}

impl Backing for HeapBacking {
    fn bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for HeapBacking {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        if let Ok(layout) = Layout::array::<u8>(self.len) {
            unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) };
        }
    }
}

/// LLRAM 地址空间
///
/// 所有寻址都相对于后备存储的 0 偏移，不使用绝对物理地址。
pub struct AddressSpace {
    backing: Box<dyn Backing>,
    origin: Origin,
    /// 硬件映射时的物理基址
    phys_base: Option<u64>,
}

impl fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressSpace")
            .field("size", &format_args!("{:#x}", self.size()))
            .field("origin", &self.origin)
            .field("phys_base", &self.phys_base.map(|p| format!("{:#x}", p)))
            .finish()
    }
}

impl AddressSpace {
    /// 用硬件映射创建地址空间
    pub fn hardware(backing: Box<dyn Backing>, phys_base: u64) -> Self {
        Self {
            backing,
            origin: Origin::HardwareMapped,
            phys_base: Some(phys_base),
        }
    }

    /// 用模拟内存创建地址空间
    pub fn simulated(backing: Box<dyn Backing>) -> Self {
        Self {
            backing,
            origin: Origin::Simulated,
            phys_base: None,
        }
    }

    #[inline(always)]
    pub fn size(&self) -> usize {
        self.backing.bytes().len()
    }

    #[inline(always)]
    pub fn origin(&self) -> Origin {
        self.origin
    }

    #[inline(always)]
    pub fn phys_base(&self) -> Option<u64> {
        self.phys_base
    }

    /// 偏移是否落在 `[0, size)` 内，只报告不报错
    pub fn contains(&self, offset: i64) -> bool {
        let in_range = offset >= 0 && (offset as u64) < self.size() as u64;
        if !in_range {
            warn!(offset = %format_args!("{:#x}", offset), "越界偏移");
        }
        in_range
    }

    /// 调用者必须先用 `contains` 校验范围
    #[inline(always)]
    pub(crate) fn bytes(&self) -> &[u8] {
        self.backing.bytes()
    }

    #[inline(always)]
    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        self.backing.bytes_mut()
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        match self.origin {
            Origin::HardwareMapped => info!(
                phys_base = %format_args!("{:#x}", self.phys_base.unwrap_or_default()),
                "解除 LLRAM 映射"
            ),
            Origin::Simulated => info!(size = self.size(), "释放模拟内存"),
        }
    }
}
