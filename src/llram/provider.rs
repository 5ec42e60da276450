//! 后备存储提供者：分配模拟内存或映射物理区域

use std::path::PathBuf;

use super::error::InitError;
use super::space::{Backing, HeapBacking};

/// 分配/映射协作者，选择走哪条路径由探测结果决定
pub trait RegionProvider {
    /// 把物理地址 `phys` 开始的 `size` 字节映射为可缓存 (write-back) 内存
    fn map_region(&self, phys: u64, size: usize) -> Result<Box<dyn Backing>, InitError>;

    /// 分配 `size` 字节普通内存
    fn allocate(&self, size: usize) -> Result<Box<dyn Backing>, InitError>;
}

/// 默认提供者：堆内存 + `/dev/mem` 映射
#[derive(Debug, Clone)]
pub struct SystemProvider {
    devmem: PathBuf,
}

impl SystemProvider {
    pub fn new(devmem: impl Into<PathBuf>) -> Self {
        Self {
            devmem: devmem.into(),
        }
    }
}

impl Default for SystemProvider {
    fn default() -> Self {
        Self::new("/dev/mem")
    }
}

impl RegionProvider for SystemProvider {
    #[cfg(unix)]
    fn map_region(&self, phys: u64, size: usize) -> Result<Box<dyn Backing>, InitError> {
        let mapping = devmem::DevMemMapping::new(&self.devmem, phys, size)
            .map_err(|source| InitError::Map { phys, size, source })?;
        Ok(Box::new(mapping))
    }

    #[cfg(not(unix))]
    fn map_region(&self, phys: u64, size: usize) -> Result<Box<dyn Backing>, InitError> {
        let _ = &self.devmem;
        Err(InitError::Map {
            phys,
            size,
            source: std::io::Error::new(std::io::ErrorKind::Unsupported, "当前平台不支持物理内存映射"),
        })
    }

    fn allocate(&self, size: usize) -> Result<Box<dyn Backing>, InitError> {
        Ok(Box::new(HeapBacking::zeroed(size)?))
    }
}

#[cfg(unix)]
mod devmem {
    use std::fs::OpenOptions;
    use std::io;
    use std::os::unix::io::AsRawFd;
    use std::path::Path;
    use std::ptr::NonNull;

    use crate::llram::space::Backing;

    /// `/dev/mem` 上的共享映射
    ///
    /// 打开时不带 O_SYNC，内核按可缓存内存映射；LLRAM 硬件本身保证 write-through。
    pub struct DevMemMapping {
        ptr: NonNull<u8>,
        size: usize,
        page_offset: usize,
    }

    // 映射只由这个对象持有
    unsafe impl Send for DevMemMapping {}

    impl DevMemMapping {
        pub fn new(path: &Path, phys: u64, size: usize) -> io::Result<Self> {
            let fd = OpenOptions::new().read(true).write(true).open(path)?;

            let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
            if page_size <= 0 {
                return Err(io::Error::last_os_error());
            }
            let page_size = page_size as u64;
            let page_offset = (phys % page_size) as usize;
            let map_base = phys - page_offset as u64;
            let map_size = size + page_offset;
            let file_offset = libc::off_t::try_from(map_base)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "物理地址超出 off_t 范围"))?;

            let raw = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    map_size,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED,
                    fd.as_raw_fd(),
                    file_offset,
                )
            };
            if raw == libc::MAP_FAILED {
                return Err(io::Error::last_os_error());
            }

            let ptr = NonNull::new(unsafe { (raw as *mut u8).add(page_offset) })
                .ok_or_else(|| io::Error::other("mmap 返回空指针"))?;
            Ok(Self {
                ptr,
                size,
                page_offset,
            })
        }
    }

    impl Backing for DevMemMapping {
        fn bytes(&self) -> &[u8] {
            unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
        }

        fn bytes_mut(&mut self) -> &mut [u8] {
            unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
        }
    }

    impl Drop for DevMemMapping {
        fn drop(&mut self) {
            unsafe {
                let map_ptr = self.ptr.as_ptr().sub(self.page_offset);
                libc::munmap(map_ptr as *mut libc::c_void, self.size + self.page_offset);
            }
        }
    }
}
