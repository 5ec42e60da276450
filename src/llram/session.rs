//! 访问会话与传输引擎
//!
//! 会话只持有游标，地址空间由设备以引用的方式传入每次操作。

use tracing::{debug, info, warn};

use super::error::LlramError;
use super::space::AddressSpace;
use crate::tracer::{self, TraceSink};

/// seek 的参考点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// 从起始位置
    Start,
    /// 从当前游标
    Current,
    /// 从末尾
    End,
}

impl TryFrom<i32> for Whence {
    type Error = LlramError;

    /// 0/1/2 分别对应 SEEK_SET/SEEK_CUR/SEEK_END
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Whence::Start),
            1 => Ok(Whence::Current),
            2 => Ok(Whence::End),
            _ => Err(LlramError::InvalidWhence(value)),
        }
    }
}

/// 一个独占打开的访问会话
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AccessSession {
    cursor: i64,
}

impl AccessSession {
    pub fn new() -> Self {
        Self { cursor: 0 }
    }

    #[inline(always)]
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// 移动游标，目标必须落在地址空间内
    ///
    /// 目标按饱和加法计算，溢出时得到 `i64::MAX`/`i64::MIN`，同样不在范围内。
    pub fn seek(&mut self, space: &AddressSpace, offset: i64, whence: Whence) -> Result<i64, LlramError> {
        let new_offset = match whence {
            Whence::Start => offset,
            Whence::Current => self.cursor.saturating_add(offset),
            Whence::End => (space.size() as i64).saturating_add(offset),
        };

        if !space.contains(new_offset) {
            return Err(LlramError::InvalidOffset { offset: new_offset });
        }
        info!(offset = %format_args!("{:#x}", new_offset), "设置偏移");
        self.cursor = new_offset;
        Ok(new_offset)
    }

    /// 从游标处读取最多 `len` 字节到 `buf`
    ///
    /// 起点越界时返回 0，超出末尾的部分被截断。`buf` 装不下实际要读的
    /// 字节数时视为拷贝错误，游标不变。
    pub fn read(
        &mut self,
        space: &AddressSpace,
        buf: &mut [u8],
        len: usize,
        sink: &mut dyn TraceSink,
    ) -> Result<usize, LlramError> {
        let offset = self.cursor;
        debug!(len, "请求读取");

        if !space.contains(offset) {
            warn!(offset = %format_args!("{:#09x}", offset), "读取地址越界");
            return Ok(0);
        }
        let start = offset as usize;
        let available = space.size() - start;
        let size_read = if len > available {
            debug!(size_read = available, "超出 LLRAM 末尾，截断读取");
            available
        } else {
            len
        };

        let buf_len = buf.len();
        let Some(dst) = buf.get_mut(..size_read) else {
            warn!(offset, len = size_read, buf_len, "拷贝数据出错");
            return Err(LlramError::Fault { offset, len: size_read });
        };
        let src = &space.bytes()[start..start + size_read];
        dst.copy_from_slice(src);

        tracer::trace_read(sink, start as u64, src);
        self.cursor += size_read as i64;
        Ok(size_read)
    }

    /// 把 `buf` 的前 `len` 字节写到游标处
    ///
    /// 目标范围内任何一个字节越界都会整体拒绝，不做截断。
    pub fn write(
        &mut self,
        space: &mut AddressSpace,
        buf: &[u8],
        len: usize,
        sink: &mut dyn TraceSink,
    ) -> Result<usize, LlramError> {
        let offset = self.cursor;
        debug!(len, "请求写入");

        let in_range = if len > 0 {
            let last = i64::try_from(len - 1)
                .ok()
                .and_then(|n| offset.checked_add(n));
            space.contains(offset) && last.is_some_and(|last| space.contains(last))
        } else {
            space.contains(offset)
        };
        if !in_range {
            warn!(
                offset = %format_args!("{:#09x}", offset),
                len,
                "写入地址越界"
            );
            return Err(LlramError::Fault { offset, len });
        }

        let Some(src) = buf.get(..len) else {
            warn!(offset, len, buf_len = buf.len(), "拷贝数据出错");
            return Err(LlramError::Fault { offset, len });
        };
        let start = offset as usize;
        let dst = &mut space.bytes_mut()[start..start + len];
        dst.copy_from_slice(src);

        tracer::trace_write(sink, start as u64, dst);
        self.cursor += len as i64;
        Ok(len)
    }
}
