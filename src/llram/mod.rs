//! LLRAM 设备核心模块

mod error;
pub mod provider;
pub mod session;
pub mod space;
pub mod startup;

pub use error::{InitError, LlramError};
pub use provider::{RegionProvider, SystemProvider};
pub use session::{AccessSession, Whence};
pub use space::{AddressSpace, Backing, HeapBacking, Origin};
pub use startup::{Detection, Unavailable};

use probe_trait::PlatformProbe;
use tracing::{info, warn};

use crate::const_values::LlramSection;
use crate::tracer::{TraceSink, Tracer};

/// LLRAM 设备
///
/// 持有整个进程生命周期内的地址空间，同一时间最多只有一个访问会话。
pub struct LlramDevice {
    space: AddressSpace,
    session: Option<AccessSession>,
    /// 设备整体的使用计数，非零时拒绝卸载
    refs: usize,
    tracer: Box<dyn TraceSink>,
}

impl std::fmt::Debug for LlramDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlramDevice")
            .field("space", &self.space)
            .field("session", &self.session)
            .field("refs", &self.refs)
            .finish()
    }
}

impl LlramDevice {
    /// 用已有的地址空间创建设备，追踪记录输出到日志
    pub fn new(space: AddressSpace) -> Self {
        Self::with_tracer(space, Box::new(Tracer::with_log()))
    }

    pub fn with_tracer(space: AddressSpace, tracer: Box<dyn TraceSink>) -> Self {
        Self {
            space,
            session: None,
            refs: 0,
            tracer,
        }
    }

    /// 探测硬件并创建设备，失败时不会创建任何设备
    pub fn probe(
        config: &LlramSection,
        probe: &mut dyn PlatformProbe,
        provider: &dyn RegionProvider,
    ) -> Result<Self, InitError> {
        let space = startup::initialize(config, probe, provider)?;
        info!(origin = %space.origin(), size = space.size(), "已创建 LLRAM 设备");
        Ok(Self::new(space))
    }

    /// 替换追踪接收端
    pub fn set_tracer(&mut self, tracer: Box<dyn TraceSink>) {
        self.tracer = tracer;
    }

    #[inline(always)]
    pub fn space(&self) -> &AddressSpace {
        &self.space
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn in_use(&self) -> bool {
        self.refs > 0
    }

    /// 当前会话的游标
    pub fn cursor(&self) -> Option<i64> {
        self.session.as_ref().map(AccessSession::cursor)
    }

    /// 打开设备，已有会话时立即失败，不会阻塞
    pub fn open(&mut self) -> Result<(), LlramError> {
        if self.session.is_some() {
            warn!("LLRAM 设备已被打开");
            return Err(LlramError::AlreadyOpen);
        }
        self.session = Some(AccessSession::new());
        self.refs += 1;
        Ok(())
    }

    /// 关闭设备，从不失败
    pub fn close(&mut self) {
        if self.session.take().is_none() {
            warn!("LLRAM 设备未打开，忽略关闭");
            return;
        }
        self.refs = self.refs.saturating_sub(1);
    }

    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<i64, LlramError> {
        let session = self.session.as_mut().ok_or(LlramError::NotOpen)?;
        session.seek(&self.space, offset, whence)
    }

    /// 从游标处读取最多 `len` 字节
    pub fn read(&mut self, len: usize) -> Result<(usize, Vec<u8>), LlramError> {
        let session = self.session.as_mut().ok_or(LlramError::NotOpen)?;
        let available = usize::try_from(session.cursor())
            .ok()
            .and_then(|start| self.space.size().checked_sub(start))
            .unwrap_or(0);
        let mut data = vec![0u8; len.min(available)];
        let n = session.read(&self.space, &mut data, len, &mut *self.tracer)?;
        data.truncate(n);
        Ok((n, data))
    }

    /// 读到调用者提供的缓冲区，`len` 可以大于缓冲区（视为拷贝错误）
    pub fn read_into(&mut self, buf: &mut [u8], len: usize) -> Result<usize, LlramError> {
        let session = self.session.as_mut().ok_or(LlramError::NotOpen)?;
        session.read(&self.space, buf, len, &mut *self.tracer)
    }

    /// 在游标处写入全部数据
    pub fn write(&mut self, data: &[u8]) -> Result<usize, LlramError> {
        self.write_from(data, data.len())
    }

    /// 写入 `buf` 的前 `len` 字节，`buf` 不足 `len` 时视为拷贝错误
    pub fn write_from(&mut self, buf: &[u8], len: usize) -> Result<usize, LlramError> {
        let session = self.session.as_mut().ok_or(LlramError::NotOpen)?;
        session.write(&mut self.space, buf, len, &mut *self.tracer)
    }

    /// 卸载设备
    ///
    /// 仍有会话持有设备时拒绝卸载，原样返回设备。
    pub fn shutdown(self) -> Result<Origin, Self> {
        if self.in_use() {
            warn!(refs = self.refs, "LLRAM 设备仍在使用，拒绝卸载");
            return Err(self);
        }
        info!("卸载 LLRAM 驱动");
        Ok(self.space.origin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracer::Recorder;

    fn device(len: usize) -> LlramDevice {
        let space = AddressSpace::simulated(Box::new(HeapBacking::zeroed(len).unwrap()));
        LlramDevice::with_tracer(space, Box::new(Recorder::new(64)))
    }

    #[test]
    fn open_is_exclusive() {
        let mut dev = device(64);
        assert!(dev.open().is_ok());
        assert_eq!(dev.open(), Err(LlramError::AlreadyOpen));
        assert!(dev.in_use());
        dev.close();
        assert!(!dev.is_open());
        assert!(!dev.in_use());
        assert!(dev.open().is_ok());
        assert_eq!(dev.cursor(), Some(0));
    }

    #[test]
    fn close_without_open_is_harmless() {
        let mut dev = device(64);
        dev.close();
        assert!(!dev.in_use());
        assert!(dev.open().is_ok());
    }

    #[test]
    fn reopen_resets_cursor() {
        let mut dev = device(64);
        dev.open().unwrap();
        dev.seek(10, Whence::Start).unwrap();
        dev.close();
        dev.open().unwrap();
        assert_eq!(dev.cursor(), Some(0));
    }

    #[test]
    fn calls_without_session_fail() {
        let mut dev = device(64);
        assert_eq!(dev.seek(0, Whence::Start), Err(LlramError::NotOpen));
        assert_eq!(dev.read(1), Err(LlramError::NotOpen));
        assert_eq!(dev.write(&[1]), Err(LlramError::NotOpen));
        assert_eq!(dev.cursor(), None);
    }

    #[test]
    fn read_returns_only_available_bytes() {
        let mut dev = device(64);
        dev.open().unwrap();
        dev.seek(60, Whence::Start).unwrap();
        let (n, data) = dev.read(usize::MAX).unwrap();
        assert_eq!(n, 4);
        assert_eq!(data.len(), 4);
    }

    #[test]
    fn read_into_short_buffer() {
        let mut dev = device(64);
        dev.open().unwrap();
        let mut buf = [0u8; 2];
        assert!(matches!(dev.read_into(&mut buf, 4), Err(LlramError::Fault { .. })));
        assert_eq!(dev.cursor(), Some(0));
    }

    #[test]
    fn write_from_short_buffer() {
        let mut dev = device(64);
        dev.open().unwrap();
        assert!(matches!(dev.write_from(&[1, 2], 4), Err(LlramError::Fault { .. })));
        assert_eq!(dev.write_from(&[1, 2, 3], 2), Ok(2));
        assert_eq!(dev.cursor(), Some(2));
    }

    #[test]
    fn shutdown_refused_while_open() {
        let mut dev = device(64);
        dev.open().unwrap();
        let mut dev = dev.shutdown().unwrap_err();
        dev.close();
        assert_eq!(dev.shutdown().unwrap(), Origin::Simulated);
    }
}
