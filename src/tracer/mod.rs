//! 访问追踪
//!
//! 每次读写都会生成按字节的追踪记录。读路径上连续的 0 字节合并成一条
//! 带重复次数的记录，写路径不合并。追踪是尽力而为的，不会让访问失败。

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::Level;

use crate::utils::ringbuf::RingBuffer;

/// 追踪日志使用的 target
pub const TRACE_TARGET: &str = "llram::trace";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessOp {
    #[default]
    Read,
    Write,
}

/// 一条追踪记录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraceRecord {
    pub op: AccessOp,
    /// 相对于 LLRAM 起始的偏移
    pub addr: u64,
    pub value: u8,
    /// 合并的字节数，非合并记录为 1
    pub repeat: u64,
}

impl TraceRecord {
    pub fn read(addr: u64, value: u8) -> Self {
        Self {
            op: AccessOp::Read,
            addr,
            value,
            repeat: 1,
        }
    }

    pub fn zero_run(addr: u64, repeat: u64) -> Self {
        Self {
            op: AccessOp::Read,
            addr,
            value: 0,
            repeat,
        }
    }

    pub fn write(addr: u64, value: u8) -> Self {
        Self {
            op: AccessOp::Write,
            addr,
            value,
            repeat: 1,
        }
    }

    pub fn is_zero_run(&self) -> bool {
        self.op == AccessOp::Read && self.value == 0
    }
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            AccessOp::Read if self.value == 0 => {
                write!(f, "RD [0x{:07x}] = 0x00 (x{})", self.addr, self.repeat)
            }
            AccessOp::Read => write!(f, "RD [0x{:07x}] = {:02x}", self.addr, self.value),
            AccessOp::Write => write!(f, "WR [0x{:07x}] = {:02x}", self.addr, self.value),
        }
    }
}

/// 追踪记录的接收端
pub trait TraceSink: Send {
    /// 返回 false 时访问路径可以跳过逐字节生成记录
    fn enabled(&self) -> bool {
        true
    }

    fn record(&mut self, record: TraceRecord);
}

/// 输出到 `tracing` debug 日志
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn enabled(&self) -> bool {
        tracing::enabled!(target: TRACE_TARGET, Level::DEBUG)
    }

    fn record(&mut self, record: TraceRecord) {
        tracing::debug!(target: TRACE_TARGET, "{}", record);
    }
}

/// 记录到定长环形缓冲区，可被克隆后在其它地方读取
#[derive(Debug, Clone)]
pub struct Recorder {
    records: Arc<Mutex<RingBuffer<TraceRecord>>>,
}

impl Recorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Arc::new(Mutex::new(RingBuffer::new(capacity))),
        }
    }

    /// 当前保留的记录（从旧到新）
    pub fn records(&self) -> Vec<TraceRecord> {
        match self.records.lock() {
            Ok(records) => records.snapshot(),
            Err(_) => Vec::new(),
        }
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }

    /// 缓冲区满后被覆盖的记录数
    pub fn dropped(&self) -> usize {
        match self.records.lock() {
            Ok(records) => records.dropped(),
            Err(_) => 0,
        }
    }

    /// 打印所有记录，有记录被覆盖时先给出丢弃条数
    pub fn get_log(&self) -> String {
        let mut log = String::new();
        let dropped = self.dropped();
        if dropped > 0 {
            log += &format!("... 已丢弃 {} 条更早的记录\n", dropped);
        }
        for record in self.records() {
            log += &format!("{}\n", record);
        }
        log
    }
}

impl TraceSink for Recorder {
    fn record(&mut self, record: TraceRecord) {
        // 锁中毒时直接丢弃记录
        if let Ok(mut records) = self.records.lock() {
            records.push_overwrite(record);
        }
    }
}

/// 统一的追踪入口，把记录分发给多个接收端
#[derive(Default)]
pub struct Tracer {
    sinks: Vec<Box<dyn TraceSink>>,
}

impl Tracer {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// 只输出到日志的追踪器
    pub fn with_log() -> Self {
        let mut tracer = Self::new();
        tracer.add_sink(Box::new(LogSink));
        tracer
    }

    pub fn add_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.sinks.push(sink);
    }
}

impl TraceSink for Tracer {
    fn enabled(&self) -> bool {
        self.sinks.iter().any(|s| s.enabled())
    }

    fn record(&mut self, record: TraceRecord) {
        for sink in &mut self.sinks {
            if sink.enabled() {
                sink.record(record);
            }
        }
    }
}

/// 追踪一次读取，连续的 0 字节合并为一条记录
pub fn trace_read(sink: &mut dyn TraceSink, base: u64, data: &[u8]) {
    if !sink.enabled() {
        return;
    }
    let mut zero_run: Option<(u64, u64)> = None;
    for (i, &value) in data.iter().enumerate() {
        let addr = base + i as u64;
        if value == 0 {
            match zero_run.as_mut() {
                Some((_, count)) => *count += 1,
                None => zero_run = Some((addr, 1)),
            }
        } else {
            if let Some((start, count)) = zero_run.take() {
                sink.record(TraceRecord::zero_run(start, count));
            }
            sink.record(TraceRecord::read(addr, value));
        }
    }
    if let Some((start, count)) = zero_run {
        sink.record(TraceRecord::zero_run(start, count));
    }
}

/// 追踪一次写入，每个字节一条记录
pub fn trace_write(sink: &mut dyn TraceSink, base: u64, data: &[u8]) {
    if !sink.enabled() {
        return;
    }
    for (i, &value) in data.iter().enumerate() {
        sink.record(TraceRecord::write(base + i as u64, value));
    }
}
