//! 平台探测 trait 定义
//!
//! 启动阶段用来识别 CPU 并读取 LLRAM 相关的系统寄存器。
//! 真实实现直接读取系统寄存器，测试或非目标平台使用 [`AbsentProbe`]。

use thiserror::Error;

/// 探测错误类型
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("当前平台不支持该寄存器: {0}")]
    Unsupported(&'static str),
}

/// 平台探测 trait
/// 所有探测实现都必须提供三个只读寄存器和一个使能命令
pub trait PlatformProbe: Send {
    /// 读取身份寄存器 (MIDR_EL1)
    fn read_midr(&self) -> Result<u64, ProbeError>;

    /// 读取集群配置寄存器 (IMP_CLUSTERCFR_EL1)
    ///
    /// # 返回
    /// 寄存器原始值，bit 7 表示 LLRAM 端口是否实现
    fn read_cluster_cfr(&self) -> Result<u64, ProbeError>;

    /// 读取 LLRAM 区域寄存器 (IMP_LLRAMREGIONR_EL1)
    ///
    /// # 返回
    /// 寄存器原始值，高位为物理基址，bit 0 为使能位
    fn read_llram_region(&self) -> Result<u64, ProbeError>;

    /// 使能 LLRAM 端口（幂等）
    fn enable_llram(&mut self) -> Result<(), ProbeError>;

    /// 获取探测器名称（用于日志）
    fn name(&self) -> &str {
        "unknown"
    }
}

/// 永远报告“无硬件”的探测器
///
/// 用于非 ARM64 平台，或者强制走模拟内存的场景。
#[derive(Debug, Default, Clone, Copy)]
pub struct AbsentProbe;

impl PlatformProbe for AbsentProbe {
    fn read_midr(&self) -> Result<u64, ProbeError> {
        Err(ProbeError::Unsupported("MIDR_EL1"))
    }

    fn read_cluster_cfr(&self) -> Result<u64, ProbeError> {
        Err(ProbeError::Unsupported("IMP_CLUSTERCFR_EL1"))
    }

    fn read_llram_region(&self) -> Result<u64, ProbeError> {
        Err(ProbeError::Unsupported("IMP_LLRAMREGIONR_EL1"))
    }

    fn enable_llram(&mut self) -> Result<(), ProbeError> {
        Err(ProbeError::Unsupported("IMP_LLRAMREGIONR_EL1"))
    }

    fn name(&self) -> &str {
        "absent"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_probe_reports_unsupported() {
        let mut probe = AbsentProbe;
        assert_eq!(probe.name(), "absent");
        assert!(matches!(probe.read_midr(), Err(ProbeError::Unsupported(_))));
        assert!(matches!(probe.read_cluster_cfr(), Err(ProbeError::Unsupported(_))));
        assert!(matches!(probe.read_llram_region(), Err(ProbeError::Unsupported(_))));
        assert!(probe.enable_llram().is_err());
    }

    #[test]
    fn probe_is_object_safe() {
        let probe: Box<dyn PlatformProbe> = Box::new(AbsentProbe);
        assert_eq!(probe.name(), "absent");
    }
}
