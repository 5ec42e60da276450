//! 系统寄存器探测器：直接通过 MRS/MSR 访问 Cortex-R82 的寄存器
//!
//! 寄存器编码:
//! - MIDR_EL1: 身份寄存器
//! - IMP_CLUSTERCFR_EL1: S3_0_C15_C3_0
//! - IMP_LLRAMREGIONR_EL1: S3_0_C15_C0_4
//!
//! IMP_* 寄存器只能在 EL1 及以上访问，在 EL0 执行会触发未定义指令异常。
//! 非 aarch64 平台上所有访问都返回 [`ProbeError::Unsupported`]。
use probe_trait::{PlatformProbe, ProbeError};

/// 真实的系统寄存器探测器
#[derive(Debug, Default)]
pub struct SysRegProbe {
    name: String,
}

impl SysRegProbe {
    pub fn new(name: String) -> Self {
        Self { name }
    }

    /// 编译目标是否为 aarch64
    pub const fn is_native() -> bool {
        cfg!(target_arch = "aarch64")
    }
}

#[cfg(target_arch = "aarch64")]
mod regs {
    use core::arch::asm;

    pub fn midr_el1() -> u64 {
        let value: u64;
        unsafe {
            asm!("mrs {v}, midr_el1", v = out(reg) value, options(nomem, nostack, preserves_flags));
        }
        value
    }

    pub fn imp_clustercfr_el1() -> u64 {
        let value: u64;
        unsafe {
            asm!("mrs {v}, s3_0_c15_c3_0", v = out(reg) value, options(nomem, nostack, preserves_flags));
        }
        value
    }

    pub fn imp_llramregionr_el1() -> u64 {
        let value: u64;
        unsafe {
            asm!("mrs {v}, s3_0_c15_c0_4", v = out(reg) value, options(nomem, nostack, preserves_flags));
        }
        value
    }

    pub fn enable_llram() {
        let enable: u64 = 1;
        unsafe {
            asm!("msr s3_0_c15_c0_4, {v}", v = in(reg) enable, options(nostack, preserves_flags));
        }
    }
}

impl PlatformProbe for SysRegProbe {
    #[cfg(target_arch = "aarch64")]
    fn read_midr(&self) -> Result<u64, ProbeError> {
        Ok(regs::midr_el1())
    }

    #[cfg(not(target_arch = "aarch64"))]
    fn read_midr(&self) -> Result<u64, ProbeError> {
        Err(ProbeError::Unsupported("MIDR_EL1"))
    }

    #[cfg(target_arch = "aarch64")]
    fn read_cluster_cfr(&self) -> Result<u64, ProbeError> {
        Ok(regs::imp_clustercfr_el1())
    }

    #[cfg(not(target_arch = "aarch64"))]
    fn read_cluster_cfr(&self) -> Result<u64, ProbeError> {
        Err(ProbeError::Unsupported("IMP_CLUSTERCFR_EL1"))
    }

    #[cfg(target_arch = "aarch64")]
    fn read_llram_region(&self) -> Result<u64, ProbeError> {
        Ok(regs::imp_llramregionr_el1())
    }

    #[cfg(not(target_arch = "aarch64"))]
    fn read_llram_region(&self) -> Result<u64, ProbeError> {
        Err(ProbeError::Unsupported("IMP_LLRAMREGIONR_EL1"))
    }

    #[cfg(target_arch = "aarch64")]
    fn enable_llram(&mut self) -> Result<(), ProbeError> {
        regs::enable_llram();
        Ok(())
    }

    #[cfg(not(target_arch = "aarch64"))]
    fn enable_llram(&mut self) -> Result<(), ProbeError> {
        Err(ProbeError::Unsupported("IMP_LLRAMREGIONR_EL1"))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
