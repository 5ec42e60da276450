//! 启动流程：探测 LLRAM 端口，映射硬件区域或回退到模拟内存
//!
//! 整个流程只运行一次，不重试。任何必需步骤失败都不会留下半初始化的设备。

use probe_trait::{AbsentProbe, PlatformProbe, ProbeError};
use sysreg_probe::SysRegProbe;
use tracing::{info, warn};

use super::error::InitError;
use super::provider::RegionProvider;
use super::space::{AddressSpace, Backing};
use crate::const_values::{
    ID_MASK, ID_VALUE, LLRAM_BASE_MASK, LLRAM_EN_MASK, LLRAM_IMPL_MASK, LLRAM_SIZE, LlramSection,
    ProbeKind,
};

/// LLRAM 不可用的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    /// 不是目标架构，身份寄存器不可读
    UnsupportedPlatform,
    /// 身份寄存器不匹配
    UnexpectedId(u64),
    /// 集群配置中没有实现 LLRAM 端口
    NotImplemented,
}

impl std::fmt::Display for Unavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unavailable::UnsupportedPlatform => write!(f, "不是 ARM64 平台"),
            Unavailable::UnexpectedId(midr) => write!(f, "意外的 ID 值 {:#x}", midr),
            Unavailable::NotImplemented => write!(f, "LLRAM 未实现"),
        }
    }
}

/// 探测结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// 硬件区域存在，物理基址已按掩码取出
    Present { phys_base: u64 },
    Absent(Unavailable),
}

/// 根据配置创建探测器
pub fn select_probe(kind: ProbeKind) -> Box<dyn PlatformProbe> {
    match kind {
        ProbeKind::Sysreg => Box::new(SysRegProbe::new("sysreg".to_string())),
        ProbeKind::Absent => Box::new(AbsentProbe),
        ProbeKind::Auto if SysRegProbe::is_native() => Box::new(SysRegProbe::new("sysreg".to_string())),
        ProbeKind::Auto => Box::new(AbsentProbe),
    }
}

/// 检查身份和实现位，必要时使能端口并读取物理基址
pub fn detect(probe: &mut dyn PlatformProbe, enable_llram: bool) -> Result<Detection, InitError> {
    let midr = match probe.read_midr() {
        Ok(midr) => midr,
        Err(ProbeError::Unsupported(reg)) => {
            warn!(probe = probe.name(), reg, "不是 ARM64 平台");
            return Ok(Detection::Absent(Unavailable::UnsupportedPlatform));
        }
    };
    if midr & ID_MASK != ID_VALUE {
        warn!(midr = %format_args!("{:#x}", midr), "意外的 ID 值");
        return Ok(Detection::Absent(Unavailable::UnexpectedId(midr)));
    }

    if probe.read_cluster_cfr()? & LLRAM_IMPL_MASK == 0 {
        warn!("LLRAM 未实现");
        return Ok(Detection::Absent(Unavailable::NotImplemented));
    }

    if enable_llram {
        probe.enable_llram()?;
    }
    let region = probe.read_llram_region()?;
    if region & LLRAM_EN_MASK == 0 {
        warn!("LLRAM 端口未使能");
    }
    Ok(Detection::Present {
        phys_base: region & LLRAM_BASE_MASK,
    })
}

/// 后备存储必须正好是 `LLRAM_SIZE` 字节
fn check_size(backing: Box<dyn Backing>) -> Result<Box<dyn Backing>, InitError> {
    let actual = backing.bytes().len();
    if actual != LLRAM_SIZE {
        warn!(actual, expected = LLRAM_SIZE, "后备存储大小不符");
        return Err(InitError::SizeMismatch {
            expected: LLRAM_SIZE,
            actual,
        });
    }
    Ok(backing)
}

/// 完整的启动流程，返回设备生命周期内使用的地址空间
pub fn initialize(
    config: &LlramSection,
    probe: &mut dyn PlatformProbe,
    provider: &dyn RegionProvider,
) -> Result<AddressSpace, InitError> {
    info!("初始化 LLRAM 驱动");
    info!(
        enable_llram = config.enable_llram,
        allow_simulated = config.allow_simulated,
        probe = probe.name(),
        "驱动参数"
    );

    match detect(probe, config.enable_llram)? {
        Detection::Present { phys_base } => {
            // LLRAM 只支持 write-through，这里按 write-back 映射以便被当作可缓存内存
            let backing = check_size(provider.map_region(phys_base, LLRAM_SIZE)?)?;
            info!(phys_base = %format_args!("{:#x}", phys_base), "已映射 LLRAM 端口");
            Ok(AddressSpace::hardware(backing, phys_base))
        }
        Detection::Absent(reason) if config.allow_simulated => {
            warn!(%reason, "LLRAM 不存在，分配普通内存代替");
            let backing = provider.allocate(LLRAM_SIZE).inspect_err(|_| {
                warn!("无法分配内存");
            })?;
            Ok(AddressSpace::simulated(check_size(backing)?))
        }
        Detection::Absent(reason) => {
            warn!(%reason, "LLRAM 不存在，且不允许分配内存");
            Err(InitError::NoRegion {
                reason: reason.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llram::space::{HeapBacking, Origin};

    /// 返回固定长度后备存储的提供者
    struct FixedLenProvider(usize);

    impl RegionProvider for FixedLenProvider {
        fn map_region(&self, _phys: u64, _size: usize) -> Result<Box<dyn Backing>, InitError> {
            Ok(Box::new(HeapBacking::zeroed(self.0)?))
        }

        fn allocate(&self, _size: usize) -> Result<Box<dyn Backing>, InitError> {
            Ok(Box::new(HeapBacking::zeroed(self.0)?))
        }
    }

    /// 固定寄存器值的探测器
    struct FixedProbe {
        midr: u64,
        cfr: u64,
        region: u64,
        enabled: bool,
    }

    impl FixedProbe {
        fn cortex_r82(base: u64) -> Self {
            Self {
                midr: 0x410f_d142,
                cfr: LLRAM_IMPL_MASK,
                region: base,
                enabled: false,
            }
        }
    }

    impl PlatformProbe for FixedProbe {
        fn read_midr(&self) -> Result<u64, ProbeError> {
            Ok(self.midr)
        }

        fn read_cluster_cfr(&self) -> Result<u64, ProbeError> {
            Ok(self.cfr)
        }

        fn read_llram_region(&self) -> Result<u64, ProbeError> {
            Ok(self.region)
        }

        fn enable_llram(&mut self) -> Result<(), ProbeError> {
            self.enabled = true;
            self.region |= LLRAM_EN_MASK;
            Ok(())
        }
    }

    #[test]
    fn detect_present_masks_base() {
        let mut probe = FixedProbe::cortex_r82(0x42_3000_0ff0);
        let detection = detect(&mut probe, false).unwrap();
        assert_eq!(detection, Detection::Present { phys_base: 0x42_3000_0000 });
        assert!(!probe.enabled);
    }

    #[test]
    fn detect_enables_when_requested() {
        let mut probe = FixedProbe::cortex_r82(0x40_0000_0000);
        detect(&mut probe, true).unwrap();
        assert!(probe.enabled);
    }

    #[test]
    fn detect_ignores_variant_and_revision() {
        let mut probe = FixedProbe::cortex_r82(0x40_0000_0000);
        probe.midr = 0x413f_d14f;
        assert!(matches!(detect(&mut probe, false).unwrap(), Detection::Present { .. }));
    }

    #[test]
    fn detect_wrong_id() {
        let mut probe = FixedProbe::cortex_r82(0);
        probe.midr = 0x410f_d080;
        assert_eq!(
            detect(&mut probe, true).unwrap(),
            Detection::Absent(Unavailable::UnexpectedId(0x410f_d080))
        );
        assert!(!probe.enabled);
    }

    #[test]
    fn detect_not_implemented() {
        let mut probe = FixedProbe::cortex_r82(0);
        probe.cfr = 0x7f;
        assert_eq!(
            detect(&mut probe, true).unwrap(),
            Detection::Absent(Unavailable::NotImplemented)
        );
        assert!(!probe.enabled);
    }

    #[test]
    fn detect_foreign_platform() {
        let mut probe = AbsentProbe;
        assert_eq!(
            detect(&mut probe, false).unwrap(),
            Detection::Absent(Unavailable::UnsupportedPlatform)
        );
    }

    #[test]
    fn select_probe_by_kind() {
        assert_eq!(select_probe(ProbeKind::Absent).name(), "absent");
        assert_eq!(select_probe(ProbeKind::Sysreg).name(), "sysreg");
        let auto = select_probe(ProbeKind::Auto);
        if SysRegProbe::is_native() {
            assert_eq!(auto.name(), "sysreg");
        } else {
            assert_eq!(auto.name(), "absent");
        }
    }

    #[test]
    fn fallback_allocates_simulated_memory() {
        let provider = crate::llram::provider::SystemProvider::default();
        let space = initialize(&LlramSection::default(), &mut AbsentProbe, &provider).unwrap();
        assert_eq!(space.origin(), Origin::Simulated);
        assert_eq!(space.size(), LLRAM_SIZE);
    }

    #[test]
    fn fallback_disallowed_is_fatal() {
        let provider = crate::llram::provider::SystemProvider::default();
        let config = LlramSection {
            enable_llram: false,
            allow_simulated: false,
        };
        let err = initialize(&config, &mut AbsentProbe, &provider).unwrap_err();
        assert!(matches!(err, InitError::NoRegion { .. }));
    }

    #[test]
    fn short_simulated_backing_is_rejected() {
        let err = initialize(&LlramSection::default(), &mut AbsentProbe, &FixedLenProvider(4096)).unwrap_err();
        assert!(matches!(
            err,
            InitError::SizeMismatch {
                expected: LLRAM_SIZE,
                actual: 4096
            }
        ));
    }

    #[test]
    fn short_hardware_mapping_is_rejected() {
        let mut probe = FixedProbe::cortex_r82(0x40_0000_0000);
        let err = initialize(&LlramSection::default(), &mut probe, &FixedLenProvider(LLRAM_SIZE / 2)).unwrap_err();
        assert!(matches!(err, InitError::SizeMismatch { actual, .. } if actual == LLRAM_SIZE / 2));
    }
}
