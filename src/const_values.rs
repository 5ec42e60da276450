use anyhow::{self, Context};
use serde::Deserialize;
use std::path::Path;

/// LLRAM 固定为 256MB
pub const LLRAM_SIZE: usize = 256 * 1024 * 1024;

// ID 掩码不比较 Variant 和 Revision，所有能运行 Linux 的版本都支持
pub const ID_MASK: u64 = 0xff0f_ffe0;
pub const ID_VALUE: u64 = 0x410f_d140;
pub const LLRAM_IMPL_MASK: u64 = 0x80;
pub const LLRAM_BASE_MASK: u64 = 0xff_f000_0000;
pub const LLRAM_EN_MASK: u64 = 0x1;

/// 记录追踪器默认容量
pub const TRACE_LIST_SIZE: usize = 1024;

/// LLRAM 端口相关开关
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LlramSection {
    /// 是否尝试通过 IMP_LLRAMREGIONR_EL1 使能 LLRAM 端口
    #[serde(default)]
    pub enable_llram: bool,
    /// 端口不存在时是否分配普通内存代替
    #[serde(default = "default_true")]
    pub allow_simulated: bool,
}

impl Default for LlramSection {
    fn default() -> Self {
        Self {
            enable_llram: false,
            allow_simulated: true,
        }
    }
}

/// 探测器选择
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// aarch64 上读系统寄存器，其它平台视为无硬件
    #[default]
    Auto,
    Sysreg,
    Absent,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlatformSection {
    #[serde(default)]
    pub probe: ProbeKind,
    #[serde(default = "default_devmem")]
    pub devmem: String,
}

impl Default for PlatformSection {
    fn default() -> Self {
        Self {
            probe: ProbeKind::Auto,
            devmem: default_devmem(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DebugSection {
    #[serde(default = "default_trace_list_size")]
    pub trace_list_size: usize,
}

impl Default for DebugSection {
    fn default() -> Self {
        Self {
            trace_list_size: TRACE_LIST_SIZE,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_devmem() -> String {
    "/dev/mem".to_string()
}

fn default_trace_list_size() -> usize {
    TRACE_LIST_SIZE
}

/// 驱动配置（来自 profile/config.toml），只在启动时读取一次
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct LlramConfig {
    #[serde(default)]
    pub llram: LlramSection,
    #[serde(default)]
    pub platform: PlatformSection,
    #[serde(default)]
    pub debug: DebugSection,
}

impl LlramConfig {
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<LlramConfig> {
        let toml_str = std::fs::read_to_string(&path)
            .with_context(|| format!("无法读取配置文件: {:?}", &path.as_ref().as_os_str()))?;
        Self::parse(&toml_str)
            .with_context(|| format!("无法解析配置文件: {:?}", &path.as_ref().as_os_str()))
    }

    pub fn parse(toml_str: &str) -> anyhow::Result<LlramConfig> {
        let config: LlramConfig = toml::from_str(toml_str)?;
        anyhow::Ok(config)
    }
}
