//! Cortex-R82 LLRAM 设备库
pub mod const_values;
pub mod llram;
pub mod tracer;
pub mod utils;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use const_values::LlramConfig;
use llram::{LlramDevice, SystemProvider, Whence};
use tracer::{Recorder, Tracer};

/// LLRAM 设备工具
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// 配置文件地址
    #[arg(short, long, default_value = "profile/config.toml")]
    pub config: String,

    /// 尝试使能 LLRAM 端口（覆盖配置文件）
    #[arg(long)]
    pub enable_llram: bool,

    /// 禁止回退到模拟内存（覆盖配置文件）
    #[arg(long)]
    pub no_simulated: bool,

    /// 结束时打印访问追踪记录
    #[arg(long)]
    pub show_trace: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 显示后备存储信息
    Info,
    /// 从指定偏移读取
    Read {
        /// 起始偏移（支持 0x 前缀）
        #[arg(short, long, value_parser = utils::parse_offset, allow_hyphen_values = true)]
        offset: i64,
        /// 读取字节数
        #[arg(short, long, default_value_t = 16)]
        length: usize,
    },
    /// 写入十六进制数据并回读
    Write {
        /// 起始偏移（支持 0x 前缀）
        #[arg(short, long, value_parser = utils::parse_offset, allow_hyphen_values = true)]
        offset: i64,
        /// 十六进制数据，例如 deadbeef
        #[arg(short, long)]
        data: String,
    },
}

/// 解析配置文件路径，相对路径基于项目目录
fn resolve_config_path(path: &str) -> PathBuf {
    let arg_cfg_path = PathBuf::from(path);
    if arg_cfg_path.is_absolute() {
        arg_cfg_path
    } else {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(path)
    }
}

/// 读取配置并应用命令行覆盖
pub fn load_config(args: &Args) -> Result<LlramConfig> {
    let mut config = LlramConfig::new(resolve_config_path(&args.config))?;
    if args.enable_llram {
        config.llram.enable_llram = true;
    }
    if args.no_simulated {
        config.llram.allow_simulated = false;
    }
    Ok(config)
}

/// 把一段数据格式化为每行 16 字节的十六进制转储
pub fn hex_dump(base: i64, data: &[u8]) -> String {
    let mut out = String::new();
    for (i, chunk) in data.chunks(16).enumerate() {
        out += &format!("{:07x}: {}\n", base + (i * 16) as i64, hex::encode(chunk));
    }
    out
}

pub fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let mut probe = llram::startup::select_probe(config.platform.probe);
    let provider = SystemProvider::new(&config.platform.devmem);

    let mut device = LlramDevice::probe(&config.llram, &mut *probe, &provider)
        .context("LLRAM 驱动初始化失败")?;

    let recorder = Recorder::new(config.debug.trace_list_size);
    if args.show_trace {
        let mut tracer = Tracer::with_log();
        tracer.add_sink(Box::new(recorder.clone()));
        device.set_tracer(Box::new(tracer));
    }

    device.open()?;
    let result = execute(&mut device, &args.command);
    device.close();

    if args.show_trace {
        info!("追踪日志:\n{}", recorder.get_log());
    }
    if device.shutdown().is_err() {
        tracing::error!("LLRAM 设备卸载失败");
    }
    result
}

fn execute(device: &mut LlramDevice, command: &Command) -> Result<()> {
    match command {
        Command::Info => {
            let space = device.space();
            println!("{} {}", "origin:".bold(), space.origin().to_string().green());
            println!("{} {:#x} ({} MiB)", "size:".bold(), space.size(), space.size() >> 20);
            match space.phys_base() {
                Some(base) => println!("{} {:#x}", "phys_base:".bold(), base),
                None => println!("{} {}", "phys_base:".bold(), "-".dimmed()),
            }
        }
        Command::Read { offset, length } => {
            device.seek(*offset, Whence::Start)?;
            let (n, data) = device.read(*length)?;
            println!("{} {}", "read:".bold(), n);
            print!("{}", hex_dump(*offset, &data));
        }
        Command::Write { offset, data } => {
            let bytes = hex::decode(data).with_context(|| format!("无效的十六进制数据: {}", data))?;
            device.seek(*offset, Whence::Start)?;
            let n = device.write(&bytes)?;
            println!("{} {}", "written:".bold(), n);

            device.seek(*offset, Whence::Start)?;
            let (_, readback) = device.read(n)?;
            print!("{}", hex_dump(*offset, &readback));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_read_command() {
        let args = Args::try_parse_from(["llram", "read", "--offset", "0x10", "--length", "4"]).unwrap();
        assert_eq!(args.command, Command::Read { offset: 0x10, length: 4 });
        assert_eq!(args.config, "profile/config.toml");
    }

    #[test]
    fn parse_negative_offset() {
        let args = Args::try_parse_from(["llram", "read", "--offset", "-1"]).unwrap();
        assert_eq!(args.command, Command::Read { offset: -1, length: 16 });
    }

    #[test]
    fn parse_overrides() {
        let args = Args::try_parse_from(["llram", "--enable-llram", "--no-simulated", "info"]).unwrap();
        assert!(args.enable_llram);
        assert!(args.no_simulated);
        assert_eq!(args.command, Command::Info);
    }

    #[test]
    fn overrides_apply_to_config() {
        let args = Args::try_parse_from(["llram", "--enable-llram", "--no-simulated", "info"]).unwrap();
        let config = load_config(&args).unwrap();
        assert!(config.llram.enable_llram);
        assert!(!config.llram.allow_simulated);
    }

    #[test]
    fn default_profile_loads() {
        let args = Args::try_parse_from(["llram", "info"]).unwrap();
        let config = load_config(&args).unwrap();
        assert!(!config.llram.enable_llram);
        assert!(config.llram.allow_simulated);
    }

    #[test]
    fn hex_dump_layout() {
        let dump = hex_dump(0x20, &[0xab; 20]);
        let lines: Vec<_> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], format!("0000020: {}", "ab".repeat(16)));
        assert_eq!(lines[1], "0000030: abababab");
    }
}
