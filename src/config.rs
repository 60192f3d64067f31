//! 会话配置 - 命令行参数与 JSON 配置文件

use crate::input::CaptureSource;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "multiuser_osc.json";

/// 信号提取模式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    /// 多人关键点广播 (osc_sender)
    #[value(alias = "osc_sender")]
    Broadcast,
    /// 举手投票 (hand_voting)
    #[value(alias = "hand_voting")]
    Voting,
}

impl ExtractorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ExtractorKind::Broadcast => "osc_sender",
            ExtractorKind::Voting => "hand_voting",
        }
    }
}

/// 帧序号策略: 默认保持常量, 可选逐帧递增
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameIndexPolicy {
    #[default]
    Constant,
    Increment,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscConfig {
    pub host: String,
    pub port: u16,
    pub address_prefix: String, // 地址前缀, 后接 /begin /group_data /end
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 18010,
            address_prefix: "/AAASeed/ndim".to_string(),
        }
    }
}

impl OscConfig {
    pub fn destination(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    pub rtsp_path: String,
    pub default_rtsp_port: u16,
    pub read_timeout_ms: u64, // 流水线等待新帧的超时, 超时后重新检查停止信号
    pub ffmpeg_binary: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            rtsp_path: "stream2".to_string(),
            default_rtsp_port: 554,
            read_timeout_ms: 200,
            ffmpeg_binary: "ffmpeg".to_string(),
        }
    }
}

impl CaptureConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub input_size: u32,
    pub conf_threshold: f32,     // 人体置信度阈值
    pub iou_threshold: f32,      // NMS IOU阈值
    pub keypoint_threshold: f32, // 关键点可见度阈值, 低于则记为 (0,0)
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/yolo11n-pose.onnx"),
            input_size: 640,
            conf_threshold: 0.25,
            iou_threshold: 0.7,
            keypoint_threshold: 0.5,
            intra_threads: 4,
        }
    }
}

/// 会话参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub osc: OscConfig,
    pub channel: String,
    pub frame_index: FrameIndexPolicy,
    pub initial_frame_index: i32,
    pub mirror: bool,
    pub capture: CaptureConfig,
    pub model: ModelConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            osc: OscConfig::default(),
            channel: "OSC_hand_voting".to_string(),
            frame_index: FrameIndexPolicy::Constant,
            initial_frame_index: 1,
            mirror: true,
            capture: CaptureConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl SessionConfig {
    /// 从JSON文件加载配置
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    warn!("❌ 保存配置失败: {:#}", e);
                }
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    /// 用命令行参数覆盖配置文件
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(model) = &args.model {
            self.model.path = model.clone();
        }
        if let Some(host) = &args.osc_host {
            self.osc.host = host.clone();
        }
        if let Some(port) = args.osc_port {
            self.osc.port = port;
        }
        if let Some(channel) = &args.channel {
            self.channel = channel.clone();
        }
        if args.increment_frame_index {
            self.frame_index = FrameIndexPolicy::Increment;
        }
    }
}

/// 无界面运行参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "多人互动模块 - 姿态识别 OSC 信号", long_about = None)]
pub struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// 信号模式: broadcast (osc_sender) 或 voting (hand_voting)
    #[arg(long, value_enum, default_value_t = ExtractorKind::Voting)]
    pub mode: ExtractorKind,

    /// 视频源: 摄像头编号, 流地址或视频文件路径
    #[arg(short, long)]
    pub source: Option<String>,

    /// RTSP 摄像机 IP (与 --source 二选一)
    #[arg(long)]
    pub rtsp_host: Option<String>,

    /// RTSP 端口
    #[arg(long)]
    pub rtsp_port: Option<u16>,

    /// RTSP 用户名
    #[arg(long, default_value = "")]
    pub rtsp_user: String,

    /// RTSP 密码
    #[arg(long, default_value = "")]
    pub rtsp_password: String,

    /// 姿态模型 (ONNX)
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// OSC 目标主机
    #[arg(long)]
    pub osc_host: Option<String>,

    /// OSC 目标端口
    #[arg(long)]
    pub osc_port: Option<u16>,

    /// OSC 通道名
    #[arg(long)]
    pub channel: Option<String>,

    /// 每帧递增帧序号 (默认保持常量)
    #[arg(long)]
    pub increment_frame_index: bool,
}

impl Args {
    /// --source 优先, 其次 --rtsp-host, 默认摄像头 0
    pub fn capture_source(&self, capture: &CaptureConfig) -> Result<CaptureSource, String> {
        if let Some(source) = &self.source {
            return source.parse();
        }
        if let Some(host) = &self.rtsp_host {
            return Ok(CaptureSource::rtsp(
                host,
                Some(self.rtsp_port.unwrap_or(capture.default_rtsp_port)),
                &self.rtsp_user,
                &self.rtsp_password,
                &capture.rtsp_path,
            ));
        }
        Ok(CaptureSource::Device(0))
    }
}
