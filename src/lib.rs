// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 会话配置参数
pub mod detection; // 检测结果数据结构
pub mod error; // 错误类型
pub mod input; // 视频输入系统
pub mod logging; // 日志初始化
pub mod models; // 姿态模型接口与实现
pub mod osc; // OSC 消息组编码与发送
pub mod pipeline; // 实时处理流水线
pub mod renderer; // macroquad 操作员界面
pub mod session; // 会话控制 (启动/停止)
pub mod signal; // 信号提取 (投票/广播)

pub use crate::config::{Args, ExtractorKind, FrameIndexPolicy, SessionConfig};
pub use crate::detection::{AnnotatedFrame, BBox, DetectedPerson, Frame, InferenceResult, Keypoint};
pub use crate::error::{CaptureError, PipelineError, SessionError, TransportError};
pub use crate::input::{CaptureSource, FrameSource};
pub use crate::models::PoseEstimator;
pub use crate::osc::{MessageGroup, StreamEncoder};
pub use crate::pipeline::{Pipeline, PipelineState, StopToken};
pub use crate::session::{Session, SessionRequest};
pub use crate::signal::SignalExtractor;

/// COCO 17 点人体关键点数量
pub const NUM_KEYPOINTS: usize = 17;

// 关键点索引 (COCO 顺序)
pub const KPT_NOSE: usize = 0;
pub const KPT_LEFT_SHOULDER: usize = 5;
pub const KPT_RIGHT_SHOULDER: usize = 6;
pub const KPT_LEFT_ELBOW: usize = 7;
pub const KPT_RIGHT_ELBOW: usize = 8;
pub const KPT_LEFT_WRIST: usize = 9;
pub const KPT_RIGHT_WRIST: usize = 10;

pub const SKELETON: [(usize, usize); 16] = [
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
    (5, 6),
    (5, 11),
    (6, 12),
    (11, 12),
    (5, 7),
    (6, 8),
    (7, 9),
    (8, 10),
    (11, 13),
    (12, 14),
    (13, 15),
    (14, 16),
];
