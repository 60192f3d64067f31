/// 姿态模型统一接口与实现
///
/// # 架构说明
///
/// 流水线只依赖 [`PoseEstimator`] trait: 输入一帧, 输出该帧所有人的检测框与关键点。
/// 模型句柄由调用方创建后注入流水线, 不使用全局单例。
///
/// ## 实现
/// - **YoloPose**: YOLOv8 / YOLO11 pose ONNX 模型 (ort)
///   - 预处理 (letterbox)
///   - 推理 (run)
///   - 后处理 (阈值 + NMS + 关键点归一化)
///   - 文件: `yolo_pose.rs`
///
/// ## 使用示例
/// ```no_run
/// use multiuser_osc::config::ModelConfig;
/// use multiuser_osc::models::{PoseEstimator, YoloPose};
/// use multiuser_osc::Frame;
///
/// let mut model = YoloPose::new(&ModelConfig::default())?;
/// let result = model.infer(&Frame::filled(640, 480, [0, 0, 0]))?;
/// println!("people: {}", result.len());
/// # Ok::<(), anyhow::Error>(())
/// ```
use anyhow::Result;

use crate::detection::{Frame, InferenceResult};

/// 姿态估计接口
///
/// 可重复同步调用, 允许较慢; 除已加载模型外不假设内部状态
pub trait PoseEstimator: Send {
    /// 推理: 帧 → 该帧所有人的检测结果
    fn infer(&mut self, frame: &Frame) -> Result<InferenceResult>;

    /// 模型名称 (日志用)
    fn name(&self) -> &str;
}

pub mod yolo_pose; // YOLOv8/YOLO11 pose 模型

pub use yolo_pose::YoloPose;
