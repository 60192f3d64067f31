/// 检测结果数据结构 (Detection data types)
///
/// - Frame:          采集帧 (RGB)
/// - DetectedPerson: 人体框 + 归一化关键点
/// - AnnotatedFrame: 显示帧 + 叠加绘制指令
pub mod types;

pub use types::{AnnotatedFrame, BBox, DetectedPerson, Frame, InferenceResult, Keypoint, Overlay};
