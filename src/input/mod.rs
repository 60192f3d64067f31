/// 视频输入系统 (Video Input System)
///
/// 独立采集线程, 负责视频流解码并以单槽缓冲交给流水线
/// - CaptureSource: 摄像头编号 / 网络流地址
/// - CaptureSlot:   单槽缓冲 (新帧覆盖旧帧)
/// - FrameSource:   采集线程管理
/// - FfmpegProcess: ffmpeg 子进程解码 (默认)
/// - LibavDevice:   ez-ffmpeg 进程内解码 (feature = "ffmpeg")
pub mod capture;
#[cfg(feature = "ffmpeg")]
pub mod decode_filter;
#[cfg(feature = "ffmpeg")]
pub mod decoder;
pub mod process;
pub mod slot;
pub mod source;

pub use capture::{open_device, CaptureDevice, FrameSource};
#[cfg(feature = "ffmpeg")]
pub use decoder::LibavDevice;
pub use process::FfmpegProcess;
pub use slot::{CaptureSlot, SlotRead};
pub use source::CaptureSource;
