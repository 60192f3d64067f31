/// 采集线程模块
/// Frame acquisition thread: device read → single-slot buffer
use super::slot::{CaptureSlot, SlotRead};
use super::source::CaptureSource;
use crate::config::CaptureConfig;
use crate::detection::Frame;
use crate::error::CaptureError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 采集设备接口, 由采集线程独占
pub trait CaptureDevice: Send + 'static {
    /// 阻塞读取一帧; 失败视为流结束
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;

    /// 释放设备
    fn release(&mut self) {}

    fn describe(&self) -> String;
}

/// 按配置打开默认采集后端
pub fn open_device(
    source: &CaptureSource,
    config: &CaptureConfig,
) -> Result<Box<dyn CaptureDevice>, CaptureError> {
    #[cfg(feature = "ffmpeg")]
    {
        let device = super::decoder::LibavDevice::open(source, config)?;
        Ok(Box::new(device))
    }
    #[cfg(not(feature = "ffmpeg"))]
    {
        let device = super::process::FfmpegProcess::open(source, config)?;
        Ok(Box::new(device))
    }
}

/// 视频帧源: 独立采集线程 + 单槽缓冲
pub struct FrameSource {
    slot: Arc<CaptureSlot<Frame>>,
    running: Arc<AtomicBool>,
    device: Option<Box<dyn CaptureDevice>>,
    worker: Option<JoinHandle<Box<dyn CaptureDevice>>>,
    description: String,
}

impl FrameSource {
    /// 打开视频源 (尚未开始采集)
    pub fn open(source: &CaptureSource, config: &CaptureConfig) -> Result<Self, CaptureError> {
        open_device(source, config).map(Self::from_device)
    }

    pub fn from_device(device: Box<dyn CaptureDevice>) -> Self {
        let description = device.describe();
        Self {
            slot: Arc::new(CaptureSlot::new()),
            running: Arc::new(AtomicBool::new(false)),
            device: Some(device),
            worker: None,
            description,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// 启动采集线程
    pub fn start(&mut self) -> Result<(), CaptureError> {
        let Some(device) = self.device.take() else {
            return Ok(());
        };
        self.running.store(true, Ordering::SeqCst);
        let slot = self.slot.clone();
        let running = self.running.clone();
        let handle = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || acquisition_loop(device, slot, running))?;
        self.worker = Some(handle);
        Ok(())
    }

    /// 取最新帧, 超时返回 Timeout 以便调用方检查停止信号
    pub fn read_latest(&self, timeout: Duration) -> SlotRead<Frame> {
        self.slot.read_latest(timeout)
    }

    /// 采集线程仍在运行, 或结束前写入的帧尚未取走
    pub fn is_opened(&self) -> bool {
        self.worker.is_some() && !self.slot.is_drained()
    }

    /// 被覆盖丢弃的帧数
    pub fn dropped_frames(&self) -> u64 {
        self.slot.evicted()
    }

    /// 停止采集线程并释放设备
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(mut device) => device.release(),
                Err(_) => warn!("❌ 采集线程异常退出: {}", self.description),
            }
            info!("📹 采集已停止: {}", self.description);
        } else if let Some(mut device) = self.device.take() {
            device.release();
        }
        self.slot.clear();
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn acquisition_loop(
    mut device: Box<dyn CaptureDevice>,
    slot: Arc<CaptureSlot<Frame>>,
    running: Arc<AtomicBool>,
) -> Box<dyn CaptureDevice> {
    info!("✅ 采集线程启动: {}", device.describe());
    while running.load(Ordering::SeqCst) {
        match device.read_frame() {
            Ok(frame) => {
                if slot.put(frame) {
                    debug!("丢弃未读帧 (累计 {})", slot.evicted());
                }
            }
            Err(e) => {
                // 读取失败即流结束, 不重试
                warn!("⚠️ 读取帧失败, 结束采集: {}", e);
                slot.close(false);
                return device;
            }
        }
    }
    slot.close(true);
    debug!("采集线程退出 (共 {} 帧)", slot.written());
    device
}
