/// 实时处理流水线 (Real-time Processing Pipeline)
///
/// 每个会话两个线程:
/// - Capture:  采集线程, 独占视频设备, 写入单槽缓冲
/// - Pipeline: 推理 → 信号提取 → OSC 发送 → 推送显示
///
/// 状态机: Idle → Running → Draining → Stopped
pub mod display;
pub mod stats;

pub use display::{DisplayChannel, DisplaySink};
pub use stats::{StatsReporter, StatsSnapshot};

use crate::config::{CaptureConfig, ExtractorKind, FrameIndexPolicy, SessionConfig};
use crate::detection::AnnotatedFrame;
use crate::error::{CaptureError, PipelineError};
use crate::input::{open_device, CaptureDevice, CaptureSource, FrameSource, SlotRead};
use crate::models::PoseEstimator;
use crate::osc::StreamEncoder;
use crate::signal::SignalExtractor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 流水线状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Draining,
    Stopped,
}

/// 停止信号, 每次迭代开始时检查
#[derive(Clone, Debug, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn keep_running(&self) -> bool {
        !self.is_cancelled()
    }
}

/// 结束原因
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    EndOfStream,
}

/// 一次运行的汇总
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: u64,
    pub groups_sent: u64,
    pub transport_errors: u64,
    pub dropped_frames: u64,
    pub reason: StopReason,
}

/// 流水线参数
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub kind: ExtractorKind,
    pub channel: String,
    pub frame_index: FrameIndexPolicy,
    pub initial_frame_index: i32,
    pub mirror: bool,
    pub read_timeout: Duration,
    pub capture: CaptureConfig,
}

impl PipelineConfig {
    pub fn new(config: &SessionConfig, kind: ExtractorKind) -> Self {
        Self {
            kind,
            channel: config.channel.clone(),
            frame_index: config.frame_index,
            initial_frame_index: config.initial_frame_index,
            mirror: config.mirror,
            read_timeout: config.capture.read_timeout(),
            capture: config.capture.clone(),
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    extractor: SignalExtractor,
    estimator: Box<dyn PoseEstimator>,
    encoder: StreamEncoder,
    display: Arc<dyn DisplaySink>,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        estimator: Box<dyn PoseEstimator>,
        encoder: StreamEncoder,
        display: Arc<dyn DisplaySink>,
    ) -> Self {
        let extractor = SignalExtractor::new(config.kind, config.channel.clone());
        Self {
            config,
            extractor,
            estimator,
            encoder,
            display,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// 打开视频源并运行, 直到停止信号或流结束
    pub fn run(
        &mut self,
        source: &CaptureSource,
        token: &StopToken,
    ) -> Result<RunSummary, PipelineError> {
        let capture = self.config.capture.clone();
        self.run_with(|| open_device(source, &capture), token)
    }

    /// 用给定的设备打开函数运行
    pub fn run_with<F>(&mut self, open: F, token: &StopToken) -> Result<RunSummary, PipelineError>
    where
        F: FnOnce() -> Result<Box<dyn CaptureDevice>, CaptureError>,
    {
        let device = match open() {
            Ok(device) => device,
            Err(e) => {
                error!("❌ 视频源打开失败: {}", e);
                self.state = PipelineState::Stopped;
                return Err(PipelineError::CaptureOpen(e));
            }
        };

        let mut frames = FrameSource::from_device(device);
        if let Err(e) = frames.start() {
            self.state = PipelineState::Stopped;
            return Err(PipelineError::Capture(e));
        }
        self.state = PipelineState::Running;
        info!(
            "🚀 流水线启动: {} | 模型 {} | 模式 {}",
            frames.description(),
            self.estimator.name(),
            self.config.kind.label()
        );

        let mut summary = RunSummary {
            iterations: 0,
            groups_sent: 0,
            transport_errors: 0,
            dropped_frames: 0,
            reason: StopReason::Cancelled,
        };
        let outcome = self.run_loop(&frames, token, &mut summary);

        self.state = PipelineState::Draining;
        debug!("流水线排空");
        summary.dropped_frames = frames.dropped_frames();
        frames.stop();
        self.display.push_stats(StatsSnapshot::idle(self.config.kind));
        summary.groups_sent = self.encoder.groups_sent();
        self.state = PipelineState::Stopped;

        match outcome {
            Ok(reason) => {
                summary.reason = reason;
                info!(
                    "🛑 流水线停止 ({:?}): {} 帧, {} 组消息, {} 次发送失败, 丢弃 {} 帧",
                    reason,
                    summary.iterations,
                    summary.groups_sent,
                    summary.transport_errors,
                    summary.dropped_frames
                );
                Ok(summary)
            }
            Err(e) => {
                error!("❌ 流水线异常结束: {}", e);
                Err(e)
            }
        }
    }

    fn run_loop(
        &mut self,
        frames: &FrameSource,
        token: &StopToken,
        summary: &mut RunSummary,
    ) -> Result<StopReason, PipelineError> {
        let mut stats = StatsReporter::new();
        let mut frame_index = self.config.initial_frame_index;
        let mut last_log = Instant::now();

        loop {
            if token.is_cancelled() {
                return Ok(StopReason::Cancelled);
            }
            if !frames.is_opened() {
                return Ok(StopReason::EndOfStream);
            }

            let frame = match frames.read_latest(self.config.read_timeout) {
                SlotRead::Ready(frame, true) => frame,
                SlotRead::Ready(_, false) | SlotRead::Closed => {
                    return Ok(StopReason::EndOfStream)
                }
                SlotRead::Timeout => continue,
            };
            let frame = if self.config.mirror {
                frame.mirrored()
            } else {
                frame
            };

            let start = Instant::now();
            let result = self
                .estimator
                .infer(&frame)
                .map_err(PipelineError::Inference)?;

            let extraction = self.extractor.extract(&result, frame_index);
            for group in &extraction.groups {
                if let Err(e) = self.encoder.emit(group) {
                    // 单组丢失不影响后续帧
                    summary.transport_errors += 1;
                    warn!("⚠️ OSC 发送失败: {}", e);
                }
            }
            stats.record(start.elapsed());

            self.display
                .push_stats(stats.snapshot(extraction.people, extraction.hands));
            self.display.push_frame(AnnotatedFrame {
                frame,
                overlay: extraction.overlay,
            });

            summary.iterations += 1;
            if self.config.frame_index == FrameIndexPolicy::Increment {
                frame_index = frame_index.wrapping_add(1);
            }

            if last_log.elapsed() >= Duration::from_secs(1) {
                debug!(
                    "📊 FPS: {:.2} | 人数: {} | 已发送 {} 组",
                    stats.fps(),
                    extraction.people,
                    self.encoder.groups_sent()
                );
                last_log = Instant::now();
            }
        }
    }
}
