/// 会话控制 (Session Controller)
///
/// 操作员侧的启动/停止: 同一时间最多一个流水线工作线程
/// - start: 清空显示队列, 新建停止信号, 启动工作线程
/// - stop:  发出停止信号, 最多等待 2 秒; 超时后线程仍计为运行中, 直到结束
/// - poll_finished: 取工作线程的最终结果 (只返回一次)
use crate::config::{CaptureConfig, ExtractorKind, ModelConfig, OscConfig, SessionConfig};
use crate::error::{CaptureError, PipelineError, SessionError, TransportError};
use crate::input::{open_device, CaptureDevice, CaptureSource};
use crate::models::{PoseEstimator, YoloPose};
use crate::osc::{OscAddresses, OscSink, StreamEncoder, UdpOscSender};
use crate::pipeline::{DisplayChannel, Pipeline, PipelineConfig, RunSummary, StopToken};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

const STOP_TIMEOUT: Duration = Duration::from_secs(2);

pub type SessionOutcome = Result<RunSummary, PipelineError>;

/// 启动请求
#[derive(Clone, Debug)]
pub struct SessionRequest {
    pub config: SessionConfig,
    pub kind: ExtractorKind,
    pub source: CaptureSource,
}

/// 会话依赖: 模型 / 采集 / 发送
pub trait SessionBackend: Send + Sync {
    fn load_estimator(&self, config: &ModelConfig) -> anyhow::Result<Box<dyn PoseEstimator>>;

    fn open_capture(
        &self,
        source: &CaptureSource,
        config: &CaptureConfig,
    ) -> Result<Box<dyn CaptureDevice>, CaptureError>;

    fn connect_transport(&self, config: &OscConfig) -> Result<Box<dyn OscSink>, TransportError>;
}

/// YoloPose + 默认采集后端 + UDP
pub struct DefaultBackend;

impl SessionBackend for DefaultBackend {
    fn load_estimator(&self, config: &ModelConfig) -> anyhow::Result<Box<dyn PoseEstimator>> {
        let model = YoloPose::new(config)?;
        Ok(Box::new(model))
    }

    fn open_capture(
        &self,
        source: &CaptureSource,
        config: &CaptureConfig,
    ) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        open_device(source, config)
    }

    fn connect_transport(&self, config: &OscConfig) -> Result<Box<dyn OscSink>, TransportError> {
        let sender = UdpOscSender::connect(&config.destination())?;
        Ok(Box::new(sender))
    }
}

pub struct Session {
    display: Arc<DisplayChannel>,
    backend: Arc<dyn SessionBackend>,
    token: StopToken,
    worker: Option<JoinHandle<()>>,
    done_rx: Option<Receiver<SessionOutcome>>,
    stop_timeout: Duration,
}

impl Session {
    pub fn new(display: Arc<DisplayChannel>) -> Self {
        Self::with_backend(display, Arc::new(DefaultBackend))
    }

    pub fn with_backend(display: Arc<DisplayChannel>, backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            display,
            backend,
            token: StopToken::new(),
            worker: None,
            done_rx: None,
            stop_timeout: STOP_TIMEOUT,
        }
    }

    /// 修改停止等待时间 (默认 2 秒)
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn display(&self) -> &Arc<DisplayChannel> {
        &self.display
    }

    /// 工作线程存在且结果尚未取走, 包括停止超时后仍未退出的线程
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// 已发出停止信号, 工作线程仍未退出
    pub fn is_stopping(&self) -> bool {
        self.is_running() && self.token.is_cancelled()
    }

    pub fn start(&mut self, request: SessionRequest) -> Result<(), SessionError> {
        if self.is_running() {
            return Err(SessionError::AlreadyRunning);
        }

        self.display.clear();
        self.token = StopToken::new();
        info!(
            "▶️  启动会话: {} | 视频源 {}",
            request.kind.label(),
            request.source
        );

        let (done_tx, done_rx) = bounded(1);
        let backend = self.backend.clone();
        let display = self.display.clone();
        let token = self.token.clone();
        let handle = thread::Builder::new()
            .name("pipeline".to_string())
            .spawn(move || {
                let outcome = run_session(backend.as_ref(), request, display, &token);
                let _ = done_tx.send(outcome);
            })?;

        self.worker = Some(handle);
        self.done_rx = Some(done_rx);
        Ok(())
    }

    /// 停止会话; 工作线程在超时内结束时返回其结果
    pub fn stop(&mut self) -> Option<SessionOutcome> {
        self.token.cancel();
        let outcome = match self.done_rx.take() {
            Some(rx) => match rx.recv_timeout(self.stop_timeout) {
                Ok(outcome) => {
                    self.join_worker();
                    Some(outcome)
                }
                Err(RecvTimeoutError::Timeout) => {
                    // 推理调用无法中断; 保留句柄, 结束前拒绝新的启动
                    warn!(
                        "⚠️ 工作线程 {:?} 内未结束, 等待其退出后才能重新启动",
                        self.stop_timeout
                    );
                    self.done_rx = Some(rx);
                    None
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.join_worker();
                    Some(Err(PipelineError::Panicked))
                }
            },
            None => None,
        };
        self.display.clear_frame();
        outcome
    }

    /// 非阻塞查询工作线程是否已结束
    pub fn poll_finished(&mut self) -> Option<SessionOutcome> {
        let outcome = match self.done_rx.as_ref()?.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(PipelineError::Panicked),
        };
        self.done_rx = None;
        self.join_worker();
        if self.token.is_cancelled() {
            // 超时线程退出前可能又写入一帧
            self.display.clear_frame();
        }
        Some(outcome)
    }

    fn join_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("❌ 流水线线程异常退出");
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

fn run_session(
    backend: &dyn SessionBackend,
    request: SessionRequest,
    display: Arc<DisplayChannel>,
    token: &StopToken,
) -> SessionOutcome {
    let SessionRequest {
        config,
        kind,
        source,
    } = request;

    let estimator = backend
        .load_estimator(&config.model)
        .map_err(PipelineError::ModelLoad)?;
    info!("✅ 模型加载成功: {}", estimator.name());

    let sink = backend.connect_transport(&config.osc)?;
    let encoder = StreamEncoder::new(sink, OscAddresses::new(&config.osc.address_prefix));

    let mut pipeline = Pipeline::new(PipelineConfig::new(&config, kind), estimator, encoder, display);
    pipeline.run_with(|| backend.open_capture(&source, &config.capture), token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{Frame, InferenceResult};
    use crate::input::capture::tests::ScriptedDevice;
    use crate::osc::RecordingSink;
    use crate::pipeline::StopReason;
    use std::time::Instant;

    struct EmptyEstimator {
        delay: Duration,
    }

    impl PoseEstimator for EmptyEstimator {
        fn infer(&mut self, _frame: &Frame) -> anyhow::Result<InferenceResult> {
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            Ok(InferenceResult::default())
        }

        fn name(&self) -> &str {
            "empty"
        }
    }

    #[derive(Clone, Copy)]
    enum Capture {
        Endless,
        Finite(usize),
        Missing,
    }

    struct FakeBackend {
        capture: Capture,
        model_ok: bool,
        infer_delay: Duration,
        sink: RecordingSink,
    }

    impl FakeBackend {
        fn new(capture: Capture) -> Self {
            Self {
                capture,
                model_ok: true,
                infer_delay: Duration::ZERO,
                sink: RecordingSink::new(),
            }
        }
    }

    impl SessionBackend for FakeBackend {
        fn load_estimator(&self, _config: &ModelConfig) -> anyhow::Result<Box<dyn PoseEstimator>> {
            if !self.model_ok {
                anyhow::bail!("models/missing.onnx not found");
            }
            Ok(Box::new(EmptyEstimator {
                delay: self.infer_delay,
            }))
        }

        fn open_capture(
            &self,
            source: &CaptureSource,
            _config: &CaptureConfig,
        ) -> Result<Box<dyn CaptureDevice>, CaptureError> {
            match self.capture {
                Capture::Endless => Ok(Box::new(ScriptedDevice::endless(Duration::from_millis(2)))),
                Capture::Finite(n) => {
                    let mut device = ScriptedDevice::new(n);
                    device.delay = Duration::from_millis(10);
                    Ok(Box::new(device))
                }
                Capture::Missing => Err(CaptureError::Open {
                    uri: source.to_string(),
                    reason: "no such device".to_string(),
                }),
            }
        }

        fn connect_transport(&self, _config: &OscConfig) -> Result<Box<dyn OscSink>, TransportError> {
            Ok(Box::new(self.sink.clone()))
        }
    }

    fn request() -> SessionRequest {
        let mut config = SessionConfig::default();
        config.capture.read_timeout_ms = 20;
        SessionRequest {
            config,
            kind: ExtractorKind::Voting,
            source: CaptureSource::Device(0),
        }
    }

    fn wait_finished(session: &mut Session) -> SessionOutcome {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(outcome) = session.poll_finished() {
                return outcome;
            }
            assert!(Instant::now() < deadline, "session did not finish");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_single_run_guard() {
        let backend = Arc::new(FakeBackend::new(Capture::Endless));
        let mut session = Session::with_backend(Arc::new(DisplayChannel::new()), backend.clone());

        session.start(request()).unwrap();
        assert!(session.is_running());
        assert!(matches!(
            session.start(request()),
            Err(SessionError::AlreadyRunning)
        ));

        thread::sleep(Duration::from_millis(50));
        let summary = session.stop().unwrap().unwrap();
        assert_eq!(summary.reason, StopReason::Cancelled);
        assert!(!session.is_running());
        assert_eq!(backend.sink.messages().len() as u64, summary.groups_sent * 3);

        // 停止后可以重新启动
        session.start(request()).unwrap();
        assert!(session.stop().unwrap().is_ok());
    }

    #[test]
    fn test_stop_timeout_blocks_restart_until_worker_exits() {
        let display = Arc::new(DisplayChannel::new());
        let mut backend = FakeBackend::new(Capture::Endless);
        backend.infer_delay = Duration::from_millis(300);
        let mut session = Session::with_backend(display.clone(), Arc::new(backend))
            .with_stop_timeout(Duration::from_millis(20));

        session.start(request()).unwrap();
        // 等工作线程进入推理
        thread::sleep(Duration::from_millis(100));
        assert!(session.stop().is_none());
        assert!(session.is_running());
        assert!(session.is_stopping());
        assert!(matches!(
            session.start(request()),
            Err(SessionError::AlreadyRunning)
        ));

        let summary = wait_finished(&mut session).unwrap();
        assert_eq!(summary.reason, StopReason::Cancelled);
        assert!(!session.is_running());
        // 超时线程最后写入的帧不会留给下一次会话
        assert!(display.take_frame().is_none());

        session.start(request()).unwrap();
        assert!(session.is_running());
        assert!(!session.is_stopping());
    }

    #[test]
    fn test_end_of_stream_is_reported_once() {
        let backend = Arc::new(FakeBackend::new(Capture::Finite(2)));
        let mut session = Session::with_backend(Arc::new(DisplayChannel::new()), backend);

        session.start(request()).unwrap();
        let summary = wait_finished(&mut session).unwrap();
        assert_eq!(summary.reason, StopReason::EndOfStream);
        assert!(!session.is_running());
        assert!(session.poll_finished().is_none());
        assert!(session.stop().is_none());
    }

    #[test]
    fn test_model_load_failure() {
        let mut backend = FakeBackend::new(Capture::Endless);
        backend.model_ok = false;
        let mut session = Session::with_backend(Arc::new(DisplayChannel::new()), Arc::new(backend));

        session.start(request()).unwrap();
        let err = wait_finished(&mut session).unwrap_err();
        assert!(matches!(err, PipelineError::ModelLoad(_)));
        assert!(err.to_string().contains("missing.onnx"));
    }

    #[test]
    fn test_capture_open_failure() {
        let backend = Arc::new(FakeBackend::new(Capture::Missing));
        let mut session = Session::with_backend(Arc::new(DisplayChannel::new()), backend.clone());

        session.start(request()).unwrap();
        assert!(matches!(
            wait_finished(&mut session),
            Err(PipelineError::CaptureOpen(_))
        ));
        assert!(backend.sink.messages().is_empty());
    }

    #[test]
    fn test_stop_clears_display_frame() {
        let display = Arc::new(DisplayChannel::new());
        let backend = Arc::new(FakeBackend::new(Capture::Endless));
        let mut session = Session::with_backend(display.clone(), backend);

        session.start(request()).unwrap();
        thread::sleep(Duration::from_millis(50));
        session.stop();
        assert!(display.take_frame().is_none());
        let stats = display.drain_stats();
        assert_eq!(
            stats.last().copied(),
            Some(crate::pipeline::StatsSnapshot::idle(ExtractorKind::Voting))
        );
    }
}
