/// 进程内解码采集设备 (ez-ffmpeg)
/// In-process decoder: RTSP streams and local cameras
use super::capture::CaptureDevice;
use super::decode_filter::DecodeFilter;
use super::source::CaptureSource;
use crate::config::CaptureConfig;
use crate::detection::Frame;
use crate::error::CaptureError;
use crossbeam_channel::{bounded, never, Receiver};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// ez-ffmpeg 解码设备
pub struct LibavDevice {
    frames: Receiver<Frame>,
    first: Option<Frame>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    description: String,
}

impl LibavDevice {
    /// 启动解码线程并等待首帧
    pub fn open(source: &CaptureSource, config: &CaptureConfig) -> Result<Self, CaptureError> {
        let uri = source.redacted();
        let (tx, frames) = bounded(1);
        let (opened_tx, opened_rx) = bounded::<Result<(), String>>(1);
        let stop = Arc::new(AtomicBool::new(false));

        let filter = DecodeFilter::new(tx, stop.clone());
        let input = build_input(source)?;
        let scale = format!("scale={}:{},format=yuv420p", config.width, config.height);
        let log_uri = uri.clone();

        let worker = thread::Builder::new()
            .name("libav-decode".to_string())
            .spawn(move || {
                let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
                let pipe = pipe.filter("decode", Box::new(filter));
                let out = create_null_output().add_frame_pipeline(pipe);

                let ctx = match FfmpegContext::builder()
                    .input(input)
                    .filter_descs(vec![scale.as_str()])
                    .output(out)
                    .build()
                {
                    Ok(ctx) => ctx,
                    Err(e) => {
                        let _ = opened_tx.send(Err(format!("构建失败: {}", e)));
                        return;
                    }
                };
                let sch = match ctx.start() {
                    Ok(sch) => sch,
                    Err(e) => {
                        let _ = opened_tx.send(Err(format!("启动失败: {}", e)));
                        return;
                    }
                };
                let _ = opened_tx.send(Ok(()));
                let _ = sch.wait();
                info!("📹 解码循环结束: {}", log_uri);
            })?;

        let started = opened_rx
            .recv_timeout(OPEN_TIMEOUT)
            .map_err(|_| "decoder did not start in time".to_string())
            .and_then(|r| r);
        if let Err(reason) = started {
            stop.store(true, Ordering::SeqCst);
            return Err(CaptureError::Open { uri, reason });
        }

        // 首帧到达才算打开成功
        match frames.recv_timeout(OPEN_TIMEOUT) {
            Ok(frame) => {
                info!("✅ 视频源已打开: {}", uri);
                Ok(Self {
                    frames,
                    first: Some(frame),
                    stop,
                    worker: Some(worker),
                    description: uri,
                })
            }
            Err(_) => {
                // 解码线程可能卡在网络读取上, 置停止标志后分离, 不等待
                stop.store(true, Ordering::SeqCst);
                drop(frames);
                drop(worker);
                Err(CaptureError::Open {
                    uri,
                    reason: "no frame decoded".to_string(),
                })
            }
        }
    }
}

fn build_input(source: &CaptureSource) -> Result<Input, CaptureError> {
    match source {
        CaptureSource::Stream(url) => {
            let input = Input::new(url.as_str());
            if url.starts_with("rtsp://") {
                Ok(input.set_input_opts(
                    [("rtsp_transport", "tcp"), ("rtsp_flags", "prefer_tcp")].into(),
                ))
            } else {
                Ok(input)
            }
        }
        CaptureSource::Device(index) => {
            #[cfg(target_os = "windows")]
            let (format, url) = ("dshow", windows_camera_url(*index)?);
            #[cfg(target_os = "macos")]
            let (format, url) = ("avfoundation", format!("{}", index));
            #[cfg(not(any(target_os = "windows", target_os = "macos")))]
            let (format, url) = ("v4l2", format!("/dev/video{}", index));
            Ok(Input::new(url).set_format(format))
        }
    }
}

/// DirectShow 需要设备名
#[cfg(target_os = "windows")]
fn windows_camera_url(index: u32) -> Result<String, CaptureError> {
    let devices = ez_ffmpeg::device::get_input_video_devices().map_err(|e| CaptureError::Open {
        uri: CaptureSource::Device(index).redacted(),
        reason: format!("cannot list DirectShow devices: {}", e),
    })?;
    super::process::dshow_input(index, &devices)
}

impl CaptureDevice for LibavDevice {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        if let Some(frame) = self.first.take() {
            return Ok(frame);
        }
        self.frames
            .recv()
            .map_err(|_| CaptureError::Read("decoder finished".to_string()))
    }

    fn release(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // 关闭接收端, 阻塞中的发送立即失败并结束解码
        self.frames = never();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("❌ 解码线程异常退出: {}", self.description);
            }
        }
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}
