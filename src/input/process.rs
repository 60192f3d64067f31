//! ffmpeg 子进程采集 - 解码为 rgb24 原始帧从 stdout 读取
//!
//! 支持 V4L2(Linux) / AVFoundation(macOS) / DirectShow(Windows) 摄像头与 RTSP 网络流

use super::capture::CaptureDevice;
use super::source::CaptureSource;
use crate::config::CaptureConfig;
use crate::detection::Frame;
use crate::error::CaptureError;
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// ffmpeg 子进程采集设备
pub struct FfmpegProcess {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    first: Option<Frame>,
    last_error: Arc<Mutex<Option<String>>>,
    stderr_reader: Option<JoinHandle<()>>,
    description: String,
}

impl FfmpegProcess {
    /// 启动 ffmpeg 并读取首帧, 首帧失败即打开失败
    pub fn open(source: &CaptureSource, config: &CaptureConfig) -> Result<Self, CaptureError> {
        let uri = source.redacted();
        let mut cmd = build_command(source, config)?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        info!("🎬 启动 ffmpeg 采集: {}", uri);
        let mut child = cmd.spawn().map_err(|e| CaptureError::Open {
            uri: uri.clone(),
            reason: format!("cannot spawn {}: {}", config.ffmpeg_binary, e),
        })?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            return Err(CaptureError::Open {
                uri,
                reason: "failed to capture ffmpeg stdout".to_string(),
            });
        };

        // 持续读取 stderr, 避免管道写满阻塞 ffmpeg, 并保留最后一条错误
        let last_error = Arc::new(Mutex::new(None));
        let mut stderr_reader = None;
        if let Some(stderr) = child.stderr.take() {
            let last_error = last_error.clone();
            stderr_reader = thread::Builder::new()
                .name("ffmpeg-stderr".to_string())
                .spawn(move || {
                    for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        debug!("ffmpeg: {}", line);
                        *last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(line);
                    }
                })
                .ok();
        }

        let mut device = Self {
            child,
            stdout,
            width: config.width,
            height: config.height,
            first: None,
            last_error,
            stderr_reader,
            description: uri.clone(),
        };

        match device.read_raw() {
            Ok(frame) => {
                info!("✅ 视频源已打开: {} ({}x{})", uri, config.width, config.height);
                device.first = Some(frame);
                Ok(device)
            }
            Err(e) => {
                device.release();
                // ffmpeg 退出后 stderr 关闭, 等待最后的错误信息
                if let Some(reader) = device.stderr_reader.take() {
                    let _ = reader.join();
                }
                let reason = device.last_error().unwrap_or_else(|| e.to_string());
                Err(CaptureError::Open { uri, reason })
            }
        }
    }

    fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn read_raw(&mut self) -> Result<Frame, CaptureError> {
        let frame_bytes = (self.width as usize) * (self.height as usize) * 3;
        let mut buffer = vec![0u8; frame_bytes];
        self.stdout
            .read_exact(&mut buffer)
            .map_err(|e| CaptureError::Read(format!("ffmpeg stream ended: {}", e)))?;
        Frame::from_raw(self.width, self.height, buffer)
            .ok_or_else(|| CaptureError::Read("frame size mismatch".to_string()))
    }
}

impl CaptureDevice for FfmpegProcess {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        if let Some(frame) = self.first.take() {
            return Ok(frame);
        }
        self.read_raw()
    }

    fn release(&mut self) {
        if let Err(e) = self.child.kill() {
            debug!("ffmpeg 已退出: {}", e);
        }
        if let Err(e) = self.child.wait() {
            warn!("⚠️ 等待 ffmpeg 退出失败: {}", e);
        }
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// 构建 ffmpeg 命令行
pub fn build_command(source: &CaptureSource, config: &CaptureConfig) -> Result<Command, CaptureError> {
    let mut cmd = Command::new(&config.ffmpeg_binary);
    cmd.args(input_args(source, config)?);
    cmd.args(output_args(config));
    Ok(cmd)
}

fn input_args(source: &CaptureSource, config: &CaptureConfig) -> Result<Vec<String>, CaptureError> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    match source {
        CaptureSource::Device(index) => {
            let (format, input) = camera_input(*index, config)?;
            args.extend(["-f".to_string(), format.to_string(), "-i".to_string(), input]);
        }
        CaptureSource::Stream(url) => {
            if url.starts_with("rtsp://") || url.starts_with("rtsps://") {
                args.extend(["-rtsp_transport", "tcp"].iter().map(|s| s.to_string()));
            }
            args.extend(
                ["-fflags", "nobuffer", "-flags", "low_delay", "-i"]
                    .iter()
                    .map(|s| s.to_string()),
            );
            args.push(url.clone());
        }
    }
    Ok(args)
}

fn output_args(config: &CaptureConfig) -> Vec<String> {
    vec![
        "-an".to_string(),
        "-vf".to_string(),
        format!("scale={}:{}", config.width, config.height),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-".to_string(),
    ]
}

/// 摄像头输入格式 - 根据平台选择
#[cfg_attr(not(target_os = "windows"), allow(unused_variables))]
fn camera_input(index: u32, config: &CaptureConfig) -> Result<(&'static str, String), CaptureError> {
    #[cfg(target_os = "windows")]
    {
        // dshow 只接受设备名, 先枚举再按编号取名
        let devices = list_dshow_devices(index, &config.ffmpeg_binary)?;
        Ok(("dshow", dshow_input(index, &devices)?))
    }
    #[cfg(target_os = "macos")]
    {
        Ok(("avfoundation", format!("{}", index)))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        Ok(("v4l2", format!("/dev/video{}", index)))
    }
}

#[cfg(target_os = "windows")]
fn list_dshow_devices(index: u32, ffmpeg: &str) -> Result<Vec<String>, CaptureError> {
    // 设备列表写在 stderr, ffmpeg 对 dummy 输入返回失败码属正常
    let output = Command::new(ffmpeg)
        .args(["-hide_banner", "-list_devices", "true", "-f", "dshow", "-i", "dummy"])
        .stdin(Stdio::null())
        .output()
        .map_err(|e| CaptureError::Open {
            uri: CaptureSource::Device(index).redacted(),
            reason: format!("cannot list DirectShow devices with {}: {}", ffmpeg, e),
        })?;
    let devices = parse_dshow_video_devices(&String::from_utf8_lossy(&output.stderr));
    debug!("DirectShow 视频设备: {:?}", devices);
    Ok(devices)
}

/// 从 `ffmpeg -list_devices true -f dshow -i dummy` 的输出中提取视频设备名
///
/// 兼容两种格式: 新版每行带 `(video)` / `(audio)` 标记,
/// 旧版按 "DirectShow video devices" / "DirectShow audio devices" 分段
pub fn parse_dshow_video_devices(listing: &str) -> Vec<String> {
    let mut devices: Vec<String> = Vec::new();
    let mut in_video = false;
    for line in listing.lines() {
        if line.contains("DirectShow video devices") {
            in_video = true;
            continue;
        }
        if line.contains("DirectShow audio devices") {
            in_video = false;
            continue;
        }
        if line.contains("Alternative name") {
            continue;
        }
        let Some(start) = line.find('"') else {
            continue;
        };
        let rest = &line[start + 1..];
        let Some(end) = rest.find('"') else {
            continue;
        };
        let (name, tail) = (&rest[..end], &rest[end + 1..]);
        let is_video = if tail.contains("(video)") {
            true
        } else if tail.contains("(audio)") || tail.contains("(none)") {
            false
        } else {
            in_video
        };
        if is_video && !name.is_empty() && !devices.iter().any(|d| d == name) {
            devices.push(name.to_string());
        }
    }
    devices
}

/// 按编号选择 dshow 设备, 返回 `video=<name>` 输入参数
pub fn dshow_input(index: u32, devices: &[String]) -> Result<String, CaptureError> {
    match devices.get(index as usize) {
        Some(name) => Ok(format!("video={}", name)),
        None => Err(CaptureError::Open {
            uri: CaptureSource::Device(index).redacted(),
            reason: format!(
                "no DirectShow video device at index {} ({} found)",
                index,
                devices.len()
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_rtsp_command_uses_tcp_low_delay() {
        let source = CaptureSource::Stream("rtsp://u:p@10.0.0.5:554/stream2".to_string());
        let cmd = build_command(&source, &CaptureConfig::default()).unwrap();
        let args = args_of(&cmd);
        assert_eq!(cmd.get_program(), "ffmpeg");
        let pos = args.iter().position(|a| a == "-rtsp_transport").unwrap();
        assert_eq!(args[pos + 1], "tcp");
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input + 1], "rtsp://u:p@10.0.0.5:554/stream2");
        assert!(args.contains(&"scale=640:480".to_string()));
        assert!(args.ends_with(&[
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-".to_string()
        ]));
    }

    #[test]
    fn test_http_stream_skips_rtsp_transport() {
        let source = CaptureSource::Stream("http://cam.local/video.mjpg".to_string());
        let args = args_of(&build_command(&source, &CaptureConfig::default()).unwrap());
        assert!(!args.contains(&"-rtsp_transport".to_string()));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_device_command_linux() {
        let args = args_of(
            &build_command(&CaptureSource::Device(2), &CaptureConfig::default()).unwrap(),
        );
        let f = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f + 1], "v4l2");
        assert_eq!(args[f + 3], "/dev/video2");
    }

    #[test]
    fn test_file_path_is_plain_input() {
        let source = CaptureSource::Stream("clips/hands.mp4".to_string());
        let args = args_of(&build_command(&source, &CaptureConfig::default()).unwrap());
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input + 1], "clips/hands.mp4");
        assert!(!args.contains(&"-rtsp_transport".to_string()));
    }

    #[test]
    fn test_parse_dshow_listing_new_format() {
        let listing = r#"[dshow @ 000001] "Integrated Camera" (video)
[dshow @ 000001]   Alternative name "@device_pnp_usb#vid_04f2"
[dshow @ 000001] "OBS Virtual Camera" (none)
[dshow @ 000001] "USB Camera" (video)
[dshow @ 000001] "Microphone (Realtek Audio)" (audio)
dummy: Immediate exit requested"#;
        assert_eq!(
            parse_dshow_video_devices(listing),
            vec!["Integrated Camera".to_string(), "USB Camera".to_string()]
        );
    }

    #[test]
    fn test_parse_dshow_listing_old_format() {
        let listing = r#"[dshow @ 02cec400] DirectShow video devices (some may be both video and audio devices)
[dshow @ 02cec400]  "Logitech HD Webcam C270"
[dshow @ 02cec400]     Alternative name "@device_pnp_usb#vid_046d"
[dshow @ 02cec400] DirectShow audio devices
[dshow @ 02cec400]  "Microphone (HD Webcam C270)"
"#;
        assert_eq!(
            parse_dshow_video_devices(listing),
            vec!["Logitech HD Webcam C270".to_string()]
        );
    }

    #[test]
    fn test_dshow_input_by_index() {
        let devices = vec!["Integrated Camera".to_string(), "USB Camera".to_string()];
        assert_eq!(dshow_input(1, &devices).unwrap(), "video=USB Camera");
        match dshow_input(2, &devices) {
            Err(CaptureError::Open { uri, reason }) => {
                assert_eq!(uri, "camera #2");
                assert!(reason.contains("no DirectShow video device at index 2"));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(input) => panic!("unexpected input: {input}"),
        }
        assert!(dshow_input(0, &[]).is_err());
    }

    #[test]
    fn test_open_missing_binary_is_open_error() {
        let config = CaptureConfig {
            ffmpeg_binary: "definitely-not-an-ffmpeg-binary".to_string(),
            ..CaptureConfig::default()
        };
        match FfmpegProcess::open(&CaptureSource::Device(0), &config) {
            Err(CaptureError::Open { uri, .. }) => assert_eq!(uri, "camera #0"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("open should fail"),
        }
    }
}
