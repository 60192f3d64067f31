//! 错误类型

use thiserror::Error;

/// 视频采集错误
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}: {reason}")]
    Open { uri: String, reason: String },
    #[error("frame read failed: {0}")]
    Read(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// OSC 发送错误
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("cannot resolve OSC destination {addr:?}")]
    Resolve { addr: String },
    #[error("failed to encode OSC packet: {0}")]
    Encode(String),
    #[error("failed to send OSC datagram to {addr}: {source}")]
    Send {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// 流水线致命错误, 结束本次会话
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("capture open failed: {0}")]
    CaptureOpen(#[source] CaptureError),
    #[error("pose model load failed: {0:#}")]
    ModelLoad(anyhow::Error),
    #[error("pose inference failed: {0:#}")]
    Inference(anyhow::Error),
    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),
    #[error("capture thread failed: {0}")]
    Capture(#[source] CaptureError),
    #[error("pipeline worker panicked")]
    Panicked,
}

/// 会话控制错误
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a session is already running")]
    AlreadyRunning,
    #[error("failed to spawn pipeline worker: {0}")]
    Spawn(#[from] std::io::Error),
}
