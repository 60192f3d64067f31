/// 无界面运行 (Headless)
///
/// cargo run --release --bin multiuser-osc -- --mode voting --source 0
use clap::Parser;
use crossbeam_channel::bounded;
use mimalloc::MiMalloc;
use multiuser_osc::pipeline::{DisplayChannel, StatsSnapshot};
use multiuser_osc::{logging, Args, Session, SessionConfig, SessionRequest};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const POLL_INTERVAL: Duration = Duration::from_millis(30);

fn main() -> anyhow::Result<()> {
    logging::init();
    let args = Args::parse();

    let mut config = SessionConfig::load(&args.config);
    config.apply_args(&args);
    let source = args
        .capture_source(&config.capture)
        .map_err(anyhow::Error::msg)?;

    info!("🎯 多人互动模块 | 模式 {} | 视频源 {}", args.mode.label(), source);
    info!(
        "📡 OSC {} | 通道 {} | 帧序号 {:?}",
        config.osc.destination(),
        config.channel,
        config.frame_index
    );

    let (stop_tx, stop_rx) = bounded::<()>(1);
    if let Err(err) = ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    }) {
        warn!("⚠️ 无法注册 Ctrl+C 处理: {err}");
    }

    let display = Arc::new(DisplayChannel::new());
    let mut session = Session::new(display.clone());
    session.start(SessionRequest {
        config,
        kind: args.mode,
        source,
    })?;

    let mut latest = StatsSnapshot::default();
    let mut last_log = Instant::now();
    let outcome = loop {
        if stop_rx.try_recv().is_ok() {
            info!("🛑 收到 Ctrl+C, 停止会话...");
            match session.stop() {
                Some(outcome) => break outcome,
                None => return Ok(()),
            }
        }
        if let Some(outcome) = session.poll_finished() {
            break outcome;
        }

        if let Some(stats) = display.drain_stats().pop() {
            latest = stats;
        }
        if last_log.elapsed() >= Duration::from_secs(1) {
            match latest.hands {
                Some(hands) => info!(
                    "📊 People: {} | Hands: {} | FPS: {:.2}",
                    latest.people, hands, latest.fps
                ),
                None => info!("📊 People: {} | FPS: {:.2}", latest.people, latest.fps),
            }
            last_log = Instant::now();
        }
        thread::sleep(POLL_INTERVAL);
    };

    let summary = outcome?;
    info!(
        "✅ 完成: {} 帧, {} 组消息, {} 次发送失败, 丢弃 {} 帧 ({:?})",
        summary.iterations,
        summary.groups_sent,
        summary.transport_errors,
        summary.dropped_frames,
        summary.reason
    );
    Ok(())
}
