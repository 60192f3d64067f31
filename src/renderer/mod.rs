/// 操作员界面 (Operator UI)
///
/// macroquad 绘制视频与叠加层, egui 控制面板负责启停会话
/// - update: 取最新显示帧 / 排空统计 / 查询会话结束
/// - draw:   视频按比例缩放居中, 叠加检测框与骨架
/// - draw_egui: 控制面板
mod control_panel;

pub use control_panel::{ControlPanel, ControlPanelActions, SourceType};

use crate::config::SessionConfig;
use crate::detection::{AnnotatedFrame, BBox, Keypoint, Overlay};
use crate::pipeline::{DisplayChannel, StatsSnapshot};
use crate::session::{Session, SessionOutcome};
use crate::SKELETON;
use macroquad::prelude::*;
use std::sync::Arc;
use tracing::{error, info};

pub const WINDOW_TITLE: &str = "Multi-user Interaction Module";

pub struct OperatorApp {
    config: SessionConfig,
    session: Session,
    display: Arc<DisplayChannel>,
    panel: ControlPanel,

    last_frame: Option<Texture2D>,
    overlay: Vec<Overlay>,
    stats: StatsSnapshot,
}

impl OperatorApp {
    pub fn new(config: SessionConfig) -> Self {
        let display = Arc::new(DisplayChannel::new());
        let session = Session::new(display.clone());
        Self::with_session(config, session)
    }

    pub fn with_session(config: SessionConfig, session: Session) -> Self {
        let display = session.display().clone();
        let panel = ControlPanel::new(&config);
        Self {
            config,
            session,
            display,
            panel,
            last_frame: None,
            overlay: Vec::new(),
            stats: StatsSnapshot::default(),
        }
    }

    pub fn update(&mut self) {
        // 只显示最新一帧
        if let Some(frame) = self.display.take_frame() {
            // 停止中的工作线程仍可能写入最后一帧
            if !self.session.is_stopping() {
                self.upload(frame);
            }
        }
        if let Some(stats) = self.display.drain_stats().pop() {
            self.stats = stats;
        }
        if let Some(outcome) = self.session.poll_finished() {
            self.finish(outcome);
        }
    }

    fn upload(&mut self, frame: AnnotatedFrame) {
        let AnnotatedFrame { frame, overlay } = frame;
        let (width, height) = (frame.width() as u16, frame.height() as u16);
        let rgba = frame.to_rgba8();

        // 只在分辨率变化时重建纹理
        let needs_rebuild = match &self.last_frame {
            Some(tex) => tex.width() != width as f32 || tex.height() != height as f32,
            None => true,
        };
        if needs_rebuild {
            let texture = Texture2D::from_rgba8(width, height, &rgba);
            texture.set_filter(FilterMode::Linear);
            self.last_frame = Some(texture);
        } else if let Some(tex) = &self.last_frame {
            tex.update(&Image {
                bytes: rgba,
                width,
                height,
            });
        }
        self.overlay = overlay;
    }

    fn finish(&mut self, outcome: SessionOutcome) {
        match outcome {
            Ok(summary) => {
                info!("🛑 会话结束: {:?}, 共 {} 帧", summary.reason, summary.iterations);
            }
            Err(e) => {
                error!("❌ 会话异常结束: {}", e);
                self.panel.last_error = Some(e.to_string());
            }
        }
        self.last_frame = None;
        self.overlay.clear();
    }

    fn start(&mut self) {
        let request = match self.panel.request(&self.config) {
            Ok(request) => request,
            Err(e) => {
                self.panel.last_error = Some(e);
                return;
            }
        };
        self.panel.last_error = None;
        self.stats = StatsSnapshot::default();
        if let Err(e) = self.session.start(request) {
            self.panel.last_error = Some(e.to_string());
        }
    }

    fn stop(&mut self) {
        if let Some(outcome) = self.session.stop() {
            self.finish(outcome);
        }
        self.last_frame = None;
        self.overlay.clear();
        self.stats = StatsSnapshot::idle(self.panel.script);
    }

    pub fn draw(&self) {
        clear_background(BLACK);

        let Some(texture) = &self.last_frame else {
            let text = "No video";
            let dims = measure_text(text, None, 32, 1.0);
            draw_text(
                text,
                (screen_width() - dims.width) / 2.0,
                screen_height() / 2.0,
                32.0,
                GRAY,
            );
            return;
        };

        // 等比缩放居中
        let scale = (screen_width() / texture.width()).min(screen_height() / texture.height());
        let view = View {
            scale,
            x0: (screen_width() - texture.width() * scale) / 2.0,
            y0: (screen_height() - texture.height() * scale) / 2.0,
            width: texture.width(),
            height: texture.height(),
        };

        draw_texture_ex(
            texture,
            view.x0,
            view.y0,
            WHITE,
            DrawTextureParams {
                dest_size: Some(vec2(texture.width() * scale, texture.height() * scale)),
                ..Default::default()
            },
        );

        for item in &self.overlay {
            match item {
                Overlay::Labeled { bbox, text } => draw_labeled(&view, bbox, text),
                Overlay::Skeleton { bbox, keypoints } => draw_skeleton(&view, bbox, keypoints),
            }
        }
    }

    pub fn draw_egui(&mut self) {
        let running = self.session.is_running();
        let mut actions = ControlPanelActions::default();
        egui_macroquad::ui(|egui_ctx| {
            actions = self.panel.show(egui_ctx, &self.stats, running);
        });
        egui_macroquad::draw();

        if actions.start {
            self.start();
        }
        if actions.stop {
            self.stop();
        }
    }

    /// 退出前停止会话
    pub fn shutdown(&mut self) {
        if self.session.is_running() {
            self.stop();
        }
    }
}

/// 帧像素坐标 → 屏幕坐标
struct View {
    scale: f32,
    x0: f32,
    y0: f32,
    width: f32,
    height: f32,
}

impl View {
    fn point(&self, x: f32, y: f32) -> Vec2 {
        vec2(self.x0 + x * self.scale, self.y0 + y * self.scale)
    }

    /// 归一化关键点 → 屏幕坐标
    fn keypoint(&self, kp: &Keypoint) -> Vec2 {
        self.point(kp.x * self.width, kp.y * self.height)
    }
}

fn draw_labeled(view: &View, bbox: &BBox, text: &str) {
    let p1 = view.point(bbox.xmin, bbox.ymin);
    let p2 = view.point(bbox.xmax, bbox.ymax);
    draw_rectangle_lines(p1.x, p1.y, p2.x - p1.x, p2.y - p1.y, 2.0, RED);

    // 标签底色条
    let dims = measure_text(text, None, 20, 1.0);
    let bar_y = (p1.y - dims.height - 8.0).max(0.0);
    draw_rectangle(p1.x, bar_y, dims.width + 8.0, dims.height + 8.0, RED);
    draw_text(text, p1.x + 4.0, bar_y + dims.height + 3.0, 20.0, WHITE);
}

fn draw_skeleton(view: &View, bbox: &BBox, keypoints: &[Keypoint]) {
    let p1 = view.point(bbox.xmin, bbox.ymin);
    let p2 = view.point(bbox.xmax, bbox.ymax);
    draw_rectangle_lines(p1.x, p1.y, p2.x - p1.x, p2.y - p1.y, 2.0, GREEN);

    for kp in keypoints.iter().filter(|kp| !kp.is_missing()) {
        let p = view.keypoint(kp);
        draw_circle(p.x, p.y, 4.0, RED);
    }

    for &(a, b) in &SKELETON {
        let (Some(ka), Some(kb)) = (keypoints.get(a), keypoints.get(b)) else {
            continue;
        };
        if ka.is_missing() || kb.is_missing() {
            continue;
        }
        let (pa, pb) = (view.keypoint(ka), view.keypoint(kb));
        draw_line(pa.x, pa.y, pb.x, pb.y, 2.0, YELLOW);
    }
}
