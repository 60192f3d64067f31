//! 运行统计 - 平滑帧率与每帧计数

use crate::config::ExtractorKind;
use std::time::Duration;

/// 单帧统计快照, 推送给显示端
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StatsSnapshot {
    pub people: usize,
    pub hands: Option<usize>, // 仅投票模式
    pub fps: f64,
}

impl StatsSnapshot {
    /// 会话结束时的归零快照
    pub fn idle(kind: ExtractorKind) -> Self {
        Self {
            people: 0,
            hands: match kind {
                ExtractorKind::Voting => Some(0),
                ExtractorKind::Broadcast => None,
            },
            fps: 0.0,
        }
    }
}

/// 帧率统计: fps = 0.9 * fps + 0.1 / elapsed
#[derive(Clone, Debug, Default)]
pub struct StatsReporter {
    fps: f64,
}

impl StatsReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// 记录一帧耗时; 耗时为 0 时跳过
    pub fn record(&mut self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            self.fps = 0.9 * self.fps + 0.1 / secs;
        }
    }

    pub fn snapshot(&self, people: usize, hands: Option<usize>) -> StatsSnapshot {
        StatsSnapshot {
            people,
            hands,
            fps: self.fps,
        }
    }
}
