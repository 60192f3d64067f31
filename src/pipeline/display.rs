//! 显示端交接 - 帧单槽覆盖, 统计有界队列按序排空

use super::stats::StatsSnapshot;
use crate::detection::AnnotatedFrame;
use crate::input::CaptureSlot;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

pub const STATS_QUEUE_CAPACITY: usize = 64;

/// 显示端接口, 推送不得阻塞流水线
pub trait DisplaySink: Send + Sync {
    fn push_frame(&self, frame: AnnotatedFrame);
    fn push_stats(&self, stats: StatsSnapshot);
}

/// 流水线 → 显示端 的交接通道
pub struct DisplayChannel {
    frame: CaptureSlot<AnnotatedFrame>,
    stats_tx: Sender<StatsSnapshot>,
    stats_rx: Receiver<StatsSnapshot>,
}

impl Default for DisplayChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayChannel {
    pub fn new() -> Self {
        let (stats_tx, stats_rx) = bounded(STATS_QUEUE_CAPACITY);
        Self {
            frame: CaptureSlot::new(),
            stats_tx,
            stats_rx,
        }
    }

    /// 取最新显示帧
    pub fn take_frame(&self) -> Option<AnnotatedFrame> {
        self.frame.take().map(|(frame, _)| frame)
    }

    /// 按序取出所有统计
    pub fn drain_stats(&self) -> Vec<StatsSnapshot> {
        self.stats_rx.try_iter().collect()
    }

    /// 清空帧与统计 (新会话开始)
    pub fn clear(&self) {
        self.frame.clear();
        while self.stats_rx.try_recv().is_ok() {}
    }

    pub fn clear_frame(&self) {
        self.frame.clear();
    }
}

impl DisplaySink for DisplayChannel {
    fn push_frame(&self, frame: AnnotatedFrame) {
        self.frame.put(frame);
    }

    fn push_stats(&self, stats: StatsSnapshot) {
        let mut pending = stats;
        // 队列满时丢弃最旧的统计
        loop {
            match self.stats_tx.try_send(pending) {
                Ok(()) => return,
                Err(TrySendError::Full(back)) => {
                    let _ = self.stats_rx.try_recv();
                    pending = back;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Frame;

    fn annotated(width: u32) -> AnnotatedFrame {
        AnnotatedFrame {
            frame: Frame::filled(width, 1, [0, 0, 0]),
            overlay: Vec::new(),
        }
    }

    #[test]
    fn test_frames_latest_wins() {
        let display = DisplayChannel::new();
        display.push_frame(annotated(1));
        display.push_frame(annotated(2));
        assert_eq!(display.take_frame().unwrap().frame.width(), 2);
        assert!(display.take_frame().is_none());
    }

    #[test]
    fn test_stats_drained_in_order() {
        let display = DisplayChannel::new();
        for people in 0..3 {
            display.push_stats(StatsSnapshot {
                people,
                hands: None,
                fps: 0.0,
            });
        }
        let people: Vec<_> = display.drain_stats().iter().map(|s| s.people).collect();
        assert_eq!(people, vec![0, 1, 2]);
        assert!(display.drain_stats().is_empty());
    }

    #[test]
    fn test_full_stats_queue_drops_oldest() {
        let display = DisplayChannel::new();
        for people in 0..STATS_QUEUE_CAPACITY + 5 {
            display.push_stats(StatsSnapshot {
                people,
                hands: None,
                fps: 0.0,
            });
        }
        let stats = display.drain_stats();
        assert_eq!(stats.len(), STATS_QUEUE_CAPACITY);
        assert_eq!(stats.first().unwrap().people, 5);
        assert_eq!(stats.last().unwrap().people, STATS_QUEUE_CAPACITY + 4);
    }

    #[test]
    fn test_clear() {
        let display = DisplayChannel::new();
        display.push_frame(annotated(1));
        display.push_stats(StatsSnapshot::default());
        display.clear();
        assert!(display.take_frame().is_none());
        assert!(display.drain_stats().is_empty());
    }
}
