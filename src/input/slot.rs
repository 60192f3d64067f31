//! 单槽帧缓冲 - 新帧覆盖未读旧帧 (latest-wins)

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// 读取结果
#[derive(Debug, PartialEq)]
pub enum SlotRead<T> {
    /// 最新一帧及最近一次读取是否成功
    Ready(T, bool),
    /// 超时内没有新帧
    Timeout,
    /// 生产端已结束且没有待读帧
    Closed,
}

struct SlotState<T> {
    pending: Option<T>,
    valid: bool,
    closed: bool,
    failed: bool,
    written: u64,
    evicted: u64,
}

/// 最多持有一帧的互斥缓冲区
pub struct CaptureSlot<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

impl<T> Default for CaptureSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CaptureSlot<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                pending: None,
                valid: false,
                closed: false,
                failed: false,
                written: 0,
                evicted: 0,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 写入新帧, 覆盖未读旧帧; 返回是否丢弃了旧帧
    pub fn put(&self, item: T) -> bool {
        let mut state = self.lock();
        let evicted = state.pending.replace(item).is_some();
        if evicted {
            state.evicted += 1;
        }
        state.valid = true;
        state.written += 1;
        drop(state);
        self.ready.notify_all();
        evicted
    }

    /// 非阻塞取出待读帧
    pub fn take(&self) -> Option<(T, bool)> {
        let mut state = self.lock();
        let valid = state.valid;
        state.pending.take().map(|item| (item, valid))
    }

    /// 阻塞等待待读帧, 已有帧时立即返回
    pub fn read_latest(&self, timeout: Duration) -> SlotRead<T> {
        let state = self.lock();
        let (mut state, _) = self
            .ready
            .wait_timeout_while(state, timeout, |s| s.pending.is_none() && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        match state.pending.take() {
            Some(item) => SlotRead::Ready(item, state.valid),
            None if state.closed => SlotRead::Closed,
            None => SlotRead::Timeout,
        }
    }

    /// 生产端结束; valid=false 表示因读取失败结束
    ///
    /// 已写入的待读帧仍按成功读取返回, 取空后才报告 Closed
    pub fn close(&self, valid: bool) {
        let mut state = self.lock();
        state.closed = true;
        state.failed = !valid;
        drop(state);
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// 已关闭且没有待读帧
    pub fn is_drained(&self) -> bool {
        let state = self.lock();
        state.closed && state.pending.is_none()
    }

    /// 生产端因读取失败结束
    pub fn failed(&self) -> bool {
        self.lock().failed
    }

    /// 清空待读帧
    pub fn clear(&self) {
        self.lock().pending = None;
    }

    /// 已写入帧数
    pub fn written(&self) -> u64 {
        self.lock().written
    }

    /// 未被读取即被覆盖的帧数
    pub fn evicted(&self) -> u64 {
        self.lock().evicted
    }
}
