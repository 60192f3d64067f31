/// 信号提取 (Signal extraction)
///
/// 每帧推理结果 → OSC 消息组 + 显示叠加指令 + 统计字段
/// - Broadcast: 多人关键点广播
/// - Voting:    举手投票统计
pub mod broadcast;
pub mod voting;

pub use broadcast::BroadcastExtractor;
pub use voting::{HandPose, VoteState, VotingExtractor};

use crate::config::ExtractorKind;
use crate::detection::{InferenceResult, Overlay};
use crate::osc::MessageGroup;

/// 单帧提取结果
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Extraction {
    pub groups: Vec<MessageGroup>,
    pub overlay: Vec<Overlay>,
    pub people: usize,
    pub hands: Option<usize>,
}

/// 信号提取器, 在流水线配置时选定
#[derive(Clone, Debug)]
pub enum SignalExtractor {
    Broadcast(BroadcastExtractor),
    Voting(VotingExtractor),
}

impl SignalExtractor {
    pub fn new(kind: ExtractorKind, channel: impl Into<String>) -> Self {
        match kind {
            ExtractorKind::Broadcast => SignalExtractor::Broadcast(BroadcastExtractor::new(channel)),
            ExtractorKind::Voting => SignalExtractor::Voting(VotingExtractor::new(channel)),
        }
    }

    pub fn kind(&self) -> ExtractorKind {
        match self {
            SignalExtractor::Broadcast(_) => ExtractorKind::Broadcast,
            SignalExtractor::Voting(_) => ExtractorKind::Voting,
        }
    }

    pub fn extract(&self, result: &InferenceResult, frame_index: i32) -> Extraction {
        match self {
            SignalExtractor::Broadcast(extractor) => extractor.extract(result, frame_index),
            SignalExtractor::Voting(extractor) => extractor.extract(result, frame_index),
        }
    }
}
