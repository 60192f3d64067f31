/// 关键点广播模块
/// Multi-person keypoint broadcast: one message group per detected person
use super::Extraction;
use crate::detection::{InferenceResult, Overlay};
use crate::osc::MessageGroup;
use rosc::OscType;

pub const BROADCAST_TAG: &str = "P";

/// 坐标放大倍数
pub const COORD_SCALE: f32 = 10.0;

/// 广播提取器
#[derive(Clone, Debug)]
pub struct BroadcastExtractor {
    channel: String,
}

impl BroadcastExtractor {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }

    /// 每人一组 (序号从 1 开始), 负载为 K 个 (序号, x*10, (1-y)*10) 三元组; 无人时不发送
    pub fn extract(&self, result: &InferenceResult, frame_index: i32) -> Extraction {
        let mut groups = Vec::with_capacity(result.len());
        let mut overlay = Vec::with_capacity(result.len());

        for (person_idx, person) in result.persons.iter().enumerate() {
            let count = person.keypoints.len() as i32;
            let mut payload = Vec::with_capacity(person.keypoints.len() * 3);
            for (i, kpt) in person.keypoints.iter().enumerate() {
                payload.push(OscType::Int(i as i32 + 1));
                payload.push(OscType::Float(kpt.x * COORD_SCALE));
                payload.push(OscType::Float((1.0 - kpt.y) * COORD_SCALE));
            }

            groups.push(MessageGroup {
                channel: self.channel.clone(),
                frame_index,
                dimensions: 2,
                group_count: count,
                tag: BROADCAST_TAG.to_string(),
                sub_index: person_idx as i32 + 1,
                data_dimensions: 2,
                count,
                payload,
            });
            overlay.push(Overlay::Skeleton {
                bbox: person.bbox,
                keypoints: person.keypoints.clone(),
            });
        }

        Extraction {
            groups,
            overlay,
            people: result.len(),
            hands: None,
        }
    }
}
