/// 举手投票模块
/// Raised-hand voting: per-frame hand classification and representative coordinate
///
/// 手腕关键点的 y 小于鼻子的 y (画面中更高) 即视为举手。
///
/// 注意: 标签沿用已部署信号的约定, 关键点 9 的判定记为 "右手", 关键点 10 记为 "左手"。
/// 按 COCO 顺序 9 是左腕、10 是右腕, 下游若依赖左右语义需自行对调。
use super::Extraction;
use crate::detection::{DetectedPerson, InferenceResult, Keypoint, Overlay};
use crate::osc::MessageGroup;
use crate::{KPT_LEFT_WRIST, KPT_NOSE, KPT_RIGHT_WRIST};
use rosc::OscType;

/// 代表坐标映射区间
pub const X_NORM_MIN: f64 = -0.07;
pub const X_NORM_MAX: f64 = 0.07;

pub const VOTING_TAG: &str = "HandsRaised";

/// 单人举手状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandPose {
    BothUp,
    LeftOnly,
    RightOnly,
    Down,
}

impl HandPose {
    pub fn label(&self) -> &'static str {
        match self {
            HandPose::BothUp => "Both hands up",
            HandPose::LeftOnly => "Left hand up",
            HandPose::RightOnly => "Right hand up",
            HandPose::Down => "Hands down",
        }
    }
}

/// 手腕是否高于鼻子; y 为 0 视为未检测到
fn raised(wrist: Keypoint, nose: Keypoint) -> bool {
    wrist.y != 0.0 && nose.y != 0.0 && wrist.y < nose.y
}

/// 判定单人举手状态
pub fn classify(person: &DetectedPerson) -> HandPose {
    let nose = person.keypoint(KPT_NOSE);
    let right = raised(person.keypoint(KPT_LEFT_WRIST), nose);
    let left = raised(person.keypoint(KPT_RIGHT_WRIST), nose);
    match (right, left) {
        (true, true) => HandPose::BothUp,
        (false, true) => HandPose::LeftOnly,
        (true, false) => HandPose::RightOnly,
        (false, false) => HandPose::Down,
    }
}

/// 单帧投票计数, 每帧从零开始
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VoteState {
    pub people_detected: usize,
    pub hands_down: usize,
    pub hands_up: usize,
    pub right_hand_only: usize,
    pub left_hand_only: usize,
    /// 每只举起的手记录一次鼻子 x 坐标
    pub raised_hand_xs: Vec<f32>,
}

impl VoteState {
    pub fn tally(result: &InferenceResult) -> (Self, Vec<HandPose>) {
        let mut state = VoteState {
            people_detected: result.len(),
            ..Default::default()
        };
        let mut poses = Vec::with_capacity(result.len());
        for person in &result.persons {
            let pose = classify(person);
            let nose_x = person.keypoint(KPT_NOSE).x;
            match pose {
                HandPose::BothUp => {
                    state.hands_up += 1;
                    state.raised_hand_xs.extend([nose_x, nose_x]);
                }
                HandPose::LeftOnly => {
                    state.left_hand_only += 1;
                    state.raised_hand_xs.push(nose_x);
                }
                HandPose::RightOnly => {
                    state.right_hand_only += 1;
                    state.raised_hand_xs.push(nose_x);
                }
                HandPose::Down => state.hands_down += 1,
            }
            poses.push(pose);
        }
        (state, poses)
    }

    /// 上报的举手数: 单手举起的人数之和 (双手举起不计入)
    pub fn raised_hands(&self) -> usize {
        self.right_hand_only + self.left_hand_only
    }

    /// 代表坐标: 无举手为 0, 否则取第一只举起的手
    pub fn representative_x(&self) -> f32 {
        self.raised_hand_xs.first().copied().unwrap_or(0.0)
    }
}

/// 代表坐标映射到 [-0.07, 0.07]; 恰为下界时 (无人举手) 置 0
pub fn normalize_x(x: f64) -> f64 {
    let mapped = x * (X_NORM_MAX - X_NORM_MIN) + X_NORM_MIN;
    if mapped == X_NORM_MIN {
        0.0
    } else {
        mapped
    }
}

/// 投票提取器
#[derive(Clone, Debug)]
pub struct VotingExtractor {
    channel: String,
}

impl VotingExtractor {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }

    pub fn extract(&self, result: &InferenceResult, frame_index: i32) -> Extraction {
        let (state, poses) = VoteState::tally(result);
        let x_norm = normalize_x(state.representative_x() as f64);
        let raised_hands = state.raised_hands();

        let group = MessageGroup {
            channel: self.channel.clone(),
            frame_index,
            dimensions: 2,
            group_count: 1,
            tag: VOTING_TAG.to_string(),
            sub_index: 1,
            data_dimensions: 3,
            count: 1,
            payload: vec![
                OscType::Int(frame_index),
                OscType::Int(state.people_detected as i32),
                OscType::Int(raised_hands as i32),
                OscType::Float(x_norm as f32),
            ],
        };

        let overlay = result
            .persons
            .iter()
            .zip(&poses)
            .map(|(person, pose)| Overlay::Labeled {
                bbox: person.bbox,
                text: pose.label().to_string(),
            })
            .collect();

        Extraction {
            groups: vec![group],
            overlay,
            people: state.people_detected,
            hands: Some(raised_hands),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;
    use crate::NUM_KEYPOINTS;

    /// 构造只含鼻子与双腕的人
    fn person(nose: (f32, f32), wrist9: (f32, f32), wrist10: (f32, f32)) -> DetectedPerson {
        let mut keypoints = vec![Keypoint::MISSING; NUM_KEYPOINTS];
        keypoints[KPT_NOSE] = Keypoint::new(nose.0, nose.1);
        keypoints[KPT_LEFT_WRIST] = Keypoint::new(wrist9.0, wrist9.1);
        keypoints[KPT_RIGHT_WRIST] = Keypoint::new(wrist10.0, wrist10.1);
        DetectedPerson::new(BBox::new(10., 10., 50., 90., 0.9), keypoints)
    }

    fn payload_x(extraction: &Extraction) -> f32 {
        match extraction.groups[0].payload[3] {
            OscType::Float(x) => x,
            ref other => panic!("unexpected arg {:?}", other),
        }
    }

    #[test]
    fn test_both_hands_up() {
        let result = InferenceResult::new(vec![person((0.5, 0.4), (0.4, 0.2), (0.6, 0.2))]);
        let (state, poses) = VoteState::tally(&result);
        assert_eq!(poses, vec![HandPose::BothUp]);
        assert_eq!(state.hands_up, 1);
        assert_eq!(state.hands_down, 0);
        assert_eq!(state.left_hand_only, 0);
        assert_eq!(state.right_hand_only, 0);
        assert_eq!(state.raised_hand_xs, vec![0.5, 0.5]);
    }

    #[test]
    fn test_single_hand_labels_follow_wrist_index() {
        // 关键点 9 高于鼻子 → "右手"
        let right = person((0.5, 0.4), (0.4, 0.2), (0.6, 0.7));
        assert_eq!(classify(&right), HandPose::RightOnly);
        // 关键点 10 高于鼻子 → "左手"
        let left = person((0.5, 0.4), (0.4, 0.7), (0.6, 0.2));
        assert_eq!(classify(&left), HandPose::LeftOnly);
    }

    #[test]
    fn test_missing_keypoints_are_not_raised() {
        // 手腕缺失
        let p = person((0.5, 0.4), (0.0, 0.0), (0.0, 0.0));
        assert_eq!(classify(&p), HandPose::Down);
        // 鼻子缺失
        let p = person((0.0, 0.0), (0.4, 0.2), (0.6, 0.2));
        assert_eq!(classify(&p), HandPose::Down);
        // 等高不算举手
        let p = person((0.5, 0.4), (0.4, 0.4), (0.6, 0.5));
        assert_eq!(classify(&p), HandPose::Down);
    }

    #[test]
    fn test_no_people_maps_to_zero() {
        let extraction = VotingExtractor::new("OSC_hand_voting").extract(&InferenceResult::default(), 1);
        assert_eq!(extraction.people, 0);
        assert_eq!(extraction.hands, Some(0));
        assert_eq!(payload_x(&extraction), 0.0);
        assert_eq!(extraction.groups.len(), 1);
        assert!(extraction.overlay.is_empty());
    }

    #[test]
    fn test_normalize_x_formula() {
        assert!((normalize_x(0.5) - 0.0).abs() < 1e-12);
        assert_eq!(normalize_x(0.0), 0.0);
        assert!((normalize_x(1.0) - 0.07).abs() < 1e-12);
        assert!((normalize_x(0.25) - (-0.035)).abs() < 1e-12);
    }

    #[test]
    fn test_representative_is_first_raised_hand() {
        let result = InferenceResult::new(vec![
            person((0.2, 0.4), (0.1, 0.7), (0.3, 0.7)), // 放下, 不计入
            person((0.75, 0.4), (0.7, 0.2), (0.8, 0.7)),
            person((0.25, 0.4), (0.2, 0.2), (0.3, 0.2)),
        ]);
        let (state, _) = VoteState::tally(&result);
        assert_eq!(state.representative_x(), 0.75);
        assert_eq!(state.raised_hand_xs.len(), 3);

        let extraction = VotingExtractor::new("ch").extract(&result, 1);
        assert!((payload_x(&extraction) - 0.035).abs() < 1e-6);
    }

    #[test]
    fn test_voting_payload_layout() {
        let result = InferenceResult::new(vec![
            person((0.5, 0.4), (0.4, 0.2), (0.6, 0.7)), // 右手
            person((0.5, 0.4), (0.4, 0.7), (0.6, 0.2)), // 左手
            person((0.5, 0.4), (0.4, 0.2), (0.6, 0.2)), // 双手
        ]);
        let extraction = VotingExtractor::new("OSC_hand_voting").extract(&result, 1);
        let group = &extraction.groups[0];
        assert_eq!(group.tag, "HandsRaised");
        assert_eq!((group.dimensions, group.group_count), (2, 1));
        assert_eq!((group.sub_index, group.data_dimensions, group.count), (1, 3, 1));
        assert_eq!(group.payload[0], OscType::Int(1));
        assert_eq!(group.payload[1], OscType::Int(3));
        // 双手举起不计入举手数
        assert_eq!(group.payload[2], OscType::Int(2));
        assert_eq!(extraction.hands, Some(2));

        let labels: Vec<_> = extraction
            .overlay
            .iter()
            .map(|o| match o {
                Overlay::Labeled { text, .. } => text.as_str(),
                Overlay::Skeleton { .. } => "skeleton",
            })
            .collect();
        assert_eq!(labels, vec!["Right hand up", "Left hand up", "Both hands up"]);
    }
}
