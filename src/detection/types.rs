/// 检测系统数据结构定义
/// Data structures shared by capture, inference and display
use image::{imageops, RgbImage};

// ========== 帧 ==========

/// 采集帧 (RGB8), 所有权随流水线阶段转移
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// 从原始 RGB 数据构造, 尺寸不匹配时返回 None
    pub fn from_raw(width: u32, height: u32, rgb_data: Vec<u8>) -> Option<Self> {
        RgbImage::from_raw(width, height, rgb_data).map(Self::new)
    }

    /// 纯色帧 (测试与占位用)
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::new(RgbImage::from_pixel(width, height, image::Rgb(rgb)))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn channels(&self) -> u32 {
        3
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// 水平镜像
    pub fn mirrored(mut self) -> Self {
        imageops::flip_horizontal_in_place(&mut self.image);
        self
    }

    /// 转换为 RGBA (纹理上传用)
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut rgba = Vec::with_capacity((self.width() * self.height() * 4) as usize);
        for pixel in self.image.pixels() {
            rgba.extend_from_slice(&[pixel[0], pixel[1], pixel[2], 255]);
        }
        rgba
    }
}

// ========== 检测结果 ==========

/// 关键点 (归一化坐标, (0,0) 表示未检测到)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
}

impl Keypoint {
    pub const MISSING: Keypoint = Keypoint { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_missing(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

/// 检测框 (像素坐标)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
    pub confidence: f32,
}

impl BBox {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32, confidence: f32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
            confidence,
        }
    }

    pub fn from_cxcywh(cx: f32, cy: f32, w: f32, h: f32, confidence: f32) -> Self {
        Self::new(cx - w / 2., cy - h / 2., cx + w / 2., cy + h / 2., confidence)
    }

    pub fn width(&self) -> f32 {
        (self.xmax - self.xmin).max(0.)
    }

    pub fn height(&self) -> f32 {
        (self.ymax - self.ymin).max(0.)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn intersection_area(&self, another: &BBox) -> f32 {
        let l = self.xmin.max(another.xmin);
        let r = self.xmax.min(another.xmax);
        let t = self.ymin.max(another.ymin);
        let b = self.ymax.min(another.ymax);
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn union(&self, another: &BBox) -> f32 {
        self.area() + another.area() - self.intersection_area(another)
    }

    pub fn iou(&self, another: &BBox) -> f32 {
        let union = self.union(another);
        if union <= 0. {
            return 0.;
        }
        self.intersection_area(another) / union
    }
}

/// 单个人体: 检测框 + K 个关键点 (按模型顺序)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectedPerson {
    pub bbox: BBox,
    pub keypoints: Vec<Keypoint>,
}

impl DetectedPerson {
    pub fn new(bbox: BBox, keypoints: Vec<Keypoint>) -> Self {
        Self { bbox, keypoints }
    }

    /// 越界索引视为未检测到
    pub fn keypoint(&self, index: usize) -> Keypoint {
        self.keypoints
            .get(index)
            .copied()
            .unwrap_or(Keypoint::MISSING)
    }
}

/// 单帧推理结果, 顺序仅在帧内有效
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InferenceResult {
    pub persons: Vec<DetectedPerson>,
}

impl InferenceResult {
    pub fn new(persons: Vec<DetectedPerson>) -> Self {
        Self { persons }
    }

    pub fn len(&self) -> usize {
        self.persons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }
}

// ========== 显示 ==========

/// 叠加绘制指令 (像素坐标 + 归一化关键点)
#[derive(Clone, Debug, PartialEq)]
pub enum Overlay {
    /// 红框 + 文字标签 (投票模式)
    Labeled { bbox: BBox, text: String },
    /// 框 + 关键点 + 骨架 (广播模式)
    Skeleton { bbox: BBox, keypoints: Vec<Keypoint> },
}

/// 推送到显示端的帧
#[derive(Clone, Debug)]
pub struct AnnotatedFrame {
    pub frame: Frame,
    pub overlay: Vec<Overlay>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_mirrored() {
        let mut image = RgbImage::new(3, 1);
        image.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        image.put_pixel(2, 0, image::Rgb([0, 0, 255]));
        let frame = Frame::new(image).mirrored();
        assert_eq!(frame.image().get_pixel(0, 0).0, [0, 0, 255]);
        assert_eq!(frame.image().get_pixel(2, 0).0, [255, 0, 0]);
    }

    #[test]
    fn test_frame_from_raw_size_mismatch() {
        assert!(Frame::from_raw(2, 2, vec![0; 12]).is_some());
        assert!(Frame::from_raw(2, 2, vec![0; 11]).is_none());
    }

    #[test]
    fn test_bbox_iou() {
        let a = BBox::new(0., 0., 10., 10., 0.9);
        let b = BBox::new(5., 0., 15., 10., 0.8);
        assert!((a.iou(&b) - 50. / 150.).abs() < 1e-6);
        assert_eq!(a.iou(&BBox::new(20., 20., 30., 30., 0.5)), 0.);
    }

    #[test]
    fn test_keypoint_out_of_range_is_missing() {
        let person = DetectedPerson::new(BBox::default(), vec![Keypoint::new(0.5, 0.5)]);
        assert_eq!(person.keypoint(0), Keypoint::new(0.5, 0.5));
        assert!(person.keypoint(16).is_missing());
    }
}
