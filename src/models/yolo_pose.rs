// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use anyhow::{bail, Context, Result};
use fast_image_resize as fr;
use ndarray::{Array4, ArrayViewD};
use ort::execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tracing::info;

use super::PoseEstimator;
use crate::config::ModelConfig;
use crate::detection::{BBox, DetectedPerson, Frame, InferenceResult, Keypoint};

const CXYWH_OFFSET: usize = 4;
const KPT_STEP: usize = 3;

/// 后处理参数
#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
    pub conf: f32,
    pub iou: f32,
    pub kconf: f32,
    pub ratio: f32,  // letterbox 缩放比例
    pub width0: f32, // 原始帧宽
    pub height0: f32,
}

/// 按启用的 feature 注册推理后端, 按顺序尝试, 最后回退 CPU
pub fn execution_providers() -> Vec<ExecutionProviderDispatch> {
    let mut providers = Vec::new();
    #[cfg(feature = "tensorrt")]
    providers.push(ort::execution_providers::TensorRTExecutionProvider::default().build());
    #[cfg(feature = "cuda")]
    providers.push(ort::execution_providers::CUDAExecutionProvider::default().build());
    providers.push(CPUExecutionProvider::default().build());
    providers
}

/// YOLOv8 / YOLO11 pose 模型
pub struct YoloPose {
    session: Session,
    name: String,
    input_size: u32,
    conf: f32,
    iou: f32,
    kconf: f32,
    resizer: fr::Resizer,
}

impl YoloPose {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads.max(1))?
            .with_execution_providers(execution_providers())?;
        let session = builder
            .commit_from_file(&config.path)
            .with_context(|| format!("Failed to load pose model {}", config.path.display()))?;

        let name = config
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "yolo-pose".to_string());
        info!(
            "📦 姿态模型: {} | 输入 {}x{} | conf {:.2} | iou {:.2} | kconf {:.2}",
            name,
            config.input_size,
            config.input_size,
            config.conf_threshold,
            config.iou_threshold,
            config.keypoint_threshold
        );

        Ok(Self {
            session,
            name,
            input_size: config.input_size,
            conf: config.conf_threshold,
            iou: config.iou_threshold,
            kconf: config.keypoint_threshold,
            resizer: fr::Resizer::new(),
        })
    }

    /// letterbox 预处理: 等比缩放到左上角, 其余填充灰色
    pub fn preprocess(&mut self, frame: &Frame) -> Result<(Array4<f32>, f32)> {
        let size = self.input_size as usize;
        let (w0, h0) = (frame.width() as f32, frame.height() as f32);
        let (ratio, w_new, h_new) = scale_wh(w0, h0, self.input_size as f32, self.input_size as f32);
        let (w_new, h_new) = ((w_new as u32).max(1), (h_new as u32).max(1));

        let src_image = fr::images::Image::from_vec_u8(
            frame.width(),
            frame.height(),
            frame.image().as_raw().clone(),
            fr::PixelType::U8x3,
        )?;
        let mut dst_image = fr::images::Image::new(w_new, h_new, fr::PixelType::U8x3);
        self.resizer.resize(
            &src_image,
            &mut dst_image,
            &fr::ResizeOptions::new()
                .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
        )?;

        let mut ys = Array4::<f32>::from_elem((1, 3, size, size), 144.0 / 255.0);
        let row_len = w_new as usize;
        for (i, rgb) in dst_image.buffer().chunks_exact(3).enumerate() {
            let x = i % row_len;
            let y = i / row_len;
            ys[[0, 0, y, x]] = rgb[0] as f32 / 255.0;
            ys[[0, 1, y, x]] = rgb[1] as f32 / 255.0;
            ys[[0, 2, y, x]] = rgb[2] as f32 / 255.0;
        }
        Ok((ys, ratio))
    }

    pub fn run(&mut self, xs: Array4<f32>, params: DecodeParams) -> Result<InferenceResult> {
        let input_tensor = Tensor::from_array(xs)?;
        let outputs = self
            .session
            .run(ort::inputs!["images" => input_tensor])
            .context("Pose inference failed")?;
        let output: ArrayViewD<f32> = outputs["output0"]
            .try_extract_array()
            .context("Failed to extract output")?;
        decode_output(&output, &params)
    }
}

impl PoseEstimator for YoloPose {
    fn infer(&mut self, frame: &Frame) -> Result<InferenceResult> {
        let (xs, ratio) = self.preprocess(frame)?;
        let params = DecodeParams {
            conf: self.conf,
            iou: self.iou,
            kconf: self.kconf,
            ratio,
            width0: frame.width() as f32,
            height0: frame.height() as f32,
        };
        self.run(xs, params)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn scale_wh(w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
    let r = (w1 / w0).min(h1 / h0);
    (r, (w0 * r).round(), (h0 * r).round())
}

/// 后处理: 模型输出 [1, 4 + 1 + 3K, N] → 检测结果
///
/// 关键点按原始帧尺寸归一化; 可见度低于 kconf 的关键点记为 (0,0)
pub fn decode_output(output: &ArrayViewD<f32>, params: &DecodeParams) -> Result<InferenceResult> {
    let shape = output.shape();
    if shape.len() != 3 || shape[1] < CXYWH_OFFSET + 1 + KPT_STEP {
        bail!("unexpected pose output shape {:?}", shape);
    }
    let channels = shape[1];
    let nk = (channels - CXYWH_OFFSET - 1) / KPT_STEP;
    let kpt_offset = channels - KPT_STEP * nk;
    let (w0, h0) = (params.width0, params.height0);

    let mut data: Vec<DetectedPerson> = Vec::new();
    for i in 0..shape[2] {
        let confidence = output[[0, CXYWH_OFFSET, i]];
        if confidence < params.conf {
            continue;
        }

        let cx = output[[0, 0, i]] / params.ratio;
        let cy = output[[0, 1, i]] / params.ratio;
        let w = output[[0, 2, i]] / params.ratio;
        let h = output[[0, 3, i]] / params.ratio;
        let raw = BBox::from_cxcywh(cx, cy, w, h, confidence);
        let bbox = BBox::new(
            raw.xmin.clamp(0., w0),
            raw.ymin.clamp(0., h0),
            raw.xmax.clamp(0., w0),
            raw.ymax.clamp(0., h0),
            confidence,
        );

        let mut keypoints = Vec::with_capacity(nk);
        for k in 0..nk {
            let kx = output[[0, kpt_offset + KPT_STEP * k, i]] / params.ratio;
            let ky = output[[0, kpt_offset + KPT_STEP * k + 1, i]] / params.ratio;
            let kconf = output[[0, kpt_offset + KPT_STEP * k + 2, i]];
            if kconf < params.kconf {
                keypoints.push(Keypoint::MISSING);
            } else {
                keypoints.push(Keypoint::new(
                    (kx / w0).clamp(0., 1.),
                    (ky / h0).clamp(0., 1.),
                ));
            }
        }

        data.push(DetectedPerson::new(bbox, keypoints));
    }

    non_max_suppression(&mut data, params.iou);
    Ok(InferenceResult::new(data))
}

pub fn non_max_suppression(xs: &mut Vec<DetectedPerson>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.bbox.confidence.total_cmp(&b1.bbox.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].bbox.iou(&xs[index].bbox);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    const CHANNELS: usize = 5 + 3 * 17;

    fn anchor(out: &mut Array<f32, IxDyn>, i: usize, bbox: [f32; 5], kpts: &[(f32, f32, f32)]) {
        for (c, v) in bbox.iter().enumerate() {
            out[[0, c, i]] = *v;
        }
        for (k, (x, y, conf)) in kpts.iter().enumerate() {
            out[[0, 5 + 3 * k, i]] = *x;
            out[[0, 5 + 3 * k + 1, i]] = *y;
            out[[0, 5 + 3 * k + 2, i]] = *conf;
        }
    }

    fn params() -> DecodeParams {
        DecodeParams {
            conf: 0.25,
            iou: 0.7,
            kconf: 0.5,
            ratio: 0.5, // 1280x960 → 640
            width0: 1280.,
            height0: 960.,
        }
    }

    #[test]
    fn test_decode_pose_output() {
        let mut out = Array::zeros(IxDyn(&[1, CHANNELS, 3]));
        let kpts: Vec<(f32, f32, f32)> = (0..17).map(|k| (320., 10. * k as f32, 0.9)).collect();
        anchor(&mut out, 0, [320., 240., 100., 200., 0.9], &kpts);
        // 与第一个高度重叠的低分框, 被 NMS 抑制
        anchor(&mut out, 1, [322., 242., 100., 200., 0.6], &kpts);
        // 低于阈值
        anchor(&mut out, 2, [100., 100., 50., 50., 0.1], &kpts);

        let result = decode_output(&out.view(), &params()).unwrap();
        assert_eq!(result.len(), 1);
        let person = &result.persons[0];
        assert!((person.bbox.xmin - 540.).abs() < 1e-3);
        assert!((person.bbox.ymax - 680.).abs() < 1e-3);
        assert_eq!(person.keypoints.len(), 17);
        assert!((person.keypoints[0].x - 0.5).abs() < 1e-6);
        assert!((person.keypoints[1].y - 20. / 960.).abs() < 1e-6);
    }

    #[test]
    fn test_low_visibility_keypoint_is_sentinel() {
        let mut out = Array::zeros(IxDyn(&[1, CHANNELS, 1]));
        let mut kpts: Vec<(f32, f32, f32)> = (0..17).map(|_| (100., 100., 0.9)).collect();
        kpts[9] = (100., 50., 0.2);
        anchor(&mut out, 0, [320., 240., 100., 200., 0.8], &kpts);

        let result = decode_output(&out.view(), &params()).unwrap();
        assert!(result.persons[0].keypoints[9].is_missing());
        assert!(!result.persons[0].keypoints[10].is_missing());
    }

    #[test]
    fn test_execution_providers_follow_features() {
        let expected = 1 + usize::from(cfg!(feature = "cuda")) + usize::from(cfg!(feature = "tensorrt"));
        let providers = execution_providers();
        assert_eq!(providers.len(), expected);
    }

    #[test]
    fn test_decode_rejects_bad_shape() {
        let out = Array::<f32, _>::zeros(IxDyn(&[1, 6]));
        assert!(decode_output(&out.view(), &params()).is_err());
    }

    #[test]
    fn test_nms_keeps_disjoint_boxes() {
        let mut xs = vec![
            DetectedPerson::new(BBox::new(0., 0., 10., 10., 0.5), vec![]),
            DetectedPerson::new(BBox::new(50., 50., 60., 60., 0.9), vec![]),
            DetectedPerson::new(BBox::new(1., 1., 11., 11., 0.4), vec![]),
        ];
        non_max_suppression(&mut xs, 0.5);
        assert_eq!(xs.len(), 2);
        assert_eq!(xs[0].bbox.confidence, 0.9);
        assert_eq!(xs[1].bbox.confidence, 0.5);
    }

    #[test]
    fn test_scale_wh() {
        let (r, w, h) = scale_wh(1280., 720., 640., 640.);
        assert!((r - 0.5).abs() < 1e-6);
        assert_eq!((w, h), (640., 360.));
    }
}
