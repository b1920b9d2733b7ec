use std::cell::RefCell;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::imageops::FilterType;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;

use crate::camera::Frame;
use crate::error::VisionError;
use crate::types::{
    BoundingBox, GestureResult, HandDetection, LandmarkSet, ObjectDetection, Point3D,
    HAND_LANDMARK_COUNT,
};

#[async_trait(?Send)]
pub trait HandDetector {
    async fn estimate(&self, frame: &Frame) -> Result<Vec<HandDetection>>;
}

#[async_trait(?Send)]
pub trait ObjectDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<ObjectDetection>>;
}

#[async_trait(?Send)]
pub trait GestureClassifier {
    /// Scores the registered gesture templates; candidates under `min_confidence` are omitted.
    async fn estimate(&self, landmarks: &LandmarkSet, min_confidence: f32) -> Result<Vec<GestureResult>>;
}

/// Stand-in when a model file is not available. Never reports anything.
pub struct NullDetector {
    label: &'static str,
}

impl NullDetector {
    pub fn new(label: &'static str) -> Self {
        tracing::warn!(detector = label, "Model not found, detections disabled");
        Self { label }
    }
}

#[async_trait(?Send)]
impl HandDetector for NullDetector {
    async fn estimate(&self, _frame: &Frame) -> Result<Vec<HandDetection>> {
        tracing::trace!(detector = self.label, "null hand estimate");
        Ok(Vec::new())
    }
}

#[async_trait(?Send)]
impl ObjectDetector for NullDetector {
    async fn detect(&self, _frame: &Frame) -> Result<Vec<ObjectDetection>> {
        tracing::trace!(detector = self.label, "null object detect");
        Ok(Vec::new())
    }
}

fn build_session(model_path: &str) -> Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(4)?
        .with_execution_providers([
            ort::execution_providers::CPUExecutionProvider::default().build(),
        ])?
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load model {}", model_path))?;
    Ok(session)
}

pub fn hand_detector(model_path: &str, presence_threshold: f32) -> Result<Box<dyn HandDetector>> {
    if Path::new(model_path).exists() {
        Ok(Box::new(OnnxHandDetector::new(model_path, presence_threshold)?))
    } else {
        Ok(Box::new(NullDetector::new("hand")))
    }
}

pub fn object_detector(model_path: &str, score_threshold: f32) -> Result<Box<dyn ObjectDetector>> {
    if Path::new(model_path).exists() {
        Ok(Box::new(OnnxObjectDetector::new(model_path, score_threshold)?))
    } else {
        Ok(Box::new(NullDetector::new("object")))
    }
}

const HAND_INPUT: u32 = 224;
const HAND_OUT_LANDMARKS: &str = "Identity";
const HAND_OUT_PRESENCE: &str = "Identity_1";

fn missing_output(detector: &'static str, name: &str) -> VisionError {
    VisionError::MalformedOutput {
        detector,
        detail: format!("model has no output named {}", name),
    }
}

/// 21-landmark hand model run over the whole frame.
///
/// `Identity` holds 63 floats (x, y, z per landmark, in input pixels),
/// `Identity_1` the hand presence probability.
pub struct OnnxHandDetector {
    session: RefCell<Session>,
    presence_threshold: f32,
}

impl OnnxHandDetector {
    pub fn new(model_path: &str, presence_threshold: f32) -> Result<Self> {
        tracing::info!(model = model_path, "Loading hand landmark model");
        Ok(Self {
            session: RefCell::new(build_session(model_path)?),
            presence_threshold,
        })
    }
}

#[async_trait(?Send)]
impl HandDetector for OnnxHandDetector {
    async fn estimate(&self, frame: &Frame) -> Result<Vec<HandDetection>> {
        let resized = image::imageops::resize(frame, HAND_INPUT, HAND_INPUT, FilterType::Triangle);

        // NHWC, scaled to [0, 1]
        let mut input_data = Vec::with_capacity((HAND_INPUT * HAND_INPUT * 3) as usize);
        for pixel in resized.pixels() {
            input_data.push(pixel[0] as f32 / 255.0);
            input_data.push(pixel[1] as f32 / 255.0);
            input_data.push(pixel[2] as f32 / 255.0);
        }
        let input = Tensor::from_array((vec![1, HAND_INPUT as i64, HAND_INPUT as i64, 3], input_data))?;

        let mut session = self.session.borrow_mut();
        let outputs = session.run(ort::inputs![input])?;
        let (_, landmarks_raw) = outputs
            .get(HAND_OUT_LANDMARKS)
            .ok_or_else(|| missing_output("hand", HAND_OUT_LANDMARKS))?
            .try_extract_tensor::<f32>()?;
        let (_, presence_raw) = outputs
            .get(HAND_OUT_PRESENCE)
            .ok_or_else(|| missing_output("hand", HAND_OUT_PRESENCE))?
            .try_extract_tensor::<f32>()?;
        let presence = presence_raw.first().copied().unwrap_or(0.0);

        let hand = decode_hand(
            landmarks_raw,
            presence,
            self.presence_threshold,
            frame.width() as f32 / HAND_INPUT as f32,
            frame.height() as f32 / HAND_INPUT as f32,
        )?;
        Ok(hand.into_iter().collect())
    }
}

/// Turns raw landmark output into a frame-space detection, or `None` when no hand is present.
pub fn decode_hand(
    raw: &[f32],
    presence: f32,
    threshold: f32,
    scale_x: f32,
    scale_y: f32,
) -> Result<Option<HandDetection>, VisionError> {
    if presence < threshold {
        return Ok(None);
    }
    if raw.len() < HAND_LANDMARK_COUNT * 3 {
        return Err(VisionError::MalformedOutput {
            detector: "hand",
            detail: format!("expected {} values, got {}", HAND_LANDMARK_COUNT * 3, raw.len()),
        });
    }
    let points = raw
        .chunks_exact(3)
        .take(HAND_LANDMARK_COUNT)
        .map(|c| Point3D::new(c[0] * scale_x, c[1] * scale_y, c[2]))
        .collect();
    let landmarks = LandmarkSet::from_points(points)?;
    let bounding_box = landmarks.extent();
    Ok(Some(HandDetection { landmarks, bounding_box }))
}

const OBJECT_INPUT: u32 = 300;
const OUT_BOXES: &str = "detection_boxes:0";
const OUT_CLASSES: &str = "detection_classes:0";
const OUT_SCORES: &str = "detection_scores:0";
const OUT_COUNT: &str = "num_detections:0";

/// SSD-style COCO detector (uint8 NHWC input, post-processed outputs).
pub struct OnnxObjectDetector {
    session: RefCell<Session>,
    score_threshold: f32,
}

impl OnnxObjectDetector {
    pub fn new(model_path: &str, score_threshold: f32) -> Result<Self> {
        tracing::info!(model = model_path, "Loading object detection model");
        Ok(Self {
            session: RefCell::new(build_session(model_path)?),
            score_threshold,
        })
    }
}

#[async_trait(?Send)]
impl ObjectDetector for OnnxObjectDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<ObjectDetection>> {
        let resized = image::imageops::resize(frame, OBJECT_INPUT, OBJECT_INPUT, FilterType::Triangle);
        let input_data = resized.into_raw();
        let input = Tensor::from_array((vec![1, OBJECT_INPUT as i64, OBJECT_INPUT as i64, 3], input_data))?;

        let mut session = self.session.borrow_mut();
        let outputs = session.run(ort::inputs![input])?;
        let (_, boxes) = outputs
            .get(OUT_BOXES)
            .ok_or_else(|| missing_output("object", OUT_BOXES))?
            .try_extract_tensor::<f32>()?;
        let (_, classes) = outputs
            .get(OUT_CLASSES)
            .ok_or_else(|| missing_output("object", OUT_CLASSES))?
            .try_extract_tensor::<f32>()?;
        let (_, scores) = outputs
            .get(OUT_SCORES)
            .ok_or_else(|| missing_output("object", OUT_SCORES))?
            .try_extract_tensor::<f32>()?;
        let (_, count) = outputs
            .get(OUT_COUNT)
            .ok_or_else(|| missing_output("object", OUT_COUNT))?
            .try_extract_tensor::<f32>()?;
        let count = count.first().copied().unwrap_or(0.0).max(0.0) as usize;

        Ok(decode_ssd(
            boxes,
            classes,
            scores,
            count,
            self.score_threshold,
            frame.width() as f32,
            frame.height() as f32,
        ))
    }
}

/// Boxes arrive as normalized `[ymin, xmin, ymax, xmax]`; class ids index [`COCO_LABELS`].
pub fn decode_ssd(
    boxes: &[f32],
    classes: &[f32],
    scores: &[f32],
    count: usize,
    threshold: f32,
    frame_w: f32,
    frame_h: f32,
) -> Vec<ObjectDetection> {
    let n = count.min(classes.len()).min(scores.len()).min(boxes.len() / 4);
    let mut detections = Vec::new();
    for i in 0..n {
        let score = scores[i];
        if !(score >= threshold) {
            continue;
        }
        let label = match COCO_LABELS.get(classes[i] as usize) {
            Some(label) if !label.is_empty() => *label,
            _ => continue,
        };
        let ymin = boxes[i * 4].clamp(0.0, 1.0);
        let xmin = boxes[i * 4 + 1].clamp(0.0, 1.0);
        let ymax = boxes[i * 4 + 2].clamp(0.0, 1.0);
        let xmax = boxes[i * 4 + 3].clamp(0.0, 1.0);
        detections.push(ObjectDetection {
            class: label.to_string(),
            score,
            bbox: BoundingBox::new(
                xmin * frame_w,
                ymin * frame_h,
                (xmax - xmin).max(0.0) * frame_w,
                (ymax - ymin).max(0.0) * frame_h,
            ),
        });
    }
    detections
}

/// COCO category ids; empty strings are ids unused by the dataset.
pub const COCO_LABELS: [&str; 91] = [
    "", "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "", "backpack",
    "umbrella", "", "", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard",
    "sports ball", "kite", "baseball bat", "baseball glove", "skateboard", "surfboard",
    "tennis racket", "bottle", "", "wine glass", "cup", "fork", "knife", "spoon", "bowl",
    "banana", "apple", "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut",
    "cake", "chair", "couch", "potted plant", "bed", "", "dining table", "", "", "toilet", "",
    "tv", "laptop", "mouse", "remote", "keyboard", "cell phone", "microwave", "oven", "toaster",
    "sink", "refrigerator", "", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_output_names_the_detector() {
        let err = missing_output("object", OUT_BOXES);
        assert_eq!(
            err.to_string(),
            "malformed object detector output: model has no output named detection_boxes:0"
        );
    }

    #[test]
    fn coco_table_lines_up() {
        assert_eq!(COCO_LABELS[1], "person");
        assert_eq!(COCO_LABELS[44], "bottle");
        assert_eq!(COCO_LABELS[47], "cup");
        assert_eq!(COCO_LABELS[90], "toothbrush");
    }

    #[test]
    fn ssd_decode_scales_and_filters() {
        let boxes = [
            0.1, 0.2, 0.5, 0.6, // cup, kept
            0.0, 0.0, 1.0, 1.0, // low score
            0.0, 0.0, 0.5, 0.5, // unused id
        ];
        let classes = [47.0, 44.0, 12.0];
        let scores = [0.9, 0.2, 0.95];
        let out = decode_ssd(&boxes, &classes, &scores, 3, 0.5, 1000.0, 500.0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].class, "cup");
        let b = out[0].bbox;
        assert!((b.x - 200.0).abs() < 1e-3);
        assert!((b.y - 50.0).abs() < 1e-3);
        assert!((b.width - 400.0).abs() < 1e-3);
        assert!((b.height - 200.0).abs() < 1e-3);
    }

    #[test]
    fn ssd_decode_respects_count_and_short_buffers() {
        let boxes = [0.0, 0.0, 1.0, 1.0];
        let out = decode_ssd(&boxes, &[1.0, 1.0], &[0.9, 0.9], 5, 0.5, 10.0, 10.0);
        assert_eq!(out.len(), 1);
        assert!(decode_ssd(&boxes, &[1.0], &[0.9], 0, 0.5, 10.0, 10.0).is_empty());
    }

    #[test]
    fn ssd_decode_drops_nan_scores() {
        let out = decode_ssd(&[0.0, 0.0, 1.0, 1.0], &[1.0], &[f32::NAN], 1, 0.5, 10.0, 10.0);
        assert!(out.is_empty());
    }

    #[test]
    fn hand_decode_scales_to_frame() {
        let raw: Vec<f32> = (0..63).map(|i| i as f32).collect();
        let hand = decode_hand(&raw, 0.9, 0.5, 2.0, 3.0).unwrap().unwrap();
        let p = hand.landmarks.get(1).unwrap();
        assert_eq!((p.x, p.y, p.z), (6.0, 12.0, 5.0));
        assert_eq!(hand.bounding_box.top_left(), (0.0, 3.0));
    }

    #[test]
    fn hand_decode_absent_or_short() {
        assert!(decode_hand(&[0.0; 63], 0.1, 0.5, 1.0, 1.0).unwrap().is_none());
        assert!(decode_hand(&[0.0; 10], 0.9, 0.5, 1.0, 1.0).is_err());
    }
}
