use crate::camera::Frame;
use crate::detector::{GestureClassifier, HandDetector, ObjectDetector};
use crate::types::{DetectionFrame, GestureResult, HandDetection, ObjectDetection};

/// Runs the three detectors for one frame and folds their outputs into a [`DetectionFrame`].
///
/// Detector failures never escape: a failing hand or object detector leaves its
/// field empty for this tick, a failing gesture classifier leaves `gesture` unset.
pub struct PerceptionAdapter {
    hands: Box<dyn HandDetector>,
    objects: Box<dyn ObjectDetector>,
    gestures: Box<dyn GestureClassifier>,
    gesture_min_confidence: f32,
}

impl PerceptionAdapter {
    pub fn new(
        hands: Box<dyn HandDetector>,
        objects: Box<dyn ObjectDetector>,
        gestures: Box<dyn GestureClassifier>,
        gesture_min_confidence: f32,
    ) -> Self {
        Self {
            hands,
            objects,
            gestures,
            gesture_min_confidence,
        }
    }

    pub async fn perceive(&self, frame: &Frame) -> DetectionFrame {
        let hand = match self.hands.estimate(frame).await {
            Ok(hands) => first_valid_hand(hands),
            Err(e) => {
                tracing::warn!(error = %e, "Hand detector failed, treating as no hand");
                None
            }
        };

        let objects = match self.objects.detect(frame).await {
            Ok(objects) => sanitize_objects(objects),
            Err(e) => {
                tracing::warn!(error = %e, "Object detector failed, treating as no objects");
                Vec::new()
            }
        };

        let gesture = match &hand {
            Some(hand) => match self
                .gestures
                .estimate(&hand.landmarks, self.gesture_min_confidence)
                .await
            {
                Ok(candidates) => select_gesture(candidates),
                Err(e) => {
                    tracing::warn!(error = %e, "Gesture classifier failed");
                    None
                }
            },
            None => None,
        };

        DetectionFrame {
            hand,
            objects,
            gesture,
        }
    }
}

/// Only one hand is tracked: the first reported.
fn first_valid_hand(hands: Vec<HandDetection>) -> Option<HandDetection> {
    let hand = hands.into_iter().next()?;
    if hand.bounding_box.is_valid() {
        Some(hand)
    } else {
        // Landmarks were already validated; rebuild the box from them.
        let bounding_box = hand.landmarks.extent();
        Some(HandDetection {
            landmarks: hand.landmarks,
            bounding_box,
        })
    }
}

fn sanitize_objects(objects: Vec<ObjectDetection>) -> Vec<ObjectDetection> {
    objects
        .into_iter()
        .filter(|o| {
            let ok = !o.class.is_empty() && o.score.is_finite() && o.bbox.is_valid();
            if !ok {
                tracing::debug!(class = %o.class, "Dropping malformed object detection");
            }
            ok
        })
        .collect()
}

/// Highest score wins; on ties the earlier candidate is kept. Non-finite scores are ignored.
pub fn select_gesture(candidates: Vec<GestureResult>) -> Option<GestureResult> {
    let mut best: Option<GestureResult> = None;
    for candidate in candidates {
        if !candidate.score.is_finite() {
            continue;
        }
        match &best {
            Some(current) if current.score >= candidate.score => {}
            _ => best = Some(candidate),
        }
    }
    best
}
