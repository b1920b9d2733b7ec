//! Template gesture classifier over a 21-point hand.
//!
//! Each finger is reduced to a curl class and a pointing direction. A template
//! lists, per finger, which curls and directions it accepts and with what
//! confidence; the gesture score is the fraction of satisfied constraints on a
//! 0-10 scale.

use anyhow::Result;
use async_trait::async_trait;

use crate::detector::GestureClassifier;
use crate::types::{Finger, GestureResult, LandmarkSet, Point3D};

pub const MAX_SCORE: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerCurl {
    NoCurl,
    HalfCurl,
    FullCurl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerDirection {
    VerticalUp,
    VerticalDown,
    HorizontalLeft,
    HorizontalRight,
    DiagonalUpLeft,
    DiagonalUpRight,
    DiagonalDownLeft,
    DiagonalDownRight,
}

const NO_CURL_RATIO: f32 = 0.85;
const HALF_CURL_RATIO: f32 = 0.55;

/// Straightness of the finger: distance from base joint to tip over the summed segment lengths.
pub fn finger_curl(chain: &[Point3D; 5]) -> FingerCurl {
    let joints = &chain[1..];
    let path: f32 = joints.windows(2).map(|w| distance(w[0], w[1])).sum();
    if path <= f32::EPSILON {
        return FingerCurl::FullCurl;
    }
    let ratio = distance(joints[0], joints[3]) / path;
    if ratio >= NO_CURL_RATIO {
        FingerCurl::NoCurl
    } else if ratio >= HALF_CURL_RATIO {
        FingerCurl::HalfCurl
    } else {
        FingerCurl::FullCurl
    }
}

/// Direction from the finger's base joint to its tip, in image space (y grows downward).
pub fn finger_direction(chain: &[Point3D; 5]) -> Option<FingerDirection> {
    let dx = chain[4].x - chain[1].x;
    let dy = chain[1].y - chain[4].y;
    if dx.abs() <= f32::EPSILON && dy.abs() <= f32::EPSILON {
        return None;
    }
    let angle = dy.atan2(dx).to_degrees();
    let direction = match angle {
        a if (-22.5..22.5).contains(&a) => FingerDirection::HorizontalRight,
        a if (22.5..67.5).contains(&a) => FingerDirection::DiagonalUpRight,
        a if (67.5..112.5).contains(&a) => FingerDirection::VerticalUp,
        a if (112.5..157.5).contains(&a) => FingerDirection::DiagonalUpLeft,
        a if (-67.5..-22.5).contains(&a) => FingerDirection::DiagonalDownRight,
        a if (-112.5..-67.5).contains(&a) => FingerDirection::VerticalDown,
        a if (-157.5..-112.5).contains(&a) => FingerDirection::DiagonalDownLeft,
        _ => FingerDirection::HorizontalLeft,
    };
    Some(direction)
}

fn distance(a: Point3D, b: Point3D) -> f32 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

#[derive(Debug, Clone)]
pub struct GestureTemplate {
    pub name: &'static str,
    curls: Vec<(Finger, FingerCurl, f32)>,
    directions: Vec<(Finger, FingerDirection, f32)>,
}

impl GestureTemplate {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            curls: Vec::new(),
            directions: Vec::new(),
        }
    }

    pub fn curl(mut self, finger: Finger, curl: FingerCurl, confidence: f32) -> Self {
        self.curls.push((finger, curl, confidence));
        self
    }

    pub fn direction(mut self, finger: Finger, direction: FingerDirection, confidence: f32) -> Self {
        self.directions.push((finger, direction, confidence));
        self
    }

    /// Index and middle extended upward, ring and pinky folded.
    pub fn victory() -> Self {
        let mut t = Self::new("victory");
        for finger in [Finger::Index, Finger::Middle] {
            t = t
                .curl(finger, FingerCurl::NoCurl, 1.0)
                .direction(finger, FingerDirection::VerticalUp, 1.0)
                .direction(finger, FingerDirection::DiagonalUpLeft, 0.9)
                .direction(finger, FingerDirection::DiagonalUpRight, 0.9);
        }
        for finger in [Finger::Ring, Finger::Pinky] {
            t = t
                .curl(finger, FingerCurl::FullCurl, 1.0)
                .curl(finger, FingerCurl::HalfCurl, 0.6);
        }
        t
    }

    /// Thumb extended upward, every other finger folded.
    pub fn thumbs_up() -> Self {
        let mut t = Self::new("thumbs_up")
            .curl(Finger::Thumb, FingerCurl::NoCurl, 1.0)
            .direction(Finger::Thumb, FingerDirection::VerticalUp, 1.0)
            .direction(Finger::Thumb, FingerDirection::DiagonalUpLeft, 0.9)
            .direction(Finger::Thumb, FingerDirection::DiagonalUpRight, 0.9);
        for finger in [Finger::Index, Finger::Middle, Finger::Ring, Finger::Pinky] {
            t = t.curl(finger, FingerCurl::FullCurl, 1.0);
        }
        t
    }

    pub fn score(&self, landmarks: &LandmarkSet) -> f32 {
        let mut achieved = 0.0;
        let mut possible = 0.0;
        for finger in Finger::ALL {
            let chain = landmarks.finger(finger);
            let curl = finger_curl(&chain);
            if let Some(s) = group_score(&self.curls, finger, |c| *c == curl) {
                achieved += s;
                possible += 1.0;
            }
            let direction = finger_direction(&chain);
            if let Some(s) = group_score(&self.directions, finger, |d| Some(*d) == direction) {
                achieved += s;
                possible += 1.0;
            }
        }
        if possible == 0.0 {
            return 0.0;
        }
        MAX_SCORE * achieved / possible
    }
}

/// Best matching confidence for one finger's constraints, normalised by the best possible.
/// `None` when the template says nothing about the finger.
fn group_score<T>(
    entries: &[(Finger, T, f32)],
    finger: Finger,
    matches: impl Fn(&T) -> bool,
) -> Option<f32> {
    let mut best_possible: f32 = 0.0;
    let mut best_matched: f32 = 0.0;
    let mut any = false;
    for (f, value, confidence) in entries {
        if *f != finger {
            continue;
        }
        any = true;
        best_possible = best_possible.max(*confidence);
        if matches(value) {
            best_matched = best_matched.max(*confidence);
        }
    }
    if !any || best_possible <= 0.0 {
        return None;
    }
    Some(best_matched / best_possible)
}

/// Scores a fixed set of templates registered at construction.
pub struct GestureEstimator {
    templates: Vec<GestureTemplate>,
}

impl GestureEstimator {
    pub fn new(templates: Vec<GestureTemplate>) -> Self {
        Self { templates }
    }

    pub fn template_names(&self) -> Vec<&'static str> {
        self.templates.iter().map(|t| t.name).collect()
    }

    /// Candidates scoring at least `min_confidence`, best first.
    pub fn estimate_sync(&self, landmarks: &LandmarkSet, min_confidence: f32) -> Vec<GestureResult> {
        let mut results: Vec<GestureResult> = self
            .templates
            .iter()
            .map(|t| GestureResult {
                name: t.name.to_string(),
                score: t.score(landmarks),
            })
            .filter(|g| g.score >= min_confidence)
            .collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results
    }
}

impl Default for GestureEstimator {
    fn default() -> Self {
        Self::new(vec![GestureTemplate::victory(), GestureTemplate::thumbs_up()])
    }
}

#[async_trait(?Send)]
impl GestureClassifier for GestureEstimator {
    async fn estimate(&self, landmarks: &LandmarkSet, min_confidence: f32) -> Result<Vec<GestureResult>> {
        Ok(self.estimate_sync(landmarks, min_confidence))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn straight_up(x: f32) -> [Point3D; 4] {
        [
            Point3D::new(x, 200.0, 0.0),
            Point3D::new(x, 170.0, 0.0),
            Point3D::new(x, 150.0, 0.0),
            Point3D::new(x, 130.0, 0.0),
        ]
    }

    fn folded(x: f32) -> [Point3D; 4] {
        [
            Point3D::new(x, 200.0, 0.0),
            Point3D::new(x, 175.0, 0.0),
            Point3D::new(x + 10.0, 185.0, 0.0),
            Point3D::new(x + 5.0, 200.0, 0.0),
        ]
    }

    fn thumb_up() -> [Point3D; 4] {
        straight_up(70.0).map(|p| Point3D::new(p.x, p.y + 60.0, 0.0))
    }

    fn thumb_folded() -> [Point3D; 4] {
        [
            Point3D::new(70.0, 260.0, 0.0),
            Point3D::new(80.0, 240.0, 0.0),
            Point3D::new(95.0, 235.0, 0.0),
            Point3D::new(90.0, 250.0, 0.0),
        ]
    }

    /// Builds a hand with the wrist at (100, 300). `extended` covers index..pinky.
    pub(crate) fn synth_hand(thumb_extended: bool, extended: [bool; 4]) -> LandmarkSet {
        let mut points = vec![Point3D::new(100.0, 300.0, 0.0)];
        points.extend(if thumb_extended { thumb_up() } else { thumb_folded() });
        for (i, up) in extended.iter().enumerate() {
            let x = 80.0 + 20.0 * i as f32;
            points.extend(if *up { straight_up(x) } else { folded(x) });
        }
        LandmarkSet::from_points(points).unwrap()
    }

    #[test]
    fn curl_classes() {
        let hand = synth_hand(true, [true, false, false, false]);
        assert_eq!(finger_curl(&hand.finger(Finger::Index)), FingerCurl::NoCurl);
        assert_eq!(finger_curl(&hand.finger(Finger::Middle)), FingerCurl::FullCurl);
        assert_eq!(finger_curl(&hand.finger(Finger::Thumb)), FingerCurl::NoCurl);
    }

    #[test]
    fn half_curl_between_thresholds() {
        let chain = [
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(0.0, -10.0, 0.0),
            Point3D::new(0.0, -20.0, 0.0),
            Point3D::new(10.0, -20.0, 0.0),
        ];
        // 22.4 / 30
        assert_eq!(finger_curl(&chain), FingerCurl::HalfCurl);
    }

    #[test]
    fn degenerate_finger_counts_as_folded() {
        let chain = [Point3D::default(); 5];
        assert_eq!(finger_curl(&chain), FingerCurl::FullCurl);
        assert_eq!(finger_direction(&chain), None);
    }

    #[test]
    fn directions_follow_image_axes() {
        let mut chain = [Point3D::default(); 5];
        chain[4] = Point3D::new(0.0, -10.0, 0.0);
        assert_eq!(finger_direction(&chain), Some(FingerDirection::VerticalUp));
        chain[4] = Point3D::new(10.0, 0.0, 0.0);
        assert_eq!(finger_direction(&chain), Some(FingerDirection::HorizontalRight));
        chain[4] = Point3D::new(-10.0, 0.0, 0.0);
        assert_eq!(finger_direction(&chain), Some(FingerDirection::HorizontalLeft));
        chain[4] = Point3D::new(-10.0, -10.0, 0.0);
        assert_eq!(finger_direction(&chain), Some(FingerDirection::DiagonalUpLeft));
        chain[4] = Point3D::new(10.0, 10.0, 0.0);
        assert_eq!(finger_direction(&chain), Some(FingerDirection::DiagonalDownRight));
    }

    #[test]
    fn victory_hand_scores_full_marks() {
        let hand = synth_hand(false, [true, true, false, false]);
        let estimator = GestureEstimator::default();
        let results = estimator.estimate_sync(&hand, 8.0);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "victory");
        assert!((results[0].score - MAX_SCORE).abs() < 1e-4);
    }

    #[test]
    fn thumbs_up_hand_scores_full_marks() {
        let hand = synth_hand(true, [false, false, false, false]);
        let results = GestureEstimator::default().estimate_sync(&hand, 8.0);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "thumbs_up");
        assert!((results[0].score - MAX_SCORE).abs() < 1e-4);
    }

    #[test]
    fn open_hand_matches_nothing_at_default_confidence() {
        let hand = synth_hand(true, [true, true, true, true]);
        let estimator = GestureEstimator::default();
        assert!(estimator.estimate_sync(&hand, 8.0).is_empty());

        let all = estimator.estimate_sync(&hand, 0.0);
        assert_eq!(all.len(), 2);
        assert!(all[0].score >= all[1].score);
    }

    #[test]
    fn registered_templates() {
        assert_eq!(GestureEstimator::default().template_names(), vec!["victory", "thumbs_up"]);
    }
}
