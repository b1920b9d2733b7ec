use serde::{Deserialize, Serialize};

use crate::error::VisionError;

/// Number of landmarks reported per hand.
pub const HAND_LANDMARK_COUNT: usize = 21;

/// Wrist landmark; every finger chain starts here.
pub const WRIST: usize = 0;

/// Thumb tip. Used as the selection reference point.
pub const POINTER_LANDMARK: usize = 4;

/// Represents a single 3D point
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3D {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    /// Landmark indices from the wrist to the fingertip.
    pub fn chain(self) -> [usize; 5] {
        match self {
            Finger::Thumb => [WRIST, 1, 2, 3, 4],
            Finger::Index => [WRIST, 5, 6, 7, 8],
            Finger::Middle => [WRIST, 9, 10, 11, 12],
            Finger::Ring => [WRIST, 13, 14, 15, 16],
            Finger::Pinky => [WRIST, 17, 18, 19, 20],
        }
    }
}

/// The 21 landmarks of one tracked hand, in frame-pixel space.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: [Point3D; HAND_LANDMARK_COUNT],
}

impl LandmarkSet {
    pub fn from_points(points: Vec<Point3D>) -> Result<Self, VisionError> {
        if points.len() != HAND_LANDMARK_COUNT {
            return Err(VisionError::LandmarkCount(points.len()));
        }
        if points.iter().any(|p| !p.is_finite()) {
            return Err(VisionError::MalformedOutput {
                detector: "hand",
                detail: "non-finite landmark coordinate".to_string(),
            });
        }
        let mut fixed = [Point3D::default(); HAND_LANDMARK_COUNT];
        fixed.copy_from_slice(&points);
        Ok(Self { points: fixed })
    }

    pub fn points(&self) -> &[Point3D] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<Point3D> {
        self.points.get(index).copied()
    }

    pub fn pointer(&self) -> Point3D {
        self.points[POINTER_LANDMARK]
    }

    pub fn finger(&self, finger: Finger) -> [Point3D; 5] {
        finger.chain().map(|i| self.points[i])
    }

    /// Smallest box enclosing every landmark.
    pub fn extent(&self) -> BoundingBox {
        let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
        let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for p in &self.points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        BoundingBox::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }
}

/// Axis-aligned box in frame pixels, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn top_left(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    pub fn top_right(&self) -> (f32, f32) {
        (self.x + self.width, self.y)
    }

    pub fn bottom_left(&self) -> (f32, f32) {
        (self.x, self.y + self.height)
    }

    pub fn bottom_right(&self) -> (f32, f32) {
        (self.x + self.width, self.y + self.height)
    }

    /// Inclusive on every edge.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        let (left, top) = self.top_left();
        let (right, _) = self.top_right();
        let (_, bottom) = self.bottom_left();
        x >= left && x <= right && y >= top && y <= bottom
    }

    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width >= 0.0
            && self.height >= 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandDetection {
    pub landmarks: LandmarkSet,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDetection {
    pub class: String,
    pub score: f32,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureResult {
    pub name: String,
    pub score: f32,
}

/// Catalog entry. Prices are in the catalog's currency units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: u32,
    pub name: String,
    pub price: f64,
}

/// Everything perceived during one tick. Dropped once the tick is folded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionFrame {
    pub hand: Option<HandDetection>,
    pub objects: Vec<ObjectDetection>,
    pub gesture: Option<GestureResult>,
}
