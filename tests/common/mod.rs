//! Scriptable stand-ins for the camera and the detectors.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use handcart::camera::{Frame, FrameSource};
use handcart::detector::{GestureClassifier, HandDetector, ObjectDetector};
use handcart::perception::PerceptionAdapter;
use handcart::types::{BoundingBox, GestureResult, HandDetection, LandmarkSet, ObjectDetection, Point3D};

#[derive(Default)]
pub struct FakeCamera {
    held: bool,
    pub fail_acquire: Rc<Cell<bool>>,
    pub acquires: Rc<Cell<u32>>,
    pub releases: Rc<Cell<u32>>,
    pub captures: Rc<Cell<u32>>,
}

impl FrameSource for FakeCamera {
    fn acquire(&mut self) -> Result<()> {
        if self.fail_acquire.get() {
            anyhow::bail!("camera busy");
        }
        if !self.held {
            self.held = true;
            self.acquires.set(self.acquires.get() + 1);
        }
        Ok(())
    }

    fn release(&mut self) {
        if self.held {
            self.held = false;
            self.releases.set(self.releases.get() + 1);
        }
    }

    fn is_ready(&self) -> bool {
        self.held
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.held.then_some((64, 48))
    }

    fn capture(&mut self) -> Result<Frame> {
        self.captures.set(self.captures.get() + 1);
        Ok(Frame::new(64, 48))
    }
}

/// What the fake detectors report on the next frame. Tests mutate it between ticks.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub pointer: Option<(f32, f32)>,
    pub objects: Vec<ObjectDetection>,
    pub gesture: Option<GestureResult>,
}

pub type SharedScene = Rc<RefCell<Scene>>;

pub fn object(class: &str, x: f32, y: f32, w: f32, h: f32) -> ObjectDetection {
    ObjectDetection {
        class: class.to_string(),
        score: 0.9,
        bbox: BoundingBox::new(x, y, w, h),
    }
}

pub fn gesture(name: &str, score: f32) -> GestureResult {
    GestureResult {
        name: name.to_string(),
        score,
    }
}

struct SceneHands(SharedScene);

#[async_trait(?Send)]
impl HandDetector for SceneHands {
    async fn estimate(&self, _frame: &Frame) -> Result<Vec<HandDetection>> {
        let Some((x, y)) = self.0.borrow().pointer else {
            return Ok(Vec::new());
        };
        let mut points = vec![Point3D::new(x - 40.0, y + 80.0, 0.0); 21];
        points[4] = Point3D::new(x, y, 0.0);
        let landmarks = LandmarkSet::from_points(points)?;
        Ok(vec![HandDetection {
            bounding_box: landmarks.extent(),
            landmarks,
        }])
    }
}

struct SceneObjects {
    scene: SharedScene,
    latency: Duration,
    calls: Rc<Cell<u32>>,
}

#[async_trait(?Send)]
impl ObjectDetector for SceneObjects {
    async fn detect(&self, _frame: &Frame) -> Result<Vec<ObjectDetection>> {
        self.calls.set(self.calls.get() + 1);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self.scene.borrow().objects.clone())
    }
}

struct SceneGestures(SharedScene);

#[async_trait(?Send)]
impl GestureClassifier for SceneGestures {
    async fn estimate(&self, _landmarks: &LandmarkSet, min_confidence: f32) -> Result<Vec<GestureResult>> {
        Ok(self
            .0
            .borrow()
            .gesture
            .iter()
            .filter(|g| g.score >= min_confidence)
            .cloned()
            .collect())
    }
}

/// Adapter backed by `scene`, plus a counter of object detector invocations.
pub fn scene_adapter(scene: &SharedScene, latency: Duration) -> (PerceptionAdapter, Rc<Cell<u32>>) {
    let calls = Rc::new(Cell::new(0));
    let adapter = PerceptionAdapter::new(
        Box::new(SceneHands(scene.clone())),
        Box::new(SceneObjects {
            scene: scene.clone(),
            latency,
            calls: calls.clone(),
        }),
        Box::new(SceneGestures(scene.clone())),
        8.0,
    );
    (adapter, calls)
}
