use image::{ImageBuffer, Rgb};
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType, Resolution},
    Camera,
};
use anyhow::{Result, Context, anyhow};
use colored::*;

use crate::config::CameraConfig;
use crate::error::VisionError;

pub type Frame = ImageBuffer<Rgb<u8>, Vec<u8>>;

/// A live frame stream that is acquired per session and released when it ends.
///
/// `release` must be idempotent: releasing a source that is not held is a no-op.
pub trait FrameSource {
    fn acquire(&mut self) -> Result<()>;
    fn release(&mut self);
    /// Decoded dimensions are known and the stream is playing.
    fn is_ready(&self) -> bool;
    fn dimensions(&self) -> Option<(u32, u32)>;
    fn capture(&mut self) -> Result<Frame>;
}

pub struct CameraSource {
    index: u32,
    width: u32,
    height: u32,
    mirror: bool,
    camera: Option<Camera>,
}

impl CameraSource {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            index: config.index,
            width: config.width,
            height: config.height,
            mirror: config.mirror,
            camera: None,
        }
    }

    pub fn name(&self) -> Option<String> {
        self.camera.as_ref().map(|c| c.info().human_name())
    }
}

impl FrameSource for CameraSource {
    fn acquire(&mut self) -> Result<()> {
        if self.camera.is_some() {
            return Ok(());
        }
        let cam_index = CameraIndex::Index(self.index);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::HighestResolution(
            Resolution::new(self.width, self.height),
        ));
        let mut camera = Camera::new(cam_index, requested).context("Failed to create camera instance")?;

        camera.open_stream().map_err(|e| anyhow!(e)).context("Failed to open camera stream")?;

        tracing::info!(index = self.index, format = %camera.camera_format(), "Camera acquired");

        self.camera = Some(camera);
        Ok(())
    }

    fn release(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.stop_stream() {
                tracing::warn!(error = %e, "Camera stream did not stop cleanly");
            }
            tracing::info!(index = self.index, "Camera released");
        }
    }

    fn is_ready(&self) -> bool {
        match &self.camera {
            Some(camera) => camera.is_stream_open() && self.dimensions().is_some(),
            None => false,
        }
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        let camera = self.camera.as_ref()?;
        let resolution = camera.resolution();
        if resolution.width() == 0 || resolution.height() == 0 {
            None
        } else {
            Some((resolution.width(), resolution.height()))
        }
    }

    fn capture(&mut self) -> Result<Frame> {
        let camera = self.camera.as_mut().ok_or(VisionError::SourceNotAcquired)?;
        let frame = camera
            .frame()
            .map_err(|e| VisionError::Capture(e.to_string()))?;
        let mut decoded = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| VisionError::Capture(e.to_string()))?;
        if self.mirror {
            image::imageops::flip_horizontal_in_place(&mut decoded);
        }
        Ok(decoded)
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Prints the cameras the native backend can see.
pub fn print_cameras() -> Result<()> {
    let cameras = nokhwa::query(ApiBackend::Auto)?;
    println!("{}", "Available Cameras:".bold());
    println!("{:<5} | {:<30} | {:<10}", "Index", "Name", "Misc");
    println!("{}", "-".repeat(60));
    for cam in cameras {
        println!("{:<5} | {:<30} | {:?}", cam.index(), cam.human_name(), cam.misc());
    }
    Ok(())
}
