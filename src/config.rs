use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use anyhow::{Context, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sampler: SamplerConfig,
    pub gesture: GestureConfig,
    pub camera: CameraConfig,
    pub models: ModelConfig,
    pub catalog_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub period_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Passed to the classifier; candidates scoring lower are not reported (0-10 scale).
    pub min_confidence: f32,
    /// A selected gesture at or above this score ends the session.
    pub checkout_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub mirror: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub hand_landmarks: String,
    pub object_detection: String,
    pub object_score_threshold: f32,
    pub hand_presence_threshold: f32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { period_ms: 100 }
    }
}

impl SamplerConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms.max(1))
    }
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            min_confidence: 8.0,
            checkout_threshold: 9.0,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: 1280,
            height: 720,
            mirror: false,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hand_landmarks: "models/hand_landmark.onnx".to_string(),
            object_detection: "models/ssd_mobilenet_coco.onnx".to_string(),
            object_score_threshold: 0.5,
            hand_presence_threshold: 0.5,
        }
    }
}

impl AppConfig {
    pub const DEFAULT_PATH: &'static str = "config.json";

    pub fn from_json(content: &str) -> Result<Self> {
        // Missing fields fall back to Default thanks to #[serde(default)]
        serde_json::from_str(content).context("Failed to parse configuration")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            match Self::from_json(&content) {
                Ok(c) => {
                    tracing::info!(path = %path.display(), "Loaded configuration");
                    c
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Error parsing config, loading defaults");
                    Self::default()
                }
            }
        } else {
            tracing::info!(path = %path.display(), "Configuration file not found, creating default");
            let config = Self::default();
            config.save(path)?;
            config
        };

        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write {}", path.as_ref().display()))?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            gesture: GestureConfig::default(),
            camera: CameraConfig::default(),
            models: ModelConfig::default(),
            catalog_path: "catalog.json".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_use_defaults() {
        let cfg = AppConfig::from_json(r#"{"gesture":{"checkout_threshold":10.0}}"#).unwrap();
        assert_eq!(cfg.gesture.checkout_threshold, 10.0);
        assert_eq!(cfg.gesture.min_confidence, 8.0);
        assert_eq!(cfg.sampler.period(), Duration::from_millis(100));
        assert_eq!(cfg.camera.width, 1280);
        assert_eq!(cfg.catalog_path, "catalog.json");
    }

    #[test]
    fn zero_period_is_clamped() {
        let cfg = AppConfig::from_json(r#"{"sampler":{"period_ms":0}}"#).unwrap();
        assert_eq!(cfg.sampler.period(), Duration::from_millis(1));
    }

    #[test]
    fn round_trips_through_file() {
        let dir = std::env::temp_dir().join(format!("handcart-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        let _ = fs::remove_file(&path);

        let created = AppConfig::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created.models.object_score_threshold, 0.5);

        let mut edited = created.clone();
        edited.camera.mirror = true;
        edited.save(&path).unwrap();
        assert!(AppConfig::load(&path).unwrap().camera.mirror);

        fs::remove_dir_all(&dir).unwrap();
    }
}
