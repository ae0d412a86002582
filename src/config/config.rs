use std::fs;
use std::path::Path;
use anyhow::{Context, Error};
use log::info;
use serde::{Deserialize, Serialize};
use crate::utils::overlay::{MarkerPreset, MarkerStyle};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FaceMeshConfig {
    pub model_name: String,
    pub timeout: u64,
    pub max_num_faces: usize,
    pub refine_landmarks: bool,
    pub min_detection_confidence: f32,
    pub landmarks_output: String,
    pub score_output: String,
}

impl FaceMeshConfig {
    pub fn new() -> Self {
        FaceMeshConfig {
            model_name: "face_mesh".to_string(),
            timeout: 20,
            max_num_faces: 1,
            refine_landmarks: true,
            min_detection_confidence: 0.5,
            landmarks_output: "landmarks".to_string(),
            score_output: "face_flag".to_string(),
        }
    }
}

impl Default for FaceMeshConfig {
    fn default() -> Self {
        FaceMeshConfig::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmotionConfig {
    pub enabled: bool,
    pub model_name: String,
    pub timeout: u64,
    pub imsize: (i32, i32),
    pub face_offset: i32,
    pub contrast: f64,
    pub sharpness: f64,
}

impl EmotionConfig {
    pub fn new() -> Self {
        EmotionConfig {
            enabled: true,
            model_name: "emotion".to_string(),
            timeout: 20,
            imsize: (64, 64),
            face_offset: 10,
            contrast: 1.5,
            sharpness: 2.0,
        }
    }
}

impl Default for EmotionConfig {
    fn default() -> Self {
        EmotionConfig::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OverlayConfig {
    pub preset: MarkerPreset,
    /// Overrides the preset when set.
    pub style: Option<MarkerStyle>,
}

impl OverlayConfig {
    pub fn marker_style(&self) -> MarkerStyle {
        self.style.unwrap_or_else(|| self.preset.into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransformConfig {
    pub brightness_factor: f64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        TransformConfig {
            brightness_factor: 1.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DriveConfig {
    pub folder_id: String,
    pub scopes: Vec<String>,
    pub upload_url: String,
    pub timeout: u64,
}

impl DriveConfig {
    pub fn new(folder_id: String) -> Self {
        DriveConfig {
            folder_id,
            ..Default::default()
        }
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        DriveConfig {
            folder_id: "1v8Xss5sKEEgyPHfEBtXYBTHtUevdrhjd".to_string(),
            scopes: vec!["https://www.googleapis.com/auth/drive.file".to_string()],
            upload_url: "https://www.googleapis.com/upload/drive/v3/files?uploadType=multipart".to_string(),
            timeout: 30,
        }
    }
}

/// Settings of the annotation pipeline, loadable from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Images are resized to this (width, height) right after decoding, `None` keeps the upload size.
    pub working_size: Option<(i32, i32)>,
    pub session_capacity: usize,
    pub face_mesh: FaceMeshConfig,
    pub emotion: EmotionConfig,
    pub overlay: OverlayConfig,
    pub transform: TransformConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            working_size: Some((300, 300)),
            session_capacity: 64,
            face_mesh: FaceMeshConfig::new(),
            emotion: EmotionConfig::new(),
            overlay: OverlayConfig::default(),
            transform: TransformConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// load reads the config file at `path`, or returns the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let path = match path {
            None => return Ok(PipelineConfig::default()),
            Some(path) => path,
        };

        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read pipeline config {}", path.display()))?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse pipeline config {}", path.display()))?;
        info!("loaded pipeline configuration from {}", path.display());
        Ok(config)
    }
}
