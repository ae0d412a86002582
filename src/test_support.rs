//! In-process stand-ins for the inference server and Google Drive.

use std::future::Future;
use std::sync::Mutex;
use anyhow::Error;
use opencv::core::{Mat, MatTrait, MatTraitConst, Rect, Scalar, Vec3b, CV_8UC3};
use crate::helper::landmark_helper::REFINED_MESH_LANDMARKS;
use crate::modules::emotion_client::EmotionScores;
use crate::modules::{EmotionClassifier, ImageStore, LandmarkDetector};
use crate::utils::coordinate::{Coordinate2D, FaceLandmarks};
use crate::utils::image::encode_png;

/// "Detects" a face at the first pixel whose red channel exceeds 200, placing every
/// landmark at that pixel's centre. Images without such a pixel contain no face.
pub struct BrightSpotDetector;

impl BrightSpotDetector {
    pub fn find(img: &Mat) -> Result<Vec<FaceLandmarks>, Error> {
        let (width, height) = (img.cols(), img.rows());
        for y in 0..height {
            for x in 0..width {
                if img.at_2d::<Vec3b>(y, x)?[0] > 200 {
                    let point = Coordinate2D {
                        x: (x as f32 + 0.5) / width as f32,
                        y: (y as f32 + 0.5) / height as f32,
                    };
                    let face = FaceLandmarks::from_normalized(vec![point; REFINED_MESH_LANDMARKS], 0.99);
                    return Ok(vec![face])
                }
            }
        }
        Ok(vec![])
    }
}

impl LandmarkDetector for BrightSpotDetector {
    fn detect(&self, img: &Mat) -> impl Future<Output = Result<Vec<FaceLandmarks>, Error>> + Send {
        let found = BrightSpotDetector::find(img);
        async move { found }
    }
}

pub struct FailingDetector;

impl LandmarkDetector for FailingDetector {
    fn detect(&self, _img: &Mat) -> impl Future<Output = Result<Vec<FaceLandmarks>, Error>> + Send {
        async { Err(Error::msg("inference server unavailable")) }
    }
}

/// Scores every region with the same fixed values.
pub struct FixedClassifier(pub EmotionScores);

impl EmotionClassifier for FixedClassifier {
    fn classify(&self, _img: &Mat, faces: &[Rect]) -> impl Future<Output = Result<Vec<EmotionScores>, Error>> + Send {
        let results = vec![self.0; faces.len()];
        async move { Ok(results) }
    }
}

impl FixedClassifier {
    pub fn happy() -> Self {
        FixedClassifier(EmotionScores::new([0.0, 0.0, 0.1, 0.8, 0.0, 0.0, 0.1]))
    }
}

pub struct FailingClassifier;

impl EmotionClassifier for FailingClassifier {
    fn classify(&self, _img: &Mat, _faces: &[Rect]) -> impl Future<Output = Result<Vec<EmotionScores>, Error>> + Send {
        async { Err(Error::msg("emotion model unavailable")) }
    }
}

/// Records uploads in memory and hands out sequential ids.
#[derive(Default)]
pub struct MemoryStore {
    pub uploads: Mutex<Vec<(String, Vec<u8>)>>,
}

impl ImageStore for MemoryStore {
    fn upload_png(&self, name: &str, png: Vec<u8>) -> impl Future<Output = Result<String, Error>> + Send {
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push((name.to_string(), png));
        let id = format!("drive-file-{}", uploads.len());
        async move { Ok(id) }
    }
}

pub struct FailingStore;

impl ImageStore for FailingStore {
    fn upload_png(&self, _name: &str, _png: Vec<u8>) -> impl Future<Output = Result<String, Error>> + Send {
        async { Err(Error::msg("quota exceeded")) }
    }
}

/// A black RGB image with one bright red square whose top-left corner is at (x, y).
pub fn spot_image(width: i32, height: i32, spot: Option<(i32, i32)>) -> Mat {
    let mut img = Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(0.0)).unwrap();
    if let Some((x, y)) = spot {
        for dy in 0..2 {
            for dx in 0..2 {
                *img.at_2d_mut::<Vec3b>(y + dy, x + dx).unwrap() = Vec3b::from([255, 0, 0]);
            }
        }
    }
    img
}

pub fn spot_png(width: i32, height: i32, spot: Option<(i32, i32)>) -> Vec<u8> {
    encode_png(&spot_image(width, height, spot)).unwrap()
}
