use std::future::Future;
use anyhow::Error;
use opencv::core::{Mat, Rect};
use crate::modules::emotion_client::EmotionScores;
use crate::utils::coordinate::FaceLandmarks;

pub mod drive_client;
pub mod emotion_client;
pub mod face_mesh_client;

/// Finds facial landmarks in an RGB image.
pub trait LandmarkDetector: Send + Sync {
    /// Returns one entry per detected face; an empty list means no face was found.
    fn detect(&self, img: &Mat) -> impl Future<Output = Result<Vec<FaceLandmarks>, Error>> + Send;
}

/// Classifies the emotion shown by faces in an RGB image.
pub trait EmotionClassifier: Send + Sync {
    /// Returns scores for every region in `faces`, in the same order.
    fn classify(&self, img: &Mat, faces: &[Rect]) -> impl Future<Output = Result<Vec<EmotionScores>, Error>> + Send;
}

/// Persists encoded images and returns an opaque file id.
pub trait ImageStore: Send + Sync {
    fn upload_png(&self, name: &str, png: Vec<u8>) -> impl Future<Output = Result<String, Error>> + Send;
}

/// A missing classifier scores no faces.
impl<C: EmotionClassifier> EmotionClassifier for Option<C> {
    fn classify(&self, img: &Mat, faces: &[Rect]) -> impl Future<Output = Result<Vec<EmotionScores>, Error>> + Send {
        let scored = self.as_ref().map(|classifier| classifier.classify(img, faces));
        async move {
            match scored {
                Some(scored) => scored.await,
                None => Ok(vec![]),
            }
        }
    }
}
