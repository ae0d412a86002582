use std::convert::Infallible;
use std::str::FromStr;
use std::time::Instant;
use log::{debug, info};
use opencv::core::{Mat, MatTraitConst};
use uuid::Uuid;
use crate::config::config::{PipelineConfig, TransformConfig};
use crate::error::{ErrorKind, PipelineError};
use crate::helper::landmark_helper::{face_region, selected_pixel_coordinates};
use crate::modules::emotion_client::dominant_emotion;
use crate::modules::{EmotionClassifier, ImageStore, LandmarkDetector};
use crate::pipeline::session::SessionStore;
use crate::utils::coordinate::{FaceLandmarks, PixelCoordinate};
use crate::utils::image::{
    adjust_brightness, convert_image_to_mat, encode_base64_png, encode_png, enhance_contrast, enhance_sharpness,
    flip_horizontal, flip_vertical, resize_image,
};
use crate::utils::overlay::{draw_markers, MarkerStyle};

/// Transforms the transform endpoint can replay on a cached image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageOperation {
    #[default]
    Identity,
    Brightness,
    HorizontalFlip,
    VerticalFlip,
}

impl FromStr for ImageOperation {
    type Err = Infallible;

    /// Unknown names parse as [`ImageOperation::Identity`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let operation = match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "brightness" | "brightness_boost" => ImageOperation::Brightness,
            "horizontal_flip" => ImageOperation::HorizontalFlip,
            "vertical_flip" => ImageOperation::VerticalFlip,
            _ => ImageOperation::Identity,
        };
        Ok(operation)
    }
}

impl ImageOperation {
    pub fn parse(s: &str) -> Self {
        match s.parse() {
            Ok(operation) => operation,
            Err(never) => match never {},
        }
    }

    /// apply returns the transformed copy of `img`.
    pub fn apply(&self, img: &Mat, config: &TransformConfig) -> Result<Mat, anyhow::Error> {
        match self {
            ImageOperation::Identity => Ok(img.try_clone()?),
            ImageOperation::Brightness => adjust_brightness(img, config.brightness_factor),
            ImageOperation::HorizontalFlip => flip_horizontal(img),
            ImageOperation::VerticalFlip => flip_vertical(img),
        }
    }
}

/// An image with the selected landmarks drawn on it.
pub struct Annotation {
    pub image: Mat,
    pub faces: Vec<FaceLandmarks>,
    pub points: Vec<PixelCoordinate>,
}

#[derive(Debug, Clone)]
pub struct UploadOutput {
    pub image_with_points_base64: String,
    pub dominant_emotion: Option<String>,
    pub drive_id: String,
    pub session_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub image_with_points_base64: String,
}

pub struct FaceOverlayPipeline<D, E, S> {
    face_mesh: D,
    emotion: E,
    store: S,
    sessions: SessionStore,
    marker_style: MarkerStyle,
    config: PipelineConfig,
}

impl<D, E, S> FaceOverlayPipeline<D, E, S>
where
    D: LandmarkDetector,
    E: EmotionClassifier,
    S: ImageStore,
{
    /// new initializes new instance of the pipeline
    pub fn new(face_mesh: D, emotion: E, store: S, config: PipelineConfig) -> Self {
        FaceOverlayPipeline {
            face_mesh,
            emotion,
            store,
            sessions: SessionStore::new(config.session_capacity),
            marker_style: config.overlay.marker_style(),
            config,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// decode turns the uploaded bytes into the RGB working image.
    ///
    /// # Arguments
    /// * `im_bytes` - encoded image
    ///
    /// # Returns
    /// * `Result<Mat, PipelineError>`
    pub fn decode(&self, im_bytes: &[u8]) -> Result<Mat, PipelineError> {
        let img = convert_image_to_mat(im_bytes)
            .map_err(|e| PipelineError::with_source(ErrorKind::DecodeError, "the image could not be read", e))?;

        match self.config.working_size {
            None => Ok(img),
            Some(size) => resize_image(&img, size)
                .map_err(|e| PipelineError::with_source(ErrorKind::DecodeError, "the image could not be resized", e)),
        }
    }

    /// annotate detects the face landmarks of `img` and draws the selected ones onto a copy.
    ///
    /// Finding no face is not an error, the copy is then returned without markers.
    pub async fn annotate(&self, img: Mat) -> Result<Annotation, PipelineError> {
        let started = Instant::now();
        let faces = self
            .face_mesh
            .detect(&img)
            .await
            .map_err(|e| PipelineError::with_source(ErrorKind::InferenceError, "landmark detection failed", e))?;

        let points = selected_pixel_coordinates(&faces, img.cols(), img.rows());
        let image = draw_markers(&img, &points, &self.marker_style)
            .map_err(|e| PipelineError::with_source(ErrorKind::InternalError, "drawing the landmarks failed", e))?;

        debug!("found {} faces, drew {} markers in {:?}", faces.len(), points.len(), started.elapsed());
        Ok(Annotation { image, faces, points })
    }

    /// require_face fails with [`ErrorKind::NoFace`] when the annotation found no face.
    pub fn require_face(annotation: &Annotation) -> Result<(), PipelineError> {
        if annotation.faces.is_empty() {
            return Err(PipelineError::new(ErrorKind::NoFace, "no face was found in the image"))
        }
        Ok(())
    }

    /// emotion_inputs enhances `img` for the classifier and locates the face regions to classify.
    fn emotion_inputs(&self, img: &Mat, faces: &[FaceLandmarks]) -> Result<(Mat, Vec<opencv::core::Rect>), PipelineError> {
        let emotion = &self.config.emotion;
        let enhanced = enhance_contrast(img, emotion.contrast)
            .and_then(|contrasted| enhance_sharpness(&contrasted, emotion.sharpness))
            .map_err(|e| PipelineError::with_source(ErrorKind::InternalError, "image enhancement failed", e))?;

        let regions = faces
            .iter()
            .filter_map(|face| face_region(face, img.cols(), img.rows(), emotion.face_offset))
            .collect();
        Ok((enhanced, regions))
    }

    /// process_upload runs the upload flow: annotate the image, classify the emotion, store the
    /// original and cache it for later transforms.
    ///
    /// The original is only stored once classification succeeded.
    ///
    /// # Arguments
    /// * `filename` - client side file name, used as the stored file's name
    /// * `im_bytes` - encoded image
    ///
    /// # Returns
    /// * `Result<UploadOutput, PipelineError>`
    pub async fn process_upload(&self, filename: &str, im_bytes: &[u8]) -> Result<UploadOutput, PipelineError> {
        let img = self.decode(im_bytes)?;
        let annotation = self.annotate(img.try_clone().map_err(internal)?).await?;

        let png = encode_png(&img)
            .map_err(|e| PipelineError::with_source(ErrorKind::InternalError, "encoding the original failed", e))?;

        let dominant_emotion = if self.config.emotion.enabled {
            let (enhanced, regions) = self.emotion_inputs(&img, &annotation.faces)?;
            let scores = self
                .emotion
                .classify(&enhanced, &regions)
                .await
                .map_err(|e| PipelineError::with_source(ErrorKind::InferenceError, "emotion detection failed", e))?;
            Some(dominant_emotion(&scores))
        } else {
            None
        };

        let drive_id = self
            .store
            .upload_png(filename, png)
            .await
            .map_err(|e| PipelineError::with_source(ErrorKind::UploadError, "uploading the image failed", e))?;

        let image_with_points_base64 = encode_base64_png(&annotation.image)
            .map_err(|e| PipelineError::with_source(ErrorKind::InternalError, "encoding the result failed", e))?;
        let session_id = self.sessions.insert(img);

        info!(
            "processed upload {filename}: {} markers, emotion {:?}, drive id {drive_id}, session {session_id}",
            annotation.points.len(),
            dominant_emotion,
        );
        Ok(UploadOutput {
            image_with_points_base64,
            dominant_emotion,
            drive_id,
            session_id,
        })
    }

    /// process_transform replays `operation` on the image cached for `session_id` and
    /// annotates the result again.
    pub async fn process_transform(&self, session_id: Option<&str>, operation: ImageOperation) -> Result<ProcessOutput, PipelineError> {
        let session_id = match session_id.map(Uuid::parse_str) {
            Some(Ok(session_id)) => session_id,
            _ => return Err(PipelineError::no_cached_image()),
        };
        let img = match self.sessions.get(&session_id).map_err(internal)? {
            Some(img) => img,
            None => return Err(PipelineError::no_cached_image()),
        };

        let transformed = operation
            .apply(&img, &self.config.transform)
            .map_err(|e| PipelineError::with_source(ErrorKind::InternalError, "the transform failed", e))?;
        let annotation = self.annotate(transformed).await?;
        let image_with_points_base64 = encode_base64_png(&annotation.image)
            .map_err(|e| PipelineError::with_source(ErrorKind::InternalError, "encoding the result failed", e))?;

        info!("replayed {operation:?} for session {session_id}: {} markers", annotation.points.len());
        Ok(ProcessOutput { image_with_points_base64 })
    }
}

fn internal(e: impl Into<anyhow::Error>) -> PipelineError {
    PipelineError::with_source(ErrorKind::InternalError, "internal error", e.into())
}
