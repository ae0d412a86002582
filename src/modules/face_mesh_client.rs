use std::future::Future;
use std::time::Duration;
use anyhow::Error;
use log::debug;
use ndarray::{Array3, ArrayD, Axis};
use opencv::core::{Mat, MatTraitConst, MatTraitConstManual, Rect, Scalar, CV_8UC3};
use crate::config::config::FaceMeshConfig;
use crate::helper::landmark_helper::REFINED_MESH_LANDMARKS;
use crate::modules::LandmarkDetector;
use crate::triton_client::client::triton::ModelMetadataResponse;
use crate::triton_client::client::{fp32_infer_request, TritonInferenceClient};
use crate::utils::coordinate::{Coordinate2D, FaceLandmarks};
use crate::utils::image::resize_image;
use crate::utils::utils::{output_to_array, sigmoid};

/// Number of landmarks in the face mesh without the refined iris points.
const BASE_MESH_LANDMARKS: usize = 468;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InputLayout {
    Nhwc,
    Nchw,
}

/// Shape of the model input, read from the model metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InputShape {
    pub width: i32,
    pub height: i32,
    pub layout: InputLayout,
}

impl InputShape {
    /// from_dims accepts `[batch?, H, W, 3]` or `[batch?, 3, H, W]`.
    pub fn from_dims(dims: &[i64]) -> Result<Self, Error> {
        if dims.len() < 3 {
            return Err(Error::msg(format!("face_mesh_client - unexpected input shape {dims:?}")))
        }
        let last = &dims[dims.len() - 3..];
        let shape = match last {
            [h, w, 3] if *h > 0 && *w > 0 => InputShape { width: *w as i32, height: *h as i32, layout: InputLayout::Nhwc },
            [3, h, w] if *h > 0 && *w > 0 => InputShape { width: *w as i32, height: *h as i32, layout: InputLayout::Nchw },
            _ => return Err(Error::msg(format!("face_mesh_client - unexpected input shape {dims:?}"))),
        };
        Ok(shape)
    }
}

/// Where the image ended up inside the letterboxed model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Letterbox {
    pub content_width: i32,
    pub content_height: i32,
}

/// letterbox resizes `img` to fit the model input while keeping its aspect ratio,
/// pads the bottom and right with black and scales the pixels to `[0, 1]`.
///
/// # Returns
/// * `(ArrayD<f32>, Letterbox)` - the batched input tensor and the resized content size
pub(crate) fn letterbox(img: &Mat, shape: &InputShape) -> Result<(ArrayD<f32>, Letterbox), Error> {
    let img_w = img.cols();
    let img_h = img.rows();
    if img_w == 0 || img_h == 0 {
        return Err(Error::msg("face_mesh_client - input image is empty"))
    }

    let im_ratio = img_w as f32 / img_h as f32;
    let model_ratio = shape.width as f32 / shape.height as f32;
    let (new_width, new_height) = if im_ratio > model_ratio {
        let new_width = shape.width;
        let new_height = ((new_width as f32 / im_ratio) as i32).max(1);
        (new_width, new_height)
    } else {
        let new_height = shape.height;
        let new_width = ((new_height as f32 * im_ratio) as i32).max(1);
        (new_width, new_height)
    };

    let img_resized = resize_image(img, (new_width, new_height))?;
    let mut img_scaled = Mat::new_rows_cols_with_default(shape.height, shape.width, CV_8UC3, Scalar::all(0.0))?;
    {
        let mut roi = Mat::roi_mut(&mut img_scaled, Rect::new(0, 0, new_width, new_height))?;
        img_resized.copy_to(&mut roi)?;
    }

    let pixels: Vec<f32> = img_scaled.data_bytes()?.iter().map(|&p| p as f32 / 255.0).collect();
    let im_tensor = Array3::from_shape_vec((shape.height as usize, shape.width as usize, 3), pixels)?;
    let im_tensor = match shape.layout {
        InputLayout::Nhwc => im_tensor,
        InputLayout::Nchw => im_tensor.permuted_axes([2, 0, 1]),
    };

    let batched = im_tensor.insert_axis(Axis(0)).into_dyn();
    Ok((batched, Letterbox { content_width: new_width, content_height: new_height }))
}

/// decode_landmarks turns the raw face mesh outputs into normalized landmarks.
///
/// `raw_landmarks` holds `x, y, z` triplets in model input pixels, `face_logit` the
/// face presence logit.
pub(crate) fn decode_landmarks(
    raw_landmarks: &[f32],
    face_logit: f32,
    letterbox: &Letterbox,
    config: &FaceMeshConfig,
) -> Result<Vec<FaceLandmarks>, Error> {
    if raw_landmarks.len() % 3 != 0 || raw_landmarks.is_empty() {
        return Err(Error::msg(format!(
            "face_mesh_client - landmark output of length {} is not a list of 3d points",
            raw_landmarks.len()
        )))
    }

    if !face_logit.is_finite() || raw_landmarks.iter().any(|v| !v.is_finite()) {
        return Err(Error::msg("face_mesh_client - face mesh output contains non-finite values"))
    }

    let confidence = sigmoid(face_logit);
    if confidence < config.min_detection_confidence || config.max_num_faces == 0 {
        debug!("no face found, face confidence {confidence:.3}");
        return Ok(vec![])
    }

    let limit = if config.refine_landmarks { REFINED_MESH_LANDMARKS } else { BASE_MESH_LANDMARKS };
    let points: Vec<Coordinate2D> = raw_landmarks
        .chunks_exact(3)
        .take(limit)
        .map(|p| Coordinate2D {
            x: p[0] / letterbox.content_width as f32,
            y: p[1] / letterbox.content_height as f32,
        })
        .collect();

    Ok(vec![FaceLandmarks::from_normalized(points, confidence)])
}

/// Client of the face mesh model served by the inference server.
#[derive(Debug, Clone)]
pub struct FaceMeshClient {
    triton_infer_client: TritonInferenceClient,
    input_name: String,
    input_shape: InputShape,
    config: FaceMeshConfig,
}

impl FaceMeshClient {
    pub fn new(
        triton_infer_client: TritonInferenceClient,
        triton_model_metadata: ModelMetadataResponse,
        config: FaceMeshConfig,
    ) -> Result<Self, Error> {
        let input = match triton_model_metadata.inputs.first() {
            None => {
                return Err(Error::msg("face_mesh_client - face mesh model metadata has no inputs"))
            }
            Some(input) => input,
        };
        let input_shape = InputShape::from_dims(&input.shape)?;

        Ok(FaceMeshClient {
            triton_infer_client,
            input_name: input.name.to_owned(),
            input_shape,
            config,
        })
    }

    /// connect fetches the model metadata from the server and builds the client.
    pub async fn connect(triton_infer_client: TritonInferenceClient, config: FaceMeshConfig) -> Result<Self, Error> {
        let metadata = triton_infer_client.model_metadata(&config.model_name).await?;
        FaceMeshClient::new(triton_infer_client, metadata, config)
    }
}

impl LandmarkDetector for FaceMeshClient {
    fn detect(&self, img: &Mat) -> impl Future<Output = Result<Vec<FaceLandmarks>, Error>> + Send {
        let prepared = letterbox(img, &self.input_shape);
        async move {
            let (input_tensor, letterbox) = prepared?;
            let request = fp32_infer_request(&self.config.model_name, &self.input_name, input_tensor);
            let response = self
                .triton_infer_client
                .model_infer(request, Duration::from_secs(self.config.timeout))
                .await?;

            let raw_landmarks = output_to_array(&response, &self.config.landmarks_output)?;
            let face_logit = match output_to_array(&response, &self.config.score_output)?.iter().next() {
                Some(&logit) => logit,
                None => return Err(Error::msg("face_mesh_client - face score output is empty")),
            };

            let raw: Vec<f32> = raw_landmarks.iter().cloned().collect();
            decode_landmarks(&raw, face_logit, &letterbox, &self.config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh_output(n: usize, x: f32, y: f32) -> Vec<f32> {
        (0..n).flat_map(|_| [x, y, 0.0]).collect()
    }

    #[test]
    fn test_input_shape_from_dims() {
        assert_eq!(
            InputShape::from_dims(&[-1, 192, 192, 3]).unwrap(),
            InputShape { width: 192, height: 192, layout: InputLayout::Nhwc }
        );
        assert_eq!(
            InputShape::from_dims(&[1, 3, 256, 192]).unwrap(),
            InputShape { width: 192, height: 256, layout: InputLayout::Nchw }
        );
        assert!(InputShape::from_dims(&[192, 192]).is_err());
        assert!(InputShape::from_dims(&[1, 192, 192, 4]).is_err());
    }

    #[test]
    fn test_letterbox_wide_image() {
        let img = Mat::new_rows_cols_with_default(100, 200, CV_8UC3, Scalar::all(255.0)).unwrap();
        let shape = InputShape { width: 192, height: 192, layout: InputLayout::Nhwc };

        let (tensor, letterbox) = letterbox(&img, &shape).unwrap();
        assert_eq!(tensor.shape(), &[1, 192, 192, 3]);
        assert_eq!(letterbox, Letterbox { content_width: 192, content_height: 96 });
        assert!((tensor[[0, 10, 10, 0]] - 1.0).abs() < 1e-6);
        // padding below the content
        assert_eq!(tensor[[0, 150, 10, 0]], 0.0);
    }

    #[test]
    fn test_letterbox_nchw() {
        let img = Mat::new_rows_cols_with_default(50, 50, CV_8UC3, Scalar::new(0.0, 255.0, 0.0, 0.0)).unwrap();
        let shape = InputShape { width: 64, height: 64, layout: InputLayout::Nchw };
        let (tensor, _) = letterbox(&img, &shape).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
        assert_eq!(tensor[[0, 0, 5, 5]], 0.0);
        assert!((tensor[[0, 1, 5, 5]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_landmarks_normalizes_by_content() {
        let config = FaceMeshConfig::new();
        let letterbox = Letterbox { content_width: 192, content_height: 96 };
        let faces = decode_landmarks(&mesh_output(478, 96.0, 48.0), 5.0, &letterbox, &config).unwrap();

        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].len(), 478);
        let lm = faces[0].get(4).unwrap();
        assert!((lm.x - 0.5).abs() < 1e-6 && (lm.y - 0.5).abs() < 1e-6);
        assert!(faces[0].confidence > 0.99);
    }

    #[test]
    fn test_decode_landmarks_below_threshold() {
        let config = FaceMeshConfig::new();
        let letterbox = Letterbox { content_width: 192, content_height: 192 };
        let faces = decode_landmarks(&mesh_output(478, 10.0, 10.0), -3.0, &letterbox, &config).unwrap();
        assert!(faces.is_empty());
    }

    #[test]
    fn test_decode_landmarks_unrefined() {
        let config = FaceMeshConfig { refine_landmarks: false, ..FaceMeshConfig::new() };
        let letterbox = Letterbox { content_width: 192, content_height: 192 };
        let faces = decode_landmarks(&mesh_output(478, 10.0, 10.0), 3.0, &letterbox, &config).unwrap();
        assert_eq!(faces[0].len(), 468);
    }

    #[test]
    fn test_decode_landmarks_rejects_malformed_output() {
        let config = FaceMeshConfig::new();
        let letterbox = Letterbox { content_width: 192, content_height: 192 };
        assert!(decode_landmarks(&[1.0, 2.0], 3.0, &letterbox, &config).is_err());
    }

    #[test]
    fn test_decode_landmarks_rejects_non_finite_values() {
        let config = FaceMeshConfig::new();
        let letterbox = Letterbox { content_width: 192, content_height: 192 };

        let mut raw = mesh_output(478, 10.0, 10.0);
        raw[30] = f32::NAN;
        assert!(decode_landmarks(&raw, 3.0, &letterbox, &config).is_err());

        raw[30] = f32::INFINITY;
        assert!(decode_landmarks(&raw, 3.0, &letterbox, &config).is_err());

        assert!(decode_landmarks(&mesh_output(478, 10.0, 10.0), f32::NAN, &letterbox, &config).is_err());
    }
}
