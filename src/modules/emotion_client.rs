use std::future::Future;
use std::time::Duration;
use anyhow::Error;
use log::debug;
use ndarray::{Array, ArrayD, IxDyn};
use opencv::core::{Mat, MatTraitConstManual, Rect};
use opencv::imgproc::{cvt_color, COLOR_RGB2GRAY};
use serde::{Deserialize, Serialize};
use crate::config::config::EmotionConfig;
use crate::modules::EmotionClassifier;
use crate::triton_client::client::triton::ModelMetadataResponse;
use crate::triton_client::client::{fp32_infer_request, TritonInferenceClient};
use crate::utils::image::{crop_image, resize_image};
use crate::utils::utils::output_to_array;

/// Reported instead of a label when no face could be classified.
pub const NO_EMOTION_DETECTED: &str = "No se detectaron emociones";

/// The closed set of labels, in the order of the classifier's output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EmotionLabel {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
}

impl EmotionLabel {
    pub const ALL: [EmotionLabel; 7] = [
        EmotionLabel::Angry,
        EmotionLabel::Disgust,
        EmotionLabel::Fear,
        EmotionLabel::Happy,
        EmotionLabel::Sad,
        EmotionLabel::Surprise,
        EmotionLabel::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Angry => "angry",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Happy => "happy",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Neutral => "neutral",
        }
    }

    /// Label shown to users.
    pub fn translated(&self) -> &'static str {
        match self {
            EmotionLabel::Angry => "enojado",
            EmotionLabel::Disgust => "disgustado",
            EmotionLabel::Fear => "miedo",
            EmotionLabel::Happy => "feliz",
            EmotionLabel::Sad => "triste",
            EmotionLabel::Surprise => "sorprendido",
            EmotionLabel::Neutral => "neutral",
        }
    }
}

/// Confidence per label for one face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmotionScores {
    scores: [f32; 7],
}

impl EmotionScores {
    pub fn new(scores: [f32; 7]) -> Self {
        EmotionScores { scores }
    }

    /// from_slice reads the first seven values of a classifier output.
    pub fn from_slice(values: &[f32]) -> Result<Self, Error> {
        if values.len() < EmotionLabel::ALL.len() {
            return Err(Error::msg(format!("emotion_client - expected 7 scores, got {}", values.len())))
        }
        let mut scores = [0.0f32; 7];
        scores.copy_from_slice(&values[..7]);
        Ok(EmotionScores { scores })
    }

    pub fn get(&self, label: EmotionLabel) -> f32 {
        self.scores[label as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (EmotionLabel, f32)> + '_ {
        EmotionLabel::ALL.iter().map(|&label| (label, self.get(label)))
    }

    /// dominant returns the label with the highest score, the earliest label wins ties.
    pub fn dominant(&self) -> EmotionLabel {
        let mut best = EmotionLabel::Angry;
        for (label, score) in self.iter() {
            if score > self.get(best) {
                best = label;
            }
        }
        best
    }
}

/// dominant_emotion translates the dominant label of the first face, or returns
/// [`NO_EMOTION_DETECTED`] when nothing was classified.
pub fn dominant_emotion(results: &[EmotionScores]) -> String {
    match results.first() {
        Some(scores) => scores.dominant().translated().to_string(),
        None => NO_EMOTION_DETECTED.to_string(),
    }
}

/// Client of the emotion classification model served by the inference server.
///
/// The model never searches for faces itself, callers pass the face regions to classify.
#[derive(Debug, Clone)]
pub struct EmotionClient {
    triton_infer_client: TritonInferenceClient,
    input_name: String,
    input_dims: Vec<usize>,
    output_name: String,
    config: EmotionConfig,
}

impl EmotionClient {
    pub fn new(
        triton_infer_client: TritonInferenceClient,
        triton_model_metadata: ModelMetadataResponse,
        config: EmotionConfig,
    ) -> Result<Self, Error> {
        let input = match triton_model_metadata.inputs.first() {
            None => return Err(Error::msg("emotion_client - emotion model metadata has no inputs")),
            Some(input) => input,
        };
        let output = match triton_model_metadata.outputs.first() {
            None => return Err(Error::msg("emotion_client - emotion model metadata has no outputs")),
            Some(output) => output,
        };

        let input_dims = input_dims(&input.shape, config.imsize)?;
        Ok(EmotionClient {
            triton_infer_client,
            input_name: input.name.to_owned(),
            input_dims,
            output_name: output.name.to_owned(),
            config,
        })
    }

    pub async fn connect(triton_infer_client: TritonInferenceClient, config: EmotionConfig) -> Result<Self, Error> {
        let metadata = triton_infer_client.model_metadata(&config.model_name).await?;
        EmotionClient::new(triton_infer_client, metadata, config)
    }

    fn preprocess(&self, img: &Mat, face: Rect) -> Result<ArrayD<f32>, Error> {
        preprocess_face(img, face, &self.input_dims)
    }
}

/// input_dims resolves the batched single-channel input shape, `[1, H, W, 1]` or `[1, 1, H, W]`.
/// Dynamic spatial dimensions fall back to `imsize` (width, height).
fn input_dims(shape: &[i64], imsize: (i32, i32)) -> Result<Vec<usize>, Error> {
    if shape.len() < 3 {
        return Err(Error::msg(format!("emotion_client - unexpected input shape {shape:?}")))
    }
    let resolve = |dim: i64, fallback: i32| if dim > 0 { dim as usize } else { fallback as usize };
    let last = &shape[shape.len() - 3..];
    let dims = match last {
        [h, w, 1] => vec![1, resolve(*h, imsize.1), resolve(*w, imsize.0), 1],
        [1, h, w] => vec![1, 1, resolve(*h, imsize.1), resolve(*w, imsize.0)],
        _ => return Err(Error::msg(format!("emotion_client - model input must be single channel, got {shape:?}"))),
    };
    Ok(dims)
}

/// preprocess_face crops `face`, converts it to grey, resizes it to the model input and
/// scales pixels to `[-1, 1]`.
fn preprocess_face(img: &Mat, face: Rect, dims: &[usize]) -> Result<ArrayD<f32>, Error> {
    let (height, width) = if dims[3] == 1 { (dims[1], dims[2]) } else { (dims[2], dims[3]) };

    let cropped = crop_image(img, face)?;
    let mut gray = Mat::default();
    cvt_color(&cropped, &mut gray, COLOR_RGB2GRAY, 0)?;
    let resized = resize_image(&gray, (width as i32, height as i32))?;

    let pixels: Vec<f32> = resized
        .data_bytes()?
        .iter()
        .map(|&p| (p as f32 / 255.0 - 0.5) * 2.0)
        .collect();
    let tensor = Array::from_shape_vec(IxDyn(dims), pixels)?;
    Ok(tensor)
}

impl EmotionClassifier for EmotionClient {
    fn classify(&self, img: &Mat, faces: &[Rect]) -> impl Future<Output = Result<Vec<EmotionScores>, Error>> + Send {
        let prepared: Result<Vec<ArrayD<f32>>, Error> = faces.iter().map(|&face| self.preprocess(img, face)).collect();
        async move {
            let input_tensors = prepared?;
            let mut results = Vec::with_capacity(input_tensors.len());

            for input_tensor in input_tensors {
                let request = fp32_infer_request(&self.config.model_name, &self.input_name, input_tensor);
                let response = self
                    .triton_infer_client
                    .model_infer(request, Duration::from_secs(self.config.timeout))
                    .await?;
                let output = output_to_array(&response, &self.output_name)?;
                let values: Vec<f32> = output.iter().cloned().collect();
                let scores = EmotionScores::from_slice(&values)?;
                debug!("emotion scores {:?}", scores.iter().collect::<Vec<_>>());
                results.push(scores);
            }
            Ok(results)
        }
    }
}
