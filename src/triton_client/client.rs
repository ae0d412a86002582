use std::time::Duration;
use anyhow::{Context, Error};
use log::debug;
use tonic::transport::{Channel, Endpoint};
use crate::triton_client::client::triton::grpc_inference_service_client::GrpcInferenceServiceClient;
use crate::triton_client::client::triton::{
    ModelInferRequest, ModelInferResponse, ModelMetadataRequest, ModelMetadataResponse, ModelReadyRequest,
    ServerLiveRequest,
};

pub mod triton {
    tonic::include_proto!("inference");
}

/// Thin wrapper over the generated KServe v2 / Triton gRPC client.
///
/// Cloning is cheap, every clone shares the underlying channel.
#[derive(Debug, Clone)]
pub struct TritonInferenceClient {
    client: GrpcInferenceServiceClient<Channel>,
}

impl TritonInferenceClient {
    /// connect opens a channel to the inference server at `url`, e.g. `http://localhost:8001`.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let channel = Endpoint::from_shared(url.to_string())?
            .tcp_nodelay(true)
            .connect()
            .await
            .with_context(|| format!("failed to connect to inference server at {url}"))?;
        Ok(TritonInferenceClient::from_channel(channel))
    }

    pub fn from_channel(channel: Channel) -> Self {
        TritonInferenceClient {
            client: GrpcInferenceServiceClient::new(channel),
        }
    }

    pub async fn server_live(&self) -> Result<bool, Error> {
        let response = self.client.clone().server_live(ServerLiveRequest {}).await?;
        Ok(response.into_inner().live)
    }

    pub async fn model_ready(&self, model_name: &str) -> Result<bool, Error> {
        let request = ModelReadyRequest {
            name: model_name.to_string(),
            version: "".to_string(),
        };
        let response = self.client.clone().model_ready(request).await?;
        Ok(response.into_inner().ready)
    }

    pub async fn model_metadata(&self, model_name: &str) -> Result<ModelMetadataResponse, Error> {
        let request = ModelMetadataRequest {
            name: model_name.to_string(),
            version: "".to_string(),
        };
        let response = self
            .client
            .clone()
            .model_metadata(request)
            .await
            .with_context(|| format!("failed to fetch metadata of model {model_name}"))?;
        Ok(response.into_inner())
    }

    /// model_infer runs one inference request, giving up after `timeout`.
    pub async fn model_infer(&self, request: ModelInferRequest, timeout: Duration) -> Result<ModelInferResponse, Error> {
        let model_name = request.model_name.clone();
        let mut request = tonic::Request::new(request);
        request.set_timeout(timeout);

        let response = self
            .client
            .clone()
            .model_infer(request)
            .await
            .with_context(|| format!("inference failed for model {model_name}"))?;
        debug!("model {model_name} answered with {} outputs", response.get_ref().outputs.len());
        Ok(response.into_inner())
    }
}

/// fp32_infer_request wraps a single FP32 tensor into an inference request for `model_name`.
///
/// # Arguments
/// * `model_name` - name of the model on the inference server
/// * `input_name` - name of the model input
/// * `tensor` - input tensor, its shape is sent as is
///
/// # Returns
/// * `ModelInferRequest`
pub fn fp32_infer_request(model_name: &str, input_name: &str, tensor: ndarray::ArrayD<f32>) -> ModelInferRequest {
    let shape: Vec<i64> = tensor.shape().iter().map(|&x| x as i64).collect();
    let fp32_contents: Vec<f32> = tensor.iter().cloned().collect();

    ModelInferRequest {
        model_name: model_name.to_owned(),
        model_version: "".to_string(),
        id: "".to_string(),
        parameters: Default::default(),
        inputs: vec![triton::model_infer_request::InferInputTensor {
            name: input_name.to_string(),
            datatype: "FP32".to_string(),
            shape,
            parameters: Default::default(),
            contents: Some(triton::InferTensorContents {
                fp32_contents,
                ..Default::default()
            }),
        }],
        outputs: Default::default(),
        raw_input_contents: vec![],
    }
}
