use anyhow::Error;
use ndarray::{Array, IxDyn};
use crate::triton_client::client::triton::model_infer_response::InferOutputTensor;
use crate::triton_client::client::triton::ModelInferResponse;

pub fn u8_to_f32_vec(v: &[u8]) -> Vec<f32> {
    v.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub fn u8_to_i32_vec(v: &[u8]) -> Vec<i32> {
    v.chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// output_to_array decodes the named output tensor of an inference response.
///
/// Triton answers in `raw_output_contents` even when the request used typed contents,
/// other KServe servers fill the typed `contents` field instead. Both are handled.
///
/// # Arguments
/// * `response` - ModelInferResponse
/// * `name` - output tensor name
///
/// # Returns
/// * `Result<Array<f32, IxDyn>, Error>`
pub fn output_to_array(response: &ModelInferResponse, name: &str) -> Result<Array<f32, IxDyn>, Error> {
    let (oidx, output) = match response.outputs.iter().enumerate().find(|(_, o)| o.name == name) {
        Some(found) => found,
        None => {
            return Err(Error::msg(format!("inference response has no output named {name}")))
        }
    };

    let dimensions: Vec<usize> = output.shape.iter().map(|&d| d.max(0) as usize).collect();
    let values = match response.raw_output_contents.get(oidx) {
        Some(raw) if !raw.is_empty() => decode_raw(output, raw)?,
        _ => decode_typed(output)?,
    };

    let arr = Array::from_shape_vec(IxDyn(&dimensions), values)?;
    Ok(arr)
}

fn decode_raw(output: &InferOutputTensor, raw: &[u8]) -> Result<Vec<f32>, Error> {
    match output.datatype.as_str() {
        "FP32" => Ok(u8_to_f32_vec(raw)),
        "INT32" => Ok(u8_to_i32_vec(raw).iter().map(|&x| x as f32).collect()),
        other => Err(Error::msg(format!("unsupported output datatype {other} for {}", output.name))),
    }
}

fn decode_typed(output: &InferOutputTensor) -> Result<Vec<f32>, Error> {
    let contents = match &output.contents {
        Some(contents) => contents,
        None => return Err(Error::msg(format!("output {} carries no data", output.name))),
    };
    match output.datatype.as_str() {
        "FP32" => Ok(contents.fp32_contents.clone()),
        "INT32" => Ok(contents.int_contents.iter().map(|&x| x as f32).collect()),
        other => Err(Error::msg(format!("unsupported output datatype {other} for {}", output.name))),
    }
}
