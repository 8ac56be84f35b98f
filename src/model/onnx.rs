//! ONNX Runtime backends for the landmark extractor and the sign classifier.

use crate::error::{Result, SignError};
use crate::model::classifier::{ClassifyError, SequenceClassifier, check_window};
use crate::model::extractor::{ExtractError, FeatureExtractor};
use crate::pipeline::types::{KeypointVector, Prediction};
use image::RgbImage;
use image::imageops::{self, FilterType};
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::Tensor;
use std::path::Path;

fn load_error(path: &Path, e: impl std::fmt::Display) -> SignError {
    SignError::ModelLoad {
        message: format!("{}: {}", path.display(), e),
    }
}

fn open_session(path: &Path) -> Result<(Session, String, String)> {
    if !path.exists() {
        return Err(SignError::ModelNotFound {
            path: path.display().to_string(),
        });
    }

    let session = Session::builder()
        .map_err(|e| load_error(path, e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| load_error(path, e))?
        .with_intra_threads(1)
        .map_err(|e| load_error(path, e))?
        .commit_from_file(path)
        .map_err(|e| load_error(path, e))?;

    let input_name = session
        .inputs
        .first()
        .map(|i| i.name.clone())
        .ok_or_else(|| SignError::ModelLoad {
            message: format!("{} has no inputs", path.display()),
        })?;
    let output_name = session
        .outputs
        .first()
        .map(|o| o.name.clone())
        .ok_or_else(|| SignError::ModelLoad {
            message: format!("{} has no outputs", path.display()),
        })?;

    Ok((session, input_name, output_name))
}

/// Landmark model: `[1, 3, S, S]` RGB in `[0, 1]` to a flat keypoint vector.
pub struct OnnxExtractor {
    session: Session,
    input_name: String,
    output_name: String,
    input_size: u32,
    keypoint_len: usize,
}

impl OnnxExtractor {
    pub fn load(path: &Path, input_size: u32, keypoint_len: usize) -> Result<Self> {
        let (session, input_name, output_name) = open_session(path)?;
        Ok(Self {
            session,
            input_name,
            output_name,
            input_size,
            keypoint_len,
        })
    }

    fn to_tensor_data(&self, image: &RgbImage) -> Vec<f32> {
        let size = self.input_size;
        let resized = imageops::resize(image, size, size, FilterType::Triangle);
        let plane = (size * size) as usize;
        let mut data = vec![0.0f32; plane * 3];
        for (i, pixel) in resized.pixels().enumerate() {
            for channel in 0..3 {
                data[channel * plane + i] = pixel[channel] as f32 / 255.0;
            }
        }
        data
    }
}

impl FeatureExtractor for OnnxExtractor {
    fn extract(&mut self, image: &RgbImage) -> std::result::Result<KeypointVector, ExtractError> {
        let size = self.input_size as i64;
        let input = Tensor::from_array(([1i64, 3, size, size], self.to_tensor_data(image)))
            .map_err(|e| ExtractError::Fault(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| ExtractError::Fault(e.to_string()))?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| ExtractError::Fault("missing model output".to_string()))?;
        let (_shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ExtractError::Fault(e.to_string()))?;

        if data.len() != self.keypoint_len {
            return Err(ExtractError::Fault(format!(
                "model produced {} values, expected {}",
                data.len(),
                self.keypoint_len
            )));
        }
        if data.iter().all(|&v| v == 0.0) {
            return Err(ExtractError::NoDetection);
        }
        Ok(KeypointVector::new(data.to_vec()))
    }

    fn keypoint_len(&self) -> usize {
        self.keypoint_len
    }

    fn name(&self) -> &str {
        "onnx-extractor"
    }
}

/// Sequence model: `[1, seq_len, K]` to one score per class.
pub struct OnnxClassifier {
    session: Session,
    input_name: String,
    output_name: String,
    seq_len: usize,
    keypoint_len: usize,
    apply_softmax: bool,
}

impl OnnxClassifier {
    pub fn load(
        path: &Path,
        seq_len: usize,
        keypoint_len: usize,
        apply_softmax: bool,
    ) -> Result<Self> {
        let (session, input_name, output_name) = open_session(path)?;
        Ok(Self {
            session,
            input_name,
            output_name,
            seq_len,
            keypoint_len,
            apply_softmax,
        })
    }
}

impl SequenceClassifier for OnnxClassifier {
    fn classify(
        &mut self,
        window: &[KeypointVector],
    ) -> std::result::Result<Prediction, ClassifyError> {
        check_window(window, self.seq_len, self.keypoint_len)?;

        let data: Vec<f32> = window
            .iter()
            .flat_map(|v| v.as_slice().iter().copied())
            .collect();
        let input = Tensor::from_array((
            [1i64, self.seq_len as i64, self.keypoint_len as i64],
            data,
        ))
        .map_err(|e| ClassifyError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| ClassifyError::Inference("missing model output".to_string()))?;
        let (_shape, scores) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;

        let scores = scores.to_vec();
        Ok(Prediction::new(if self.apply_softmax {
            softmax(&scores)
        } else {
            scores
        }))
    }

    fn name(&self) -> &str {
        "onnx-classifier"
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 {
        return exps;
    }
    exps.into_iter().map(|e| e / sum).collect()
}
