//! Model wrappers: landmark extraction and sequence classification.
//!
//! Both models sit behind traits so the pipeline can run against test doubles
//! or the ONNX Runtime backends (`onnx` feature).

pub mod classifier;
pub mod extractor;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use classifier::{ClassifyError, ScriptedClassifier, SequenceClassifier, check_window};
pub use extractor::{ExtractError, FeatureExtractor, MockExtractor};

use crate::config::Config;
use crate::error::{Result, SignError};

/// The two models the pipeline worker owns.
pub struct Models {
    pub extractor: Box<dyn FeatureExtractor>,
    pub classifier: Box<dyn SequenceClassifier>,
}

/// Load both models named in the configuration.
///
/// Called once at startup; any failure here is fatal.
#[cfg(feature = "onnx")]
pub fn load_models(config: &Config) -> Result<Models> {
    use onnx::{OnnxClassifier, OnnxExtractor};

    let extractor_path = config
        .model
        .extractor_path
        .as_deref()
        .ok_or_else(|| missing_model("model.extractor_path"))?;
    let classifier_path = config
        .model
        .classifier_path
        .as_deref()
        .ok_or_else(|| missing_model("model.classifier_path"))?;

    tracing::info!(path = %extractor_path.display(), "loading landmark model");
    let extractor = OnnxExtractor::load(
        extractor_path,
        config.model.extractor_input_size,
        config.model.keypoint_len,
    )?;

    tracing::info!(path = %classifier_path.display(), "loading sign classifier");
    let classifier = OnnxClassifier::load(
        classifier_path,
        config.pipeline.seq_len,
        config.model.keypoint_len,
        config.model.apply_softmax,
    )?;

    Ok(Models {
        extractor: Box::new(extractor),
        classifier: Box::new(classifier),
    })
}

/// Load both models named in the configuration.
///
/// Without the `onnx` feature there is no model backend to load into.
#[cfg(not(feature = "onnx"))]
pub fn load_models(config: &Config) -> Result<Models> {
    if config.model.extractor_path.is_none() {
        return Err(missing_model("model.extractor_path"));
    }
    if config.model.classifier_path.is_none() {
        return Err(missing_model("model.classifier_path"));
    }
    Err(SignError::ModelLoad {
        message: "signstream was built without the `onnx` feature".to_string(),
    })
}

fn missing_model(key: &str) -> SignError {
    SignError::ConfigInvalidValue {
        key: key.to_string(),
        message: "no model configured".to_string(),
    }
}
