use crate::defaults;
use crate::error::{Result, SignError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub pipeline: PipelineSettings,
    pub model: ModelConfig,
}

/// WebSocket listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub drain_interval_ms: u64,
    pub max_message_bytes: usize,
}

/// Windowing, gating and debounce knobs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    pub seq_len: usize,
    pub threshold: f32,
    pub reset: ResetMode,
    pub stride: usize,
    pub debounce: bool,
    pub poll_interval_ms: u64,
    pub frame_height: u32,
    pub mirror: bool,
}

/// What happens to a window once it has been classified
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResetMode {
    /// Start over with an empty window.
    Full,
    /// Drop the `stride` oldest entries and keep the rest.
    Sliding,
}

/// Model locations and the class vocabulary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub keypoint_len: usize,
    pub classes: Vec<String>,
    pub labels_path: Option<PathBuf>,
    pub classifier_path: Option<PathBuf>,
    pub extractor_path: Option<PathBuf>,
    pub extractor_input_size: u32,
    pub apply_softmax: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::HOST.to_string(),
            port: defaults::PORT,
            drain_interval_ms: defaults::DRAIN_INTERVAL_MS,
            max_message_bytes: defaults::MAX_MESSAGE_BYTES,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            seq_len: defaults::SEQ_LEN,
            threshold: defaults::THRESHOLD,
            reset: ResetMode::Sliding,
            stride: defaults::STRIDE,
            debounce: true,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            frame_height: defaults::FRAME_HEIGHT,
            mirror: true,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            keypoint_len: defaults::KEYPOINT_LEN,
            classes: Vec::new(),
            labels_path: None,
            classifier_path: None,
            extractor_path: None,
            extractor_input_size: defaults::EXTRACTOR_INPUT_SIZE,
            apply_softmax: false,
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl ModelConfig {
    /// Resolve the class vocabulary.
    ///
    /// A labels file (one word per line, blank lines skipped) takes precedence
    /// over the inline `classes` list.
    pub fn class_names(&self) -> Result<Vec<String>> {
        let Some(path) = &self.labels_path else {
            return Ok(self.classes.clone());
        };

        let contents = fs::read_to_string(path).map_err(|e| SignError::ClassList {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        let names: Vec<String> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        if names.is_empty() {
            return Err(SignError::ClassList {
                message: format!("{} contains no labels", path.display()),
            });
        }
        Ok(names)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SignError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                SignError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if it doesn't exist.
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(SignError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - SIGNSTREAM_HOST → server.host
    /// - SIGNSTREAM_PORT → server.port
    /// - SIGNSTREAM_THRESHOLD → pipeline.threshold
    /// - SIGNSTREAM_CLASSIFIER_MODEL → model.classifier_path
    /// - SIGNSTREAM_EXTRACTOR_MODEL → model.extractor_path
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(host) = non_empty_env("SIGNSTREAM_HOST") {
            self.server.host = host;
        }

        if let Some(port) = non_empty_env("SIGNSTREAM_PORT") {
            self.server.port = port.parse().map_err(|_| SignError::ConfigInvalidValue {
                key: "SIGNSTREAM_PORT".to_string(),
                message: format!("'{}' is not a valid port", port),
            })?;
        }

        if let Some(threshold) = non_empty_env("SIGNSTREAM_THRESHOLD") {
            self.pipeline.threshold =
                threshold
                    .parse()
                    .map_err(|_| SignError::ConfigInvalidValue {
                        key: "SIGNSTREAM_THRESHOLD".to_string(),
                        message: format!("'{}' is not a number", threshold),
                    })?;
        }

        if let Some(path) = non_empty_env("SIGNSTREAM_CLASSIFIER_MODEL") {
            self.model.classifier_path = Some(PathBuf::from(path));
        }

        if let Some(path) = non_empty_env("SIGNSTREAM_EXTRACTOR_MODEL") {
            self.model.extractor_path = Some(PathBuf::from(path));
        }

        Ok(self)
    }

    /// Check every knob for values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;

        if p.seq_len == 0 {
            return Err(invalid("pipeline.seq_len", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&p.threshold) {
            return Err(invalid("pipeline.threshold", "must be within [0, 1]"));
        }
        if p.reset == ResetMode::Sliding && (p.stride == 0 || p.stride > p.seq_len) {
            return Err(invalid(
                "pipeline.stride",
                &format!("must be within [1, {}] (seq_len)", p.seq_len),
            ));
        }
        if p.poll_interval_ms == 0 {
            return Err(invalid("pipeline.poll_interval_ms", "must be positive"));
        }
        if p.frame_height == 0 {
            return Err(invalid("pipeline.frame_height", "must be positive"));
        }
        if self.server.drain_interval_ms == 0 {
            return Err(invalid("server.drain_interval_ms", "must be positive"));
        }
        if self.model.keypoint_len == 0 {
            return Err(invalid("model.keypoint_len", "must be at least 1"));
        }
        if self.model.extractor_input_size == 0 {
            return Err(invalid("model.extractor_input_size", "must be positive"));
        }
        let models_configured =
            self.model.classifier_path.is_some() || self.model.extractor_path.is_some();
        if models_configured && self.model.labels_path.is_none() && self.model.classes.is_empty()
        {
            return Err(invalid(
                "model.classes",
                "a class list (or labels_path) is required when models are configured",
            ));
        }

        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SignError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/signstream/config.toml on Linux
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("signstream").join("config.toml"))
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

fn invalid(key: &str, message: &str) -> SignError {
    SignError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
