use anyhow::ensure;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::classifier::{InputLayout, DEFAULT_INPUT_SIZE};
use crate::ingest::DEFAULT_MAX_UPLOAD_BYTES;
use crate::localizer::GeminiConfig;
use crate::pipeline::PipelineSettings;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Cattle muzzle identification service", long_about = None)]
pub struct Config {
    /// Server host to bind to
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to bind to
    #[arg(long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// API key for the Gemini vision model
    #[arg(long, env = "GEMINI_API", hide_env_values = true)]
    pub gemini_api_key: String,

    /// Gemini model used for muzzle localization
    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-1.5-flash")]
    pub gemini_model: String,

    /// Base URL of the Gemini API
    #[arg(
        long,
        env = "GEMINI_BASE_URL",
        default_value = "https://generativelanguage.googleapis.com"
    )]
    pub gemini_base_url: String,

    /// Timeout for a single vision model call, in seconds
    #[arg(long, env = "MODEL_TIMEOUT_SECS", default_value = "60")]
    pub model_timeout_secs: u64,

    /// Path to the ONNX identity classifier
    #[arg(long, env = "CLASSIFIER_MODEL", default_value = "models/cattle_classifier.onnx")]
    pub classifier_model: PathBuf,

    /// JSON map from class index to class label
    #[arg(long, env = "CLASS_LABELS", default_value = "models/class_labels.json")]
    pub class_labels: PathBuf,

    /// Square input size of the classifier, in pixels
    #[arg(long, env = "CLASSIFIER_INPUT_SIZE", default_value_t = DEFAULT_INPUT_SIZE)]
    pub input_size: u32,

    /// Tensor layout of the classifier input
    #[arg(long, env = "CLASSIFIER_INPUT_LAYOUT", value_enum, default_value = "nhwc")]
    pub input_layout: InputLayout,

    /// Registration CSV
    #[arg(long, env = "REGISTRY_CSV", default_value = "data/sample_registration.csv")]
    pub registry: PathBuf,

    /// Minimum probability (exclusive) for an identity to be accepted
    #[arg(long, env = "CONFIDENCE_THRESHOLD", default_value = "0.55")]
    pub confidence_threshold: f32,

    /// Largest accepted upload, in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Directory to save every classifier crop into
    #[arg(long, env = "CROP_DUMP_DIR")]
    pub crop_dump_dir: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            !self.gemini_api_key.trim().is_empty(),
            "GEMINI_API must not be empty"
        );
        ensure!(
            (0.0..=1.0).contains(&self.confidence_threshold),
            "confidence threshold {} is outside [0, 1]",
            self.confidence_threshold
        );
        ensure!(self.input_size > 0, "classifier input size must be positive");
        ensure!(self.max_upload_bytes > 0, "max upload size must be positive");
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn gemini(&self) -> GeminiConfig {
        GeminiConfig {
            api_key: self.gemini_api_key.clone(),
            model: self.gemini_model.clone(),
            base_url: self.gemini_base_url.clone(),
            timeout: Duration::from_secs(self.model_timeout_secs),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            confidence_threshold: self.confidence_threshold,
            max_upload_bytes: self.max_upload_bytes,
            crop_dump_dir: self.crop_dump_dir.clone(),
        }
    }
}
