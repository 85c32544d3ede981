//! Identity classifier: a pretrained ONNX network run with tract.

use std::collections::HashMap;
use std::path::Path;

use clap::ValueEnum;
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;
use thiserror::Error;
use tract_onnx::prelude::*;
use tracing::{debug, info};

use crate::models::ClassificationResult;

pub const DEFAULT_INPUT_SIZE: u32 = 224;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("failed to read class labels {path}: {source}")]
    LabelsIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid class labels file: {0}")]
    LabelsFormat(String),
    #[error("model error: {0}")]
    Model(String),
    #[error("model returned no scores")]
    EmptyOutput,
    #[error("no label for class index {0}")]
    UnknownClass(usize),
}

/// Tensor layout the network expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InputLayout {
    /// `[1, H, W, 3]`, as exported from Keras.
    Nhwc,
    /// `[1, 3, H, W]`, as exported from PyTorch.
    Nchw,
}

impl InputLayout {
    pub fn shape(&self, size: u32) -> [usize; 4] {
        let s = size as usize;
        match self {
            InputLayout::Nhwc => [1, s, s, 3],
            InputLayout::Nchw => [1, 3, s, s],
        }
    }
}

/// Top class of one inference.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class_index: usize,
    pub label: String,
    pub probability: f32,
}

impl Prediction {
    /// Keeps the label only when `probability` is strictly above `threshold`.
    pub fn accept(self, threshold: f32) -> ClassificationResult {
        let predicted_class = (self.probability > threshold).then_some(self.label);
        ClassificationResult {
            predicted_class,
            probability: self.probability,
        }
    }
}

pub trait IdentityClassifier: Send + Sync {
    fn classify(&self, image: &DynamicImage) -> Result<Prediction, ClassifierError>;
}

type ClassifierPlan = TypedRunnableModel<TypedModel>;

pub struct OnnxClassifier {
    plan: ClassifierPlan,
    labels: HashMap<usize, String>,
    input_size: u32,
    layout: InputLayout,
}

impl OnnxClassifier {
    pub fn load(
        model_path: impl AsRef<Path>,
        labels_path: impl AsRef<Path>,
        input_size: u32,
        layout: InputLayout,
    ) -> Result<Self, ClassifierError> {
        let model_path = model_path.as_ref();
        let labels = load_labels(labels_path)?;

        let shape = layout.shape(input_size);
        let plan = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(|e| ClassifierError::Model(format!("loading {}: {e}", model_path.display())))?
            .with_input_fact(0, f32::fact(shape).into())
            .map_err(|e| ClassifierError::Model(format!("setting input shape: {e}")))?
            .into_optimized()
            .map_err(|e| ClassifierError::Model(format!("optimizing: {e}")))?
            .into_runnable()
            .map_err(|e| ClassifierError::Model(format!("initializing: {e}")))?;

        info!(
            "Loaded classifier {} ({} labels, input {:?})",
            model_path.display(),
            labels.len(),
            shape
        );

        Ok(Self {
            plan,
            labels,
            input_size,
            layout,
        })
    }
}

impl IdentityClassifier for OnnxClassifier {
    fn classify(&self, image: &DynamicImage) -> Result<Prediction, ClassifierError> {
        let input = preprocess(image, self.input_size, self.layout);
        let shape = input.shape().to_vec();
        let data = input.into_raw_vec();
        let tensor = Tensor::from_shape(&shape, &data)
            .map_err(|e| ClassifierError::Model(format!("building input tensor: {e}")))?;

        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| ClassifierError::Model(format!("inference failed: {e}")))?;
        let output = outputs
            .first()
            .ok_or(ClassifierError::EmptyOutput)?
            .to_array_view::<f32>()
            .map_err(|e| ClassifierError::Model(format!("reading output: {e}")))?;

        let scores: Vec<f32> = output.iter().copied().collect();
        let probabilities = to_probabilities(&scores);
        let (class_index, probability) =
            top_class(&probabilities).ok_or(ClassifierError::EmptyOutput)?;
        let label = self
            .labels
            .get(&class_index)
            .cloned()
            .ok_or(ClassifierError::UnknownClass(class_index))?;

        debug!(class_index, %label, probability, "classifier output");
        Ok(Prediction {
            class_index,
            label,
            probability,
        })
    }
}

/// Reads a `{"0": "cattle_01", "1": "cattle_02"}` style label map.
pub fn load_labels(path: impl AsRef<Path>) -> Result<HashMap<usize, String>, ClassifierError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ClassifierError::LabelsIo {
        path: path.display().to_string(),
        source,
    })?;
    parse_labels(&raw)
}

pub fn parse_labels(raw: &str) -> Result<HashMap<usize, String>, ClassifierError> {
    let map: HashMap<String, String> =
        serde_json::from_str(raw).map_err(|e| ClassifierError::LabelsFormat(e.to_string()))?;
    map.into_iter()
        .map(|(key, label)| {
            key.trim()
                .parse::<usize>()
                .map(|index| (index, label))
                .map_err(|_| ClassifierError::LabelsFormat(format!("key {key:?} is not a class index")))
        })
        .collect()
}

/// Resize to `size`×`size` RGB, scale to [0,1] and add the batch axis.
pub fn preprocess(image: &DynamicImage, size: u32, layout: InputLayout) -> Array4<f32> {
    let resized = image
        .resize_exact(size, size, FilterType::Triangle)
        .to_rgb8();

    let mut tensor = Array4::<f32>::zeros(layout.shape(size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0;
            match layout {
                InputLayout::Nhwc => tensor[[0, y, x, c]] = value,
                InputLayout::Nchw => tensor[[0, c, y, x]] = value,
            }
        }
    }
    tensor
}

/// Passes softmax outputs through untouched, applies softmax to raw logits.
pub fn to_probabilities(scores: &[f32]) -> Vec<f32> {
    let in_unit_range = scores.iter().all(|s| (0.0..=1.0).contains(s));
    let sum: f32 = scores.iter().sum();
    if in_unit_range && (sum - 1.0).abs() < 1e-3 {
        return scores.to_vec();
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

pub fn top_class(probabilities: &[f32]) -> Option<(usize, f32)> {
    probabilities
        .iter()
        .copied()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn accept_applies_strict_threshold() {
        let prediction = |probability| Prediction {
            class_index: 0,
            label: "A".into(),
            probability,
        };

        let low = prediction(0.40).accept(0.55);
        assert_eq!(low.predicted_class, None);
        assert_eq!(low.probability, 0.40);

        assert_eq!(prediction(0.55).accept(0.55).predicted_class, None);
        assert_eq!(
            prediction(0.9).accept(0.55).predicted_class.as_deref(),
            Some("A")
        );
    }

    #[test]
    fn preprocess_nhwc_shape_and_scale() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 30, Rgb([255, 0, 51])));
        let tensor = preprocess(&image, 224, InputLayout::Nhwc);
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        assert_eq!(tensor[[0, 10, 20, 0]], 1.0);
        assert_eq!(tensor[[0, 10, 20, 1]], 0.0);
        assert!((tensor[[0, 10, 20, 2]] - 0.2).abs() < 1e-6);
        assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn preprocess_nchw_puts_channels_first() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([0, 255, 0])));
        let tensor = preprocess(&image, 16, InputLayout::Nchw);
        assert_eq!(tensor.shape(), &[1, 3, 16, 16]);
        assert_eq!(tensor[[0, 0, 5, 5]], 0.0);
        assert_eq!(tensor[[0, 1, 5, 5]], 1.0);
    }

    #[test]
    fn softmax_outputs_pass_through() {
        let probabilities = to_probabilities(&[0.1, 0.7, 0.2]);
        assert_eq!(probabilities, vec![0.1, 0.7, 0.2]);
        assert_eq!(top_class(&probabilities), Some((1, 0.7)));
    }

    #[test]
    fn logits_are_normalized() {
        let probabilities = to_probabilities(&[2.0, -1.0, 0.5]);
        let sum: f32 = probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(top_class(&probabilities).map(|(i, _)| i), Some(0));
    }

    #[test]
    fn top_class_of_empty_output_is_none() {
        assert_eq!(top_class(&[]), None);
    }

    #[test]
    fn bundled_labels_load() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/models/class_labels.json");
        let labels = load_labels(path).unwrap();
        assert_eq!(labels.get(&0).map(String::as_str), Some("cattle_01"));
    }

    #[test]
    fn labels_parse_from_index_map() {
        let labels = parse_labels(r#"{"0": "cattle_01", "1": "cattle_02"}"#).unwrap();
        assert_eq!(labels.get(&1).map(String::as_str), Some("cattle_02"));
        assert!(matches!(
            parse_labels(r#"{"first": "cattle_01"}"#),
            Err(ClassifierError::LabelsFormat(_))
        ));
        assert!(matches!(
            parse_labels("[]"),
            Err(ClassifierError::LabelsFormat(_))
        ));
    }
}
