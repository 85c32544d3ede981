#![allow(dead_code)]

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use actix_web::web;
use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, ImageOutputFormat, Rgb, RgbImage};

use cattle_id::classifier::{ClassifierError, IdentityClassifier, Prediction};
use cattle_id::localizer::{LocalizerError, MuzzleLocalizer};
use cattle_id::models::{Age, RegistrationRecord};
use cattle_id::pipeline::{Pipeline, PipelineSettings};
use cattle_id::registry::Registry;

pub const BOUNDARY: &str = "----cattle-test-boundary";

pub const CLEAR_MUZZLE_ANSWER: &str = "Classification: yes, Bounding Box: [100,100,800,800], \
                                       Message: clear muzzle, Object Type: cow, barn";

/// Vision model double that answers every request with the same text,
/// or with an HTTP status failure.
pub struct ScriptedLocalizer {
    answer: Result<String, u16>,
    calls: AtomicUsize,
    last_mime: Mutex<Option<String>>,
}

impl ScriptedLocalizer {
    pub fn answering(text: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
            last_mime: Mutex::new(None),
        })
    }

    pub fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            answer: Err(status),
            calls: AtomicUsize::new(0),
            last_mime: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_mime(&self) -> Option<String> {
        self.last_mime.lock().unwrap().clone()
    }
}

#[async_trait]
impl MuzzleLocalizer for ScriptedLocalizer {
    async fn localize(&self, _image: &[u8], mime_type: &str) -> Result<String, LocalizerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_mime.lock().unwrap() = Some(mime_type.to_string());
        match &self.answer {
            Ok(text) => Ok(text.clone()),
            Err(status) => Err(LocalizerError::Status {
                status: *status,
                body: "upstream unavailable".to_string(),
            }),
        }
    }
}

/// Classifier double returning a fixed label and recording crop sizes.
pub struct FixedClassifier {
    label: String,
    probability: f32,
    crops: Mutex<Vec<(u32, u32)>>,
}

impl FixedClassifier {
    pub fn new(label: &str, probability: f32) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            probability,
            crops: Mutex::new(Vec::new()),
        })
    }

    pub fn crops(&self) -> Vec<(u32, u32)> {
        self.crops.lock().unwrap().clone()
    }
}

impl IdentityClassifier for FixedClassifier {
    fn classify(&self, image: &DynamicImage) -> Result<Prediction, ClassifierError> {
        self.crops.lock().unwrap().push(image.dimensions());
        Ok(Prediction {
            class_index: 0,
            label: self.label.clone(),
            probability: self.probability,
        })
    }
}

pub fn record(class: &str, cattle_id: &str) -> RegistrationRecord {
    RegistrationRecord {
        class: class.to_string(),
        cattle_id: cattle_id.to_string(),
        breed: "Gir".to_string(),
        age_years: Age::Whole(4),
        owner_name: "Asha Patel".to_string(),
        owner_contact: "555-0101".to_string(),
        registration_date: "2023-01-12".to_string(),
    }
}

pub fn pipeline(
    localizer: Arc<ScriptedLocalizer>,
    classifier: Arc<FixedClassifier>,
    records: Vec<RegistrationRecord>,
) -> web::Data<Pipeline> {
    pipeline_with(localizer, classifier, records, PipelineSettings::default())
}

pub fn pipeline_with(
    localizer: Arc<ScriptedLocalizer>,
    classifier: Arc<FixedClassifier>,
    records: Vec<RegistrationRecord>,
    settings: PipelineSettings,
) -> web::Data<Pipeline> {
    web::Data::new(Pipeline::new(
        localizer,
        classifier,
        Arc::new(Registry::new(records)),
        settings,
    ))
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([120, 90, 70])));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .unwrap();
    bytes
}

/// Single-field multipart body; returns `(content type, body)`.
pub fn multipart_body(field: &str, filename: &str, data: &[u8]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

pub fn crop_dir_entries(dir: &PathBuf) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect()
}
