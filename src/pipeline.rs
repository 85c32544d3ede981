//! Per-request analysis: localize, parse, crop, classify, look up.

use std::path::PathBuf;
use std::sync::Arc;

use actix_web::web;
use image::DynamicImage;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classifier::{IdentityClassifier, Prediction};
use crate::error::AnalyzeError;
use crate::geometry::crop_to_box;
use crate::ingest::{UploadedImage, DEFAULT_MAX_UPLOAD_BYTES};
use crate::localizer::MuzzleLocalizer;
use crate::models::{AnalysisResponse, CattleInfo};
use crate::parser::parse_localization;
use crate::registry::Registry;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.55;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub confidence_threshold: f32,
    pub max_upload_bytes: usize,
    /// When set, every crop sent to the classifier is also saved here.
    pub crop_dump_dir: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            crop_dump_dir: None,
        }
    }
}

/// Everything a request needs, built once at startup and shared read-only.
pub struct Pipeline {
    localizer: Arc<dyn MuzzleLocalizer>,
    classifier: Arc<dyn IdentityClassifier>,
    registry: Arc<Registry>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        localizer: Arc<dyn MuzzleLocalizer>,
        classifier: Arc<dyn IdentityClassifier>,
        registry: Arc<Registry>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            localizer,
            classifier,
            registry,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn analyze(&self, upload: UploadedImage) -> Result<AnalysisResponse, AnalyzeError> {
        let answer = self
            .localizer
            .localize(&upload.model_bytes, upload.mime_type)
            .await?;

        let localization = parse_localization(&answer);
        info!(
            muzzle = localization.classification,
            objects = ?localization.object_types,
            "Localization parsed"
        );

        if !localization.classification {
            return Ok(AnalysisResponse::not_found(&localization, CattleInfo::default()));
        }
        let Some(bbox) = localization.bounding_box else {
            return Ok(AnalysisResponse::not_found(&localization, CattleInfo::default()));
        };

        let cropped = match crop_to_box(&upload.image, &bbox) {
            Ok((cropped, rect)) => {
                info!(
                    "Cropping to ({},{})-({},{}) of {}x{}",
                    rect.x1,
                    rect.y1,
                    rect.x2,
                    rect.y2,
                    upload.width(),
                    upload.height()
                );
                cropped
            }
            Err(e) => {
                warn!("No usable crop for {:?}: {}", bbox, e);
                return Ok(AnalysisResponse::not_found(&localization, CattleInfo::default()));
            }
        };

        let prediction = self.classify(cropped).await?;
        let result = prediction.accept(self.settings.confidence_threshold);
        info!(
            predicted_class = ?result.predicted_class,
            probability = result.probability,
            "Prediction complete"
        );

        let Some(predicted_class) = result.predicted_class else {
            return Ok(AnalysisResponse::not_found(
                &localization,
                CattleInfo {
                    probability: Some(result.probability),
                    ..CattleInfo::default()
                },
            ));
        };

        let details = self.registry.lookup(&predicted_class);
        debug!("{} registration rows for {}", details.len(), predicted_class);
        if details.is_empty() {
            return Ok(AnalysisResponse::not_found(
                &localization,
                CattleInfo {
                    predicted_class: Some(predicted_class),
                    probability: Some(result.probability),
                    details: Some(details),
                },
            ));
        }

        Ok(AnalysisResponse::found(
            &localization,
            predicted_class,
            result.probability,
            details,
        ))
    }

    // Inference and the optional crop dump run on the blocking pool.
    async fn classify(&self, cropped: DynamicImage) -> Result<Prediction, AnalyzeError> {
        let classifier = Arc::clone(&self.classifier);
        let dump_dir = self.settings.crop_dump_dir.clone();
        web::block(move || {
            if let Some(dir) = dump_dir {
                save_crop(&cropped, dir);
            }
            classifier.classify(&cropped)
        })
        .await
        .map_err(|e| AnalyzeError::Internal(e.to_string()))?
        .map_err(AnalyzeError::from)
    }
}

fn save_crop(cropped: &DynamicImage, dir: PathBuf) {
    let path = dir.join(format!("{}.png", Uuid::new_v4()));
    match cropped.save(&path) {
        Ok(()) => debug!("Saved crop to {}", path.display()),
        Err(e) => warn!("Failed to save crop to {}: {}", path.display(), e),
    }
}
