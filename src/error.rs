use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::classifier::ClassifierError;
use crate::ingest::UploadError;
use crate::localizer::LocalizerError;
use crate::models::ErrorBody;

const SERVER_ERROR_DETAIL: &str = "An error occurred while analyzing the image";

/// Failures that abort an analyze request. Negative outcomes (no muzzle,
/// unusable box, low confidence) are not errors.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Localizer(#[from] LocalizerError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ResponseError for AnalyzeError {
    fn status_code(&self) -> StatusCode {
        match self {
            AnalyzeError::Upload(UploadError::TooLarge(_)) => StatusCode::PAYLOAD_TOO_LARGE,
            AnalyzeError::Upload(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let detail = match self {
            AnalyzeError::Upload(e) => e.to_string(),
            _ => SERVER_ERROR_DETAIL.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ErrorBody { detail })
    }
}
