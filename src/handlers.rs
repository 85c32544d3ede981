use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::error::AnalyzeError;
use crate::ingest::{UploadError, UploadedImage};
use crate::pipeline::Pipeline;

pub const IMAGE_FIELD: &str = "image";

const UPLOAD_FORM: &str = r#"<html>
    <head>
        <title>Cattle Management</title>
    </head>
    <body>
        <h1>Cattle Management</h1>
        <form action="/analyze" method="post" enctype="multipart/form-data">
            <input type="file" name="image" accept="image/jpeg, image/png" required>
            <button type="submit">Tell me about the image</button>
        </form>
    </body>
</html>
"#;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(web::resource("/analyze").route(web::post().to(analyze)))
        .service(web::resource("/health").route(web::get().to(health)));
}

pub async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(UPLOAD_FORM)
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub async fn analyze(
    payload: Multipart,
    pipeline: web::Data<Pipeline>,
) -> Result<HttpResponse, AnalyzeError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("analyze", %request_id);

    async move {
        let max_bytes = pipeline.settings().max_upload_bytes;
        let bytes = read_image_field(payload, max_bytes).await?;
        info!("Received upload of {} bytes", bytes.len());

        let upload = web::block(move || UploadedImage::decode(bytes, max_bytes))
            .await
            .map_err(|e| AnalyzeError::Internal(e.to_string()))??;

        match pipeline.analyze(upload).await {
            Ok(response) => {
                info!(
                    muzzle = response.muzzle_identified,
                    message = %response.message,
                    "Analysis finished"
                );
                Ok(HttpResponse::Ok().json(response))
            }
            Err(e) => {
                error!("Analysis failed: {}", e);
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

/// Collects the bytes of the `image` form field, skipping any other field.
async fn read_image_field(mut payload: Multipart, max_bytes: usize) -> Result<Vec<u8>, UploadError> {
    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| UploadError::Multipart(e.to_string()))?;

        if field.content_disposition().get_name() != Some(IMAGE_FIELD) {
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| UploadError::Multipart(e.to_string()))?;
            }
            continue;
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| UploadError::Multipart(e.to_string()))?;
            if bytes.len() + data.len() > max_bytes {
                return Err(UploadError::TooLarge(max_bytes));
            }
            bytes.extend_from_slice(&data);
        }
        return Ok(bytes);
    }

    Err(UploadError::MissingField)
}
