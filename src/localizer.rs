//! Muzzle localization through a hosted multimodal model (Gemini).

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const MUZZLE_PROMPT: &str = concat!(
    "Classify the uploaded image based on the following criteria: ",
    "1. If the image contains a cow's muzzle and the muzzle is large enough to indicate a close-up ",
    "(muzzle covers at least 15% of the image), return 'yes'. Otherwise, return 'no'. ",
    "2. Focus specifically on the muzzle area, defined as the nose and mouth only. ",
    "The eyes or other facial features should not be included in the bounding box. ",
    "3. If the image is far from the camera, shows a farm or landscape, or does not have a clear cow muzzle, return 'no'. ",
    "4. If the image is not suitable for cattle identification or does not show a cow's muzzle, ",
    "suggest 'The Cattle Registration was not found'. ",
    "5. Identify all object types present in the image, and consider the context (e.g., farm, landscape) when classifying. ",
    "6. Identify the cow's muzzle in the image, focusing on the nose and mouth. ",
    "Avoid including any part of the eyes or forehead in the bounding box. ",
    "The bounding box should tightly enclose the nose and mouth area, with minimal background. ",
    "Return the coordinates of the cow's muzzle area in bounding box format as precisely as possible, ",
    "ensuring it excludes the eyes and upper face. ",
    "Format the response as follows: Classification: <yes/no>, Bounding Box: [ymin, xmin, ymax, xmax], ",
    "Message: <Provide an explanation>, Object Type: <object1, object2, ...>."
);

#[derive(Debug, Error)]
pub enum LocalizerError {
    #[error("request to vision model failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("vision model returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Asks a vision model where the muzzle is; returns its raw text answer.
#[async_trait]
pub trait MuzzleLocalizer: Send + Sync {
    async fn localize(&self, image: &[u8], mime_type: &str) -> Result<String, LocalizerError>;
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

// --- generateContent serde structs ---

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Text of the first candidate; empty when the model produced none.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

pub struct GeminiLocalizer {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl GeminiLocalizer {
    pub fn new(config: GeminiConfig) -> Result<Self, LocalizerError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            config.model
        );
        info!(
            "Vision model configured: endpoint={}, timeout={:?}",
            endpoint, config.timeout
        );
        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key,
        })
    }
}

fn build_request<'a>(prompt: &'a str, image: &[u8], mime_type: &'a str) -> GenerateRequest<'a> {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![
                Part::Text { text: prompt },
                Part::Inline {
                    inline_data: InlineData {
                        mime_type,
                        data: STANDARD.encode(image),
                    },
                },
            ],
        }],
    }
}

#[async_trait]
impl MuzzleLocalizer for GeminiLocalizer {
    async fn localize(&self, image: &[u8], mime_type: &str) -> Result<String, LocalizerError> {
        let request = build_request(MUZZLE_PROMPT, image, mime_type);
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LocalizerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        let text = parsed.text();
        debug!(answer = %text, "vision model answered");
        Ok(text)
    }
}
