use serde::{Deserialize, Serialize};

pub const FOUND_MESSAGE: &str = "The Cattle Registration was found";
pub const NOT_FOUND_MESSAGE: &str = "The Cattle Registration was not found";

/// Muzzle box as reported by the vision model, each edge on a 0..=1000 axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedBox {
    pub ymin: i64,
    pub xmin: i64,
    pub ymax: i64,
    pub xmax: i64,
}

impl NormalizedBox {
    pub fn new(ymin: i64, xmin: i64, ymax: i64, xmax: i64) -> Self {
        Self {
            ymin,
            xmin,
            ymax,
            xmax,
        }
    }
}

/// Structured reading of the vision model's free-text answer.
///
/// `Default` is the negative result every unparseable answer collapses to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalizationResult {
    pub classification: bool,
    pub bounding_box: Option<NormalizedBox>,
    pub message: String,
    pub object_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub predicted_class: Option<String>,
    pub probability: f32,
}

/// Age column as written in the registry: whole years stay integers,
/// fractional years stay floats, anything else is passed through as text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Age {
    Whole(i64),
    Fractional(f64),
    Text(String),
}

/// One row of the registration CSV.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RegistrationRecord {
    #[serde(rename = "Class")]
    pub class: String,
    #[serde(rename = "Cattle ID")]
    pub cattle_id: String,
    #[serde(rename = "Breed")]
    pub breed: String,
    #[serde(rename = "Age (Years)")]
    pub age_years: Age,
    #[serde(rename = "Owner Name")]
    pub owner_name: String,
    #[serde(rename = "Owner Contact")]
    pub owner_contact: String,
    #[serde(rename = "Registration Date")]
    pub registration_date: String,
}

/// Registration row as exposed to API clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistrationDetails {
    #[serde(rename = "Cattle ID")]
    pub cattle_id: String,
    #[serde(rename = "Cattle Breed")]
    pub breed: String,
    #[serde(rename = "Cattle Age Average")]
    pub age_years: Age,
    #[serde(rename = "Owner Name")]
    pub owner_name: String,
    #[serde(rename = "Owner Contact")]
    pub owner_contact: String,
    #[serde(rename = "Registration Date")]
    pub registration_date: String,
}

impl From<&RegistrationRecord> for RegistrationDetails {
    fn from(record: &RegistrationRecord) -> Self {
        Self {
            cattle_id: record.cattle_id.clone(),
            breed: record.breed.clone(),
            age_years: record.age_years.clone(),
            owner_name: record.owner_name.clone(),
            owner_contact: record.owner_contact.clone(),
            registration_date: record.registration_date.clone(),
        }
    }
}

/// Serializes to `{}` when the classifier never ran.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CattleInfo {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub predicted_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub probability: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub details: Option<Vec<RegistrationDetails>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResponse {
    pub muzzle_identified: bool,
    pub identified_objects: Vec<String>,
    pub message: String,
    pub cattle_info: CattleInfo,
}

impl AnalysisResponse {
    pub fn not_found(localization: &LocalizationResult, cattle_info: CattleInfo) -> Self {
        Self {
            muzzle_identified: localization.classification,
            identified_objects: localization.object_types.clone(),
            message: NOT_FOUND_MESSAGE.to_string(),
            cattle_info,
        }
    }

    pub fn found(
        localization: &LocalizationResult,
        predicted_class: String,
        probability: f32,
        details: Vec<RegistrationDetails>,
    ) -> Self {
        Self {
            muzzle_identified: localization.classification,
            identified_objects: localization.object_types.clone(),
            message: FOUND_MESSAGE.to_string(),
            cattle_info: CattleInfo {
                predicted_class: Some(predicted_class),
                probability: Some(probability),
                details: Some(details),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}
